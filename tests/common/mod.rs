//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Client fixtures wired to an in-memory remote
//! - Record payload builders
//! - Custom assertion macros

pub mod assertions;
pub mod database;
pub mod fixtures;

// Re-export commonly used utilities
pub use database::*;
pub use fixtures::*;
