//! Shared Module
//!
//! Platform-agnostic types used by the client and the operator binary:
//! the crate error, configuration, and the record model of the five
//! synchronized collections.

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Tables, record identifiers and typed record models
pub mod record;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::{Result, ZenithError};
pub use record::{Record, RecordId, Table};
