//! Integration tests
//!
//! End-to-end flows through the public client API.

pub mod http_remote_test;
pub mod offline_flow_test;
pub mod persistence_test;
