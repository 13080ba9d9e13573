//! # Remote Mutation Service
//!
//! Abstraction over the hosted backend's row-level CRUD operations. The
//! queue processor, the mutation façade and the reconciler only ever talk to
//! a [`RemoteService`]; the concrete implementations are:
//!
//! - [`http::HttpRemote`] - PostgREST dialect over `reqwest`
//! - [`memory::InMemoryRemote`] - in-process tables for tests and local development

pub mod http;
pub mod memory;

pub use http::HttpRemote;
pub use memory::{InMemoryRemote, RemoteCall};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::record::{Record, RecordId, Table};

/// Row-level CRUD against the system of record
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Insert a row and return it with server-assigned fields
    async fn create(&self, table: Table, record: &Record) -> Result<Record, RemoteError>;

    /// Patch every row whose `match_field` equals `match_value`
    async fn update(
        &self,
        table: Table,
        match_field: &str,
        match_value: &RecordId,
        patch: &Record,
    ) -> Result<(), RemoteError>;

    /// Delete every row whose `match_field` equals `match_value`
    async fn delete(&self, table: Table, match_field: &str, match_value: &RecordId) -> Result<(), RemoteError>;

    /// Fetch the whole collection in its default order
    async fn fetch_all(&self, table: Table) -> Result<Vec<Record>, RemoteError>;
}

/// Whether retrying a failed call can help
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Remote call failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    /// The request never produced a response
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// 5xx, 408 or 429
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Credentials missing or expired (401/403)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Any other 4xx: constraint violations, unknown columns, ...
    #[error("rejected {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    /// The entry itself can never be sent (missing match value, unresolved temp id)
    #[error("invalid entry: {0}")]
    Invalid(String),
}

impl RemoteError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RemoteError::Network(_)
            | RemoteError::Timeout(_)
            | RemoteError::Server { .. }
            | RemoteError::Unauthorized(_) => ErrorClass::Transient,
            RemoteError::Rejected { .. } | RemoteError::Malformed(_) | RemoteError::Invalid(_) => {
                ErrorClass::Permanent
            }
        }
    }

    /// Retrying will never succeed, not even after a fix on the server side
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, RemoteError::Invalid(_))
    }

    /// Map an HTTP status and body to an error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => RemoteError::Unauthorized(message),
            408 | 429 | 500..=599 => RemoteError::Server { status, message },
            _ => RemoteError::Rejected { status, message },
        }
    }
}
