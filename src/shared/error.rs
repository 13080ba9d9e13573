//! Shared Error Types
//!
//! This module defines the crate-level error returned by storage, queue and
//! sync operations. Remote-service failures have their own type
//! ([`RemoteError`](crate::client::remote::RemoteError)) because the retry
//! policy needs to classify them; they convert into [`ZenithError`] with `?`.
//!
//! # Error Categories
//!
//! - `Storage` - local SQLite failures (never treated as an empty queue)
//! - `Serialization` - JSON encoding failures
//! - `Remote` - remote mutation service failures
//! - `NotAuthenticated` - a mutation was attempted without a session
//! - `UnresolvedTemporaryId` - a mutation targets a temporary id nobody can resolve
//!
//! # Usage
//!
//! ```rust
//! use zenith::shared::error::ZenithError;
//!
//! let error = ZenithError::validation("amount", "amount must be positive");
//! assert!(error.to_string().contains("amount"));
//! ```
use thiserror::Error;

use crate::client::remote::RemoteError;
use crate::shared::config::ConfigError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ZenithError>;

/// Errors surfaced by the offline queue, the local store and the sync engine
#[derive(Debug, Error)]
pub enum ZenithError {
    /// Local database failure
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// JSON serialization or deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error (creating the data directory, reading config files)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote mutation service failure
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A mutation was attempted without an authenticated session
    #[error("no authenticated session")]
    NotAuthenticated,

    /// An UPDATE/DELETE targets a temporary id with no pending INSERT and no known real id
    #[error("temporary id '{id}' in table '{table}' has no pending insert")]
    UnresolvedTemporaryId {
        /// Table of the targeted record
        table: String,
        /// The temporary identifier
        id: String,
    },

    /// No dead letter with the given entry id
    #[error("dead letter {0} not found")]
    DeadLetterNotFound(String),

    /// Data validation error
    #[error("validation error in field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl ZenithError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new unresolved temporary id error
    pub fn unresolved(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::UnresolvedTemporaryId {
            table: table.into(),
            id: id.into(),
        }
    }
}
