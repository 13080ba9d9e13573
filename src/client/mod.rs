//! Offline-first client
//!
//! - [`local_db`] - SQLite key/value storage and the persisted queue
//! - [`remote`] - remote mutation service and its implementations
//! - [`offline`] - queue, coalescing, retry policy, cache and the mutation façade
//! - [`sync`] - queue processor and trigger policy
//! - [`state`] - everything wired together

pub mod config;
pub mod local_db;
pub mod offline;
pub mod remote;
pub mod session;
pub mod state;
pub mod sync;

pub use config::Config;
pub use session::{Session, SessionState};
pub use state::AppState;
