//! Zenith - offline mutation queue
//!
//! Zenith keeps a personal-finance and habit-tracking client usable without
//! connectivity. Every create, update and delete is applied to an in-memory
//! cache at once; changes that cannot reach the hosted backend are persisted
//! in a local queue and replayed when connectivity and a session are both
//! present.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared by the library and the operator binary
//!   - Error types, configuration
//!   - Tables, record identifiers, typed record models
//!
//! - **`client`** - The offline-first client
//!   - Persistent queue store on SQLite
//!   - Coalescing operation queue with temporary-id remapping and dead letters
//!   - Queue processor with single-flight runs and bounded retries
//!   - Connectivity/session trigger policy
//!   - Optimistic cache and post-sync reconciliation
//!
//! # Feature Flags
//!
//! - **`cli`** - builds the `zenith-sync` operator binary
//!   (`clap`, `dotenv`, `tracing-subscriber`)
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zenith::client::remote::InMemoryRemote;
//! use zenith::client::{AppState, Config, Session};
//! use zenith::shared::record::{record_from, Table};
//!
//! # async fn example() -> zenith::shared::error::Result<()> {
//! let mut state = AppState::open(Config::new(), Arc::new(InMemoryRemote::new())).await?;
//! state.start_sync();
//! state.sign_in(Session::new("user-1")).await;
//!
//! state
//!     .mutations()
//!     .create(Table::Expenses, record_from(serde_json::json!({"description": "Coffee", "amount": 15000})))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The queue serializes every read-modify-write of its persisted form behind
//! one async mutex; the cache sits behind a `RwLock`; processor runs are
//! single-flight. All handles are `Send + Sync` and cheap to share via `Arc`.
//!
//! # Logging
//!
//! The library emits `tracing` events and never installs a subscriber.

/// Shared types and data structures
pub mod shared;

/// Offline-first client
pub mod client;
