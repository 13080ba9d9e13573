//! # Local Database Module
//!
//! Local SQLite storage for the offline queue. The database holds a single
//! key/value table (`local_storage`) standing in for the browser's local
//! storage: each well-known key owns one serialized value, written in a
//! single statement.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool, schema and raw key/value access
//! - `schema.rs`: schema version and storage key constants
//! - `queue_store.rs`: typed load/save of the queue, dead letters, id map
//!
//! ## Usage
//!
//! ```rust,no_run
//! use zenith::client::local_db::LocalDatabase;
//!
//! # async fn example() -> sqlx::Result<()> {
//! let db = LocalDatabase::open("/tmp/zenith/local.db").await?;
//! db.set("greeting", "hello").await?;
//! assert_eq!(db.get("greeting").await?.as_deref(), Some("hello"));
//! # Ok(())
//! # }
//! ```

pub mod queue_store;
pub mod schema;

pub use queue_store::{IdMapping, QueueStore};

use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Result as SqlxResult, SqlitePool};

use schema::CURRENT_SCHEMA_VERSION;

/// Result type for local database operations
pub type Result<T> = SqlxResult<T>;

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file at `path`
    ///
    /// Creates parent directories as needed and uses WAL mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let db = Self { pool };
        db.init_schema().await?;
        tracing::debug!(path = %path.display(), "local database opened");
        Ok(db)
    }

    /// Private in-memory database
    ///
    /// A single connection that never expires, so the data lives as long as
    /// the pool does.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("schema.sql")).execute(&self.pool).await?;
        self.run_migrations().await
    }

    async fn run_migrations(&self) -> Result<()> {
        let (current,): (i32,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await?;
        if !schema::needs_migration(current) {
            return Ok(());
        }

        for version in schema::get_pending_migrations(current) {
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
            tracing::debug!(version, "applied schema migration");
        }
        Ok(())
    }

    pub async fn schema_version(&self) -> Result<i32> {
        let (version,): (i32,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await?;
        debug_assert!(version <= CURRENT_SCHEMA_VERSION);
        Ok(version)
    }

    /// Read the value stored under `key`
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM local_storage WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Overwrite the value stored under `key`
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO local_storage (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_storage WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
