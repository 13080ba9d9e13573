//! Local database fixtures
//!
//! On-disk databases live in a temporary directory that is removed when the
//! fixture is dropped.

use std::path::PathBuf;

use tempfile::TempDir;
use zenith::client::local_db::{LocalDatabase, QueueStore};

/// A database file inside a private temporary directory
pub struct TestDatabase {
    dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    /// Directory to configure as `data_dir`
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("zenith")
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir().join("local.db")
    }

    /// Open (or reopen) the database file
    pub async fn open(&self) -> LocalDatabase {
        LocalDatabase::open(self.path())
            .await
            .expect("Failed to open test database")
    }

    pub async fn store(&self) -> QueueStore {
        QueueStore::new(self.open().await)
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Fresh in-memory queue store
pub async fn memory_store() -> QueueStore {
    QueueStore::new(
        LocalDatabase::open_in_memory()
            .await
            .expect("Failed to open in-memory database"),
    )
}
