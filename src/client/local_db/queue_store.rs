//! # Persistent Queue Store
//!
//! Typed access to the queue's storage slots. Every value is one JSON
//! document under a well-known key, written with a single statement.
//!
//! A missing or unreadable value loads as empty and is logged; a failing
//! database is an error, so callers never overwrite data they could not read.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::schema::{DEAD_LETTER_KEY, ID_REMAP_KEY, LAST_SYNC_KEY, QUEUE_KEY};
use super::LocalDatabase;
use crate::client::offline::queue::{DeadLetter, QueueEntry};
use crate::shared::error::Result;
use crate::shared::record::{RecordId, Table};

/// A temporary id the server has since replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMapping {
    pub table: Table,
    pub temporary: RecordId,
    pub resolved: RecordId,
}

/// Find the server id recorded for a temporary id
pub fn lookup(mappings: &[IdMapping], table: Table, temporary: &RecordId) -> Option<RecordId> {
    mappings
        .iter()
        .find(|m| m.table == table && &m.temporary == temporary)
        .map(|m| m.resolved.clone())
}

#[derive(Debug, Clone)]
pub struct QueueStore {
    db: LocalDatabase,
}

impl QueueStore {
    pub fn new(db: LocalDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &LocalDatabase {
        &self.db
    }

    /// Persisted queue, in order
    pub async fn load_queue(&self) -> Result<Vec<QueueEntry>> {
        self.load_or_default(QUEUE_KEY).await
    }

    /// Overwrite the queue; an empty queue removes the slot
    pub async fn save_queue(&self, queue: &[QueueEntry]) -> Result<()> {
        if queue.is_empty() {
            return self.clear_queue().await;
        }
        self.save(QUEUE_KEY, &queue).await
    }

    pub async fn clear_queue(&self) -> Result<()> {
        Ok(self.db.remove(QUEUE_KEY).await?)
    }

    pub async fn load_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.load_or_default(DEAD_LETTER_KEY).await
    }

    pub async fn save_dead_letters(&self, letters: &[DeadLetter]) -> Result<()> {
        if letters.is_empty() {
            return Ok(self.db.remove(DEAD_LETTER_KEY).await?);
        }
        self.save(DEAD_LETTER_KEY, &letters).await
    }

    pub async fn load_id_map(&self) -> Result<Vec<IdMapping>> {
        self.load_or_default(ID_REMAP_KEY).await
    }

    pub async fn save_id_map(&self, mappings: &[IdMapping]) -> Result<()> {
        if mappings.is_empty() {
            return self.clear_id_map().await;
        }
        self.save(ID_REMAP_KEY, &mappings).await
    }

    pub async fn clear_id_map(&self) -> Result<()> {
        Ok(self.db.remove(ID_REMAP_KEY).await?)
    }

    pub async fn load_last_sync(&self) -> Result<Option<DateTime<Utc>>> {
        self.load_or_default(LAST_SYNC_KEY).await
    }

    pub async fn save_last_sync(&self, at: DateTime<Utc>) -> Result<()> {
        self.save(LAST_SYNC_KEY, &at).await
    }

    async fn load_or_default<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let Some(raw) = self.db.get(key).await? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding unreadable stored value");
                Ok(T::default())
            }
        }
    }

    async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.db.set(key, &raw).await?;
        Ok(())
    }
}
