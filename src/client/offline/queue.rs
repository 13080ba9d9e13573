//! # Operation Queue
//!
//! The ordered list of mutations waiting to reach the remote service, and
//! the single owner of its persisted form.
//!
//! ## Features
//!
//! - **Coalescing**: an UPDATE following a pending INSERT of the same record is
//!   merged into it, a DELETE cancels it, so the queue grows with the number
//!   of records touched rather than the number of actions taken
//! - **In-flight protection**: the entry being sent is never merged into or
//!   cancelled; later mutations of it are appended and reconciled when the
//!   call finishes
//! - **Temporary id remapping**: once an offline-created record gets its
//!   server id, queued and future mutations of the temporary id are rewritten
//! - **Dead letters**: entries that cannot succeed are parked for manual
//!   resolution instead of rotating forever
//!
//! Every mutator takes the queue lock, reads the persisted queue, changes it
//! and writes it back before releasing the lock, so no update is ever made
//! against a stale copy.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use zenith::client::local_db::{LocalDatabase, QueueStore};
//! use zenith::client::offline::queue::{Mutation, OperationQueue};
//! use zenith::client::offline::retry::RetryPolicy;
//! use zenith::shared::record::{record_from, RecordId, Table};
//!
//! # async fn example() -> zenith::shared::error::Result<()> {
//! let store = QueueStore::new(LocalDatabase::open_in_memory().await?);
//! let queue = OperationQueue::new(store, RetryPolicy::default(), false);
//!
//! let temp = RecordId::temporary();
//! queue
//!     .enqueue(Mutation::insert(Table::Notes, temp.clone(), record_from(serde_json::json!({"title": "Draft"}))))
//!     .await?;
//! queue
//!     .enqueue(Mutation::update(Table::Notes, temp, record_from(serde_json::json!({"content": "Body"}))))
//!     .await?;
//! assert_eq!(queue.len().await?, 1);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::retry::{RetryDecision, RetryPolicy};
use crate::client::local_db::queue_store::lookup;
use crate::client::local_db::{IdMapping, QueueStore};
use crate::client::remote::{ErrorClass, RemoteError, RemoteService};
use crate::shared::error::{Result, ZenithError};
use crate::shared::record::{Record, RecordId, Table, DEFAULT_MATCH_FIELD};

/// Kind of change a queue entry applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        })
    }
}

/// A local change about to be queued
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub table: Table,
    pub operation: Operation,
    pub payload: Record,
    pub match_field: String,
    pub match_value: RecordId,
}

impl Mutation {
    /// Create `payload` under `id` (usually a temporary id)
    pub fn insert(table: Table, id: RecordId, payload: Record) -> Self {
        Self {
            table,
            operation: Operation::Insert,
            payload,
            match_field: DEFAULT_MATCH_FIELD.to_string(),
            match_value: id,
        }
    }

    pub fn update(table: Table, id: impl Into<RecordId>, patch: Record) -> Self {
        Self {
            table,
            operation: Operation::Update,
            payload: patch,
            match_field: DEFAULT_MATCH_FIELD.to_string(),
            match_value: id.into(),
        }
    }

    pub fn delete(table: Table, id: impl Into<RecordId>) -> Self {
        Self {
            table,
            operation: Operation::Delete,
            payload: Record::new(),
            match_field: DEFAULT_MATCH_FIELD.to_string(),
            match_value: id.into(),
        }
    }

    /// Locate the target by another field (e.g. a budget's `category`)
    pub fn with_match_field(mut self, field: impl Into<String>) -> Self {
        self.match_field = field.into();
        self
    }
}

/// Opaque identifier of a queue entry
///
/// New entries get a UUIDv7 string; entries persisted by earlier clients keep
/// whatever id they were written with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

fn default_match_field() -> String {
    DEFAULT_MATCH_FIELD.to_string()
}

/// A pending mutation in its persisted layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: EntryId,
    pub table: Table,
    #[serde(rename = "type")]
    pub operation: Operation,
    #[serde(default)]
    pub payload: Record,
    #[serde(default = "default_match_field")]
    pub match_field: String,
    #[serde(default)]
    pub match_value: Option<RecordId>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_class: Option<ErrorClass>,
    #[serde(default = "Utc::now")]
    pub queued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn from_mutation(mutation: Mutation) -> Self {
        Self {
            id: EntryId::generate(),
            table: mutation.table,
            operation: mutation.operation,
            payload: mutation.payload,
            match_field: mutation.match_field,
            match_value: Some(mutation.match_value),
            attempts: 0,
            last_error: None,
            last_error_class: None,
            queued_at: Utc::now(),
        }
    }

    /// Whether this entry refers to `id` in `table`
    pub fn targets(&self, table: Table, id: &RecordId) -> bool {
        self.table == table && self.match_value.as_ref() == Some(id)
    }

    fn is_insert_of(&self, table: Table, id: &RecordId) -> bool {
        self.operation == Operation::Insert && self.targets(table, id)
    }

    /// INSERT still carrying a locally generated id
    fn temporary_insert_id(&self) -> Option<&RecordId> {
        match (&self.operation, &self.match_value) {
            (Operation::Insert, Some(id)) if id.is_temporary() => Some(id),
            _ => None,
        }
    }

    fn merge_payload(&mut self, patch: Record) {
        for (key, value) in patch {
            self.payload.insert(key, value);
        }
    }

    fn record_failure(&mut self, error: &RemoteError) {
        self.attempts += 1;
        self.last_error = Some(error.to_string());
        self.last_error_class = Some(error.class());
    }

    fn reset_failures(&mut self) {
        self.attempts = 0;
        self.last_error = None;
        self.last_error_class = None;
    }

    /// Apply this entry to the remote service
    ///
    /// Returns the created row for an INSERT. Entries that can never be sent
    /// (no match value, unresolved temporary id) fail with
    /// [`RemoteError::Invalid`] without reaching the remote.
    pub async fn send_to(&self, remote: &dyn RemoteService) -> std::result::Result<Option<Record>, RemoteError> {
        if self.operation == Operation::Insert {
            let mut record = self.payload.clone();
            // Client-chosen ids are part of the row; temporary ones never leave the device
            if let Some(id) = self.match_value.as_ref().filter(|id| !id.is_temporary()) {
                record.insert(self.match_field.clone(), id.to_value());
            }
            return remote.create(self.table, &record).await.map(Some);
        }

        let target = self.match_value.as_ref().ok_or_else(|| {
            RemoteError::Invalid(format!("{} on {} has no match value", self.operation, self.table))
        })?;
        if target.is_temporary() {
            return Err(RemoteError::Invalid(format!(
                "temporary id {} was never created remotely",
                target
            )));
        }

        if self.operation == Operation::Update {
            remote.update(self.table, &self.match_field, target, &self.payload).await?;
        } else {
            remote.delete(self.table, &self.match_field, target).await?;
        }
        Ok(None)
    }
}

/// An entry removed from the queue for manual resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub entry: QueueEntry,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// How a mutation combined with the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// New entry at the tail
    Appended { entry_id: EntryId },
    /// Folded into a pending INSERT
    MergedIntoInsert { entry_id: EntryId },
    /// Removed a pending INSERT; nothing will be sent
    CancelledInsert { entry_id: EntryId },
    /// Folded into the record's last pending UPDATE
    MergedIntoUpdate { entry_id: EntryId },
}

impl EnqueueOutcome {
    pub fn entry_id(&self) -> &EntryId {
        match self {
            EnqueueOutcome::Appended { entry_id }
            | EnqueueOutcome::MergedIntoInsert { entry_id }
            | EnqueueOutcome::CancelledInsert { entry_id }
            | EnqueueOutcome::MergedIntoUpdate { entry_id } => entry_id,
        }
    }
}

/// Combine `mutation` with `queue`
///
/// `pinned` is the entry currently being sent; it is never merged into or
/// removed. With `coalesce_updates`, an UPDATE also merges into the last
/// entry for the same record when that entry is an UPDATE on the same field.
pub fn coalesce(
    queue: &mut Vec<QueueEntry>,
    mutation: Mutation,
    pinned: Option<&EntryId>,
    coalesce_updates: bool,
) -> EnqueueOutcome {
    let pending_insert = match mutation.operation {
        Operation::Insert => None,
        Operation::Update | Operation::Delete => queue
            .iter()
            .position(|e| e.is_insert_of(mutation.table, &mutation.match_value) && Some(&e.id) != pinned),
    };

    match (mutation.operation, pending_insert) {
        (Operation::Update, Some(index)) => {
            queue[index].merge_payload(mutation.payload);
            EnqueueOutcome::MergedIntoInsert {
                entry_id: queue[index].id.clone(),
            }
        }
        (Operation::Delete, Some(index)) => {
            let cancelled = queue.remove(index);
            EnqueueOutcome::CancelledInsert { entry_id: cancelled.id }
        }
        (Operation::Update, None) if coalesce_updates => {
            let last = queue
                .iter()
                .rposition(|e| e.targets(mutation.table, &mutation.match_value));
            match last {
                Some(index)
                    if queue[index].operation == Operation::Update
                        && queue[index].match_field == mutation.match_field
                        && Some(&queue[index].id) != pinned =>
                {
                    queue[index].merge_payload(mutation.payload);
                    EnqueueOutcome::MergedIntoUpdate {
                        entry_id: queue[index].id.clone(),
                    }
                }
                _ => append(queue, mutation),
            }
        }
        _ => append(queue, mutation),
    }
}

fn append(queue: &mut Vec<QueueEntry>, mutation: Mutation) -> EnqueueOutcome {
    let entry = QueueEntry::from_mutation(mutation);
    let entry_id = entry.id.clone();
    queue.push(entry);
    EnqueueOutcome::Appended { entry_id }
}

/// Point every queued UPDATE/DELETE of `temporary` at `resolved`
fn remap_entries(queue: &mut [QueueEntry], table: Table, temporary: &RecordId, resolved: &RecordId) -> usize {
    let mut rewritten = 0;
    for entry in queue
        .iter_mut()
        .filter(|e| e.operation != Operation::Insert && e.targets(table, temporary))
    {
        entry.match_value = Some(resolved.clone());
        rewritten += 1;
    }
    rewritten
}

/// Result of a successful remote call, as seen by the queue
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Entry removed; `resolved` is set when an offline-created record got its server id
    Applied { resolved: Option<IdMapping> },
    /// Entry no longer queued
    Vanished,
}

/// Result of a failed remote call, as seen by the queue
#[derive(Debug, Clone, PartialEq)]
pub enum FailureDisposition {
    /// Moved to the tail
    Rotated { attempts: u32 },
    /// Moved to the dead-letter list
    DeadLettered { reason: String },
    /// A DELETE queued while the INSERT was in flight cancelled it
    Cancelled,
    /// Entry no longer queued
    Vanished,
}

/// Persistent, coalescing queue of offline mutations
#[derive(Debug)]
pub struct OperationQueue {
    store: QueueStore,
    /// Entry currently handed to the processor
    in_flight: Mutex<Option<EntryId>>,
    policy: RetryPolicy,
    coalesce_updates: bool,
}

impl OperationQueue {
    pub fn new(store: QueueStore, policy: RetryPolicy, coalesce_updates: bool) -> Self {
        Self {
            store,
            in_flight: Mutex::new(None),
            policy,
            coalesce_updates,
        }
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// Add a mutation, coalescing it with pending entries
    ///
    /// Temporary ids already resolved by the server are rewritten first. An
    /// UPDATE/DELETE of a temporary id that is neither pending nor resolved
    /// is rejected.
    pub async fn enqueue(&self, mut mutation: Mutation) -> Result<EnqueueOutcome> {
        let in_flight = self.in_flight.lock().await;
        let mut queue = self.store.load_queue().await?;

        if mutation.operation != Operation::Insert && mutation.match_value.is_temporary() {
            let mappings = self.store.load_id_map().await?;
            if let Some(resolved) = lookup(&mappings, mutation.table, &mutation.match_value) {
                tracing::debug!(table = %mutation.table, from = %mutation.match_value, to = %resolved, "rewrote temporary id");
                mutation.match_value = resolved;
            } else if !queue.iter().any(|e| e.is_insert_of(mutation.table, &mutation.match_value)) {
                return Err(ZenithError::unresolved(
                    mutation.table.as_str(),
                    mutation.match_value.to_string(),
                ));
            }
        }

        let table = mutation.table;
        let operation = mutation.operation;
        let outcome = coalesce(&mut queue, mutation, in_flight.as_ref(), self.coalesce_updates);
        self.store.save_queue(&queue).await?;

        tracing::debug!(%table, %operation, ?outcome, pending = queue.len(), "enqueued mutation");
        Ok(outcome)
    }

    /// Take the head entry and mark it in flight
    pub async fn begin(&self) -> Result<Option<QueueEntry>> {
        let mut in_flight = self.in_flight.lock().await;
        let mut queue = self.store.load_queue().await?;

        let Some(head) = queue.first_mut() else {
            *in_flight = None;
            return Ok(None);
        };

        if head.operation != Operation::Insert {
            if let Some(id) = head.match_value.as_ref().filter(|id| id.is_temporary()) {
                let mappings = self.store.load_id_map().await?;
                if let Some(resolved) = lookup(&mappings, head.table, id) {
                    head.match_value = Some(resolved);
                    let head = head.clone();
                    self.store.save_queue(&queue).await?;
                    *in_flight = Some(head.id.clone());
                    return Ok(Some(head));
                }
            }
        }

        let head = head.clone();
        *in_flight = Some(head.id.clone());
        Ok(Some(head))
    }

    /// Remove an entry the remote service accepted
    ///
    /// For an offline-created record, `created` is the server's copy; its
    /// match field is recorded as the real id and queued entries are rewritten.
    pub async fn complete(&self, entry_id: &EntryId, created: Option<&Record>) -> Result<Completion> {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.as_ref() == Some(entry_id) {
            *in_flight = None;
        }

        let mut queue = self.store.load_queue().await?;
        let Some(index) = queue.iter().position(|e| &e.id == entry_id) else {
            tracing::debug!(%entry_id, "completed entry no longer queued");
            return Ok(Completion::Vanished);
        };
        let entry = queue.remove(index);

        let mut resolved = None;
        if let Some(temporary) = entry.temporary_insert_id() {
            match created.and_then(|record| RecordId::of(record, &entry.match_field)) {
                Some(real) => {
                    let rewritten = remap_entries(&mut queue, entry.table, temporary, &real);
                    let mapping = IdMapping {
                        table: entry.table,
                        temporary: temporary.clone(),
                        resolved: real,
                    };
                    tracing::debug!(table = %entry.table, from = %mapping.temporary, to = %mapping.resolved, rewritten, "temporary id resolved");
                    resolved = Some(mapping);
                }
                None => tracing::warn!(
                    table = %entry.table,
                    field = %entry.match_field,
                    "created record has no id; queued changes keep the temporary id"
                ),
            }
        }

        self.store.save_queue(&queue).await?;
        if let Some(mapping) = &resolved {
            let mut mappings = self.store.load_id_map().await?;
            mappings.retain(|m| !(m.table == mapping.table && m.temporary == mapping.temporary));
            mappings.push(mapping.clone());
            self.store.save_id_map(&mappings).await?;
        }
        Ok(Completion::Applied { resolved })
    }

    /// Record a failed remote call and rotate or dead-letter the entry
    pub async fn fail(&self, entry_id: &EntryId, error: &RemoteError) -> Result<FailureDisposition> {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.as_ref() == Some(entry_id) {
            *in_flight = None;
        }

        let mut queue = self.store.load_queue().await?;
        let Some(index) = queue.iter().position(|e| &e.id == entry_id) else {
            tracing::debug!(%entry_id, "failed entry no longer queued");
            return Ok(FailureDisposition::Vanished);
        };
        let mut entry = queue.remove(index);
        entry.record_failure(error);

        // Changes queued while the INSERT was in flight fold back into it.
        if let Some(temporary) = entry.temporary_insert_id().cloned() {
            let mut cancelled = false;
            let mut i = 0;
            while i < queue.len() {
                if queue[i].operation != Operation::Insert && queue[i].targets(entry.table, &temporary) {
                    let dependent = queue.remove(i);
                    match dependent.operation {
                        Operation::Update => entry.merge_payload(dependent.payload),
                        _ => cancelled = true,
                    }
                } else {
                    i += 1;
                }
            }
            if cancelled {
                self.store.save_queue(&queue).await?;
                tracing::debug!(%entry_id, "in-flight insert cancelled by a later delete");
                return Ok(FailureDisposition::Cancelled);
            }
        }

        let disposition = match self.policy.decide(entry.attempts, error) {
            RetryDecision::Rotate => {
                let attempts = entry.attempts;
                queue.push(entry);
                self.store.save_queue(&queue).await?;
                FailureDisposition::Rotated { attempts }
            }
            RetryDecision::DeadLetter { reason } => {
                self.store.save_queue(&queue).await?;
                let mut letters = self.store.load_dead_letters().await?;
                tracing::warn!(%entry_id, table = %entry.table, operation = %entry.operation, %reason, "entry dead-lettered");
                letters.push(DeadLetter {
                    entry,
                    reason: reason.clone(),
                    failed_at: Utc::now(),
                });
                self.store.save_dead_letters(&letters).await?;
                FailureDisposition::DeadLettered { reason }
            }
        };
        Ok(disposition)
    }

    /// Number of pending entries
    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.load_queue().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Current pending entries, in order
    pub async fn snapshot(&self) -> Result<Vec<QueueEntry>> {
        self.store.load_queue().await
    }

    /// Whether any pending entry refers to `id` in `table`
    pub async fn has_pending_for(&self, table: Table, id: &RecordId) -> Result<bool> {
        let queue = self.store.load_queue().await?;
        Ok(queue.iter().any(|e| e.targets(table, id)))
    }

    /// Server id for `id` if it is a resolved temporary id, else `id` itself
    pub async fn resolve(&self, table: Table, id: &RecordId) -> Result<RecordId> {
        if !id.is_temporary() {
            return Ok(id.clone());
        }
        let mappings = self.store.load_id_map().await?;
        Ok(lookup(&mappings, table, id).unwrap_or_else(|| id.clone()))
    }

    /// Clear the persisted queue if nothing is pending
    pub async fn clear_if_drained(&self) -> Result<bool> {
        let _guard = self.in_flight.lock().await;
        if self.store.load_queue().await?.is_empty() {
            self.store.clear_queue().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Forget resolved temporary ids once the cache holds server ids only
    pub async fn clear_id_map(&self) -> Result<()> {
        let _guard = self.in_flight.lock().await;
        self.store.clear_id_map().await
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.store.load_dead_letters().await
    }

    /// Move a dead letter back to the tail with a clean failure count
    pub async fn requeue_dead_letter(&self, entry_id: &EntryId) -> Result<EntryId> {
        let _guard = self.in_flight.lock().await;
        let mut letters = self.store.load_dead_letters().await?;
        let index = letters
            .iter()
            .position(|l| &l.entry.id == entry_id)
            .ok_or_else(|| ZenithError::DeadLetterNotFound(entry_id.to_string()))?;
        let mut entry = letters.remove(index).entry;
        entry.reset_failures();

        if entry.operation != Operation::Insert {
            if let Some(id) = entry.match_value.as_ref().filter(|id| id.is_temporary()) {
                let mappings = self.store.load_id_map().await?;
                if let Some(resolved) = lookup(&mappings, entry.table, id) {
                    entry.match_value = Some(resolved);
                }
            }
        }

        let mut queue = self.store.load_queue().await?;
        queue.push(entry);
        self.store.save_queue(&queue).await?;
        self.store.save_dead_letters(&letters).await?;
        tracing::info!(%entry_id, "dead letter requeued");
        Ok(entry_id.clone())
    }

    /// Drop a dead letter for good
    pub async fn discard_dead_letter(&self, entry_id: &EntryId) -> Result<DeadLetter> {
        let _guard = self.in_flight.lock().await;
        let mut letters = self.store.load_dead_letters().await?;
        let index = letters
            .iter()
            .position(|l| &l.entry.id == entry_id)
            .ok_or_else(|| ZenithError::DeadLetterNotFound(entry_id.to_string()))?;
        let letter = letters.remove(index);
        self.store.save_dead_letters(&letters).await?;
        tracing::info!(%entry_id, "dead letter discarded");
        Ok(letter)
    }
}
