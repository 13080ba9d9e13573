//! # Offline-First Mutations
//!
//! Every user change goes through [`OfflineManager`]: it is applied to the
//! [`AppCache`] immediately, then either sent to the remote service or
//! queued for the [`QueueProcessor`](crate::client::sync::QueueProcessor).
//!
//! A change is queued instead of sent when
//!
//! - the device is offline,
//! - the app is configured to queue first,
//! - the target record still has queued entries, so per-record order is kept,
//! - or the direct call fails.
//!
//! If the change cannot be queued, the cache is rolled back and the error
//! returned.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use zenith::client::offline::OfflineManager;
//! use zenith::shared::record::{record_from, Table};
//!
//! # async fn example(manager: OfflineManager) -> zenith::shared::error::Result<()> {
//! let id = manager
//!     .create(Table::Expenses, record_from(serde_json::json!({"description": "Coffee", "amount": 15000})))
//!     .await?;
//! manager
//!     .update(Table::Expenses, id, record_from(serde_json::json!({"amount": 18000})))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod optimistic;
pub mod queue;
pub mod reconciliation;
pub mod retry;

pub use optimistic::{AppCache, RowSnapshot};
pub use queue::{DeadLetter, EnqueueOutcome, EntryId, Mutation, Operation, OperationQueue, QueueEntry};
pub use reconciliation::{Reconciler, RefetchReport};
pub use retry::{RetryDecision, RetryPolicy};

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;

use crate::client::remote::{RemoteError, RemoteService};
use crate::client::session::SessionState;
use crate::client::sync::NetworkMonitor;
use crate::shared::error::{Result, ZenithError};
use crate::shared::record::{Habit, Record, RecordId, Table};

/// Field stamped with the session's user on created rows
const USER_ID_FIELD: &str = "user_id";

/// Where a mutation ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationReceipt {
    /// Accepted by the remote service; `id` is the server's id
    Applied { id: RecordId },
    /// Waiting in the offline queue
    Queued { id: RecordId, outcome: EnqueueOutcome },
}

impl MutationReceipt {
    /// Id the record now has in the cache
    pub fn id(&self) -> &RecordId {
        match self {
            MutationReceipt::Applied { id } | MutationReceipt::Queued { id, .. } => id,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, MutationReceipt::Queued { .. })
    }
}

/// Optimistic mutation façade over the cache, the queue and the remote
pub struct OfflineManager {
    queue: Arc<OperationQueue>,
    remote: Arc<dyn RemoteService>,
    cache: Arc<AppCache>,
    session: SessionState,
    network: NetworkMonitor,
    timeout: Duration,
    queue_first: bool,
}

impl std::fmt::Debug for OfflineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineManager")
            .field("timeout", &self.timeout)
            .field("queue_first", &self.queue_first)
            .finish()
    }
}

impl OfflineManager {
    pub fn new(
        queue: Arc<OperationQueue>,
        remote: Arc<dyn RemoteService>,
        cache: Arc<AppCache>,
        session: SessionState,
        network: NetworkMonitor,
        timeout: Duration,
    ) -> Self {
        Self {
            queue,
            remote,
            cache,
            session,
            network,
            timeout,
            queue_first: false,
        }
    }

    /// Queue every mutation instead of sending it directly
    pub fn with_queue_first(mut self, enabled: bool) -> Self {
        self.queue_first = enabled;
        self
    }

    pub fn cache(&self) -> &Arc<AppCache> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    /// Create a record; returns the id it carries in the cache
    ///
    /// The row is stamped with the session's user id unless the payload
    /// already names one.
    pub async fn create(&self, table: Table, mut payload: Record) -> Result<RecordId> {
        let session = self.session.current().ok_or(ZenithError::NotAuthenticated)?;
        payload
            .entry(USER_ID_FIELD.to_string())
            .or_insert_with(|| Value::from(session.user_id));

        let receipt = self
            .mutate(Mutation::insert(table, RecordId::temporary(), payload))
            .await?;
        Ok(receipt.id().clone())
    }

    pub async fn update(&self, table: Table, id: impl Into<RecordId>, patch: Record) -> Result<MutationReceipt> {
        self.mutate(Mutation::update(table, id, patch)).await
    }

    pub async fn delete(&self, table: Table, id: impl Into<RecordId>) -> Result<MutationReceipt> {
        self.mutate(Mutation::delete(table, id)).await
    }

    /// Flip a cached habit's completion for `today`
    pub async fn toggle_habit(&self, id: impl Into<RecordId>, today: NaiveDate) -> Result<MutationReceipt> {
        let id = id.into();
        let row = self
            .cache
            .get(Table::Habits, &id)
            .await
            .ok_or_else(|| ZenithError::validation("id", format!("habit {} is not loaded", id)))?;
        let habit: Habit = serde_json::from_value(Value::Object(row))?;
        let toggle = habit.toggle(today);
        tracing::debug!(habit = %id, completed = toggle.completed, streak = toggle.streak, "toggled habit");
        self.update(Table::Habits, id, toggle.to_patch()).await
    }

    /// Apply a mutation optimistically, then send or queue it
    pub async fn mutate(&self, mut mutation: Mutation) -> Result<MutationReceipt> {
        if !self.session.is_authenticated() {
            return Err(ZenithError::NotAuthenticated);
        }

        if mutation.operation != Operation::Insert {
            mutation.match_value = self.queue.resolve(mutation.table, &mutation.match_value).await?;
        }
        let pending = if mutation.operation == Operation::Insert {
            false
        } else {
            self.queue.has_pending_for(mutation.table, &mutation.match_value).await?
        };
        if mutation.match_value.is_temporary() && mutation.operation != Operation::Insert && !pending {
            return Err(ZenithError::unresolved(
                mutation.table.as_str(),
                mutation.match_value.to_string(),
            ));
        }

        let snapshot = self.cache.apply(&mutation).await;

        if !self.network.is_online() || self.queue_first || pending {
            return self.enqueue_or_rollback(mutation, snapshot).await;
        }

        let entry = QueueEntry::from_mutation(mutation.clone());
        match self.send(&entry).await {
            Ok(created) => Ok(self.applied(&mutation, created).await),
            Err(error) => {
                tracing::warn!(
                    table = %mutation.table,
                    operation = %mutation.operation,
                    error = %error,
                    "direct mutation failed, queueing"
                );
                self.enqueue_or_rollback(mutation, snapshot).await
            }
        }
    }

    async fn send(&self, entry: &QueueEntry) -> std::result::Result<Option<Record>, RemoteError> {
        match tokio::time::timeout(self.timeout, entry.send_to(self.remote.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        }
    }

    /// Swap an optimistic insert for the server's row
    async fn applied(&self, mutation: &Mutation, created: Option<Record>) -> MutationReceipt {
        let Some(canonical) = created else {
            return MutationReceipt::Applied {
                id: mutation.match_value.clone(),
            };
        };

        let id = RecordId::of(&canonical, &mutation.match_field).unwrap_or_else(|| mutation.match_value.clone());
        self.cache
            .reconcile(mutation.table, &mutation.match_value, canonical)
            .await;
        tracing::debug!(table = %mutation.table, %id, "created record remotely");
        MutationReceipt::Applied { id }
    }

    /// Queue `mutation`; if that fails, the cache forgets it too
    async fn enqueue_or_rollback(&self, mutation: Mutation, snapshot: RowSnapshot) -> Result<MutationReceipt> {
        let id = mutation.match_value.clone();
        match self.queue.enqueue(mutation).await {
            Ok(outcome) => Ok(MutationReceipt::Queued { id, outcome }),
            Err(error) => {
                tracing::warn!(%id, error = %error, "could not queue mutation, reverting cache");
                self.cache.rollback(snapshot).await;
                Err(error)
            }
        }
    }
}
