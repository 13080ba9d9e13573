//! # Queue Processor
//!
//! Drains the offline queue against the remote service.
//!
//! Each iteration takes the head entry, sends it, and then either removes it
//! or hands the failure to the queue (rotate to the tail, or dead-letter).
//! A run makes at most `initial length + 2` attempts, so a permanently
//! failing entry cannot keep it alive. When the queue ends empty the cache is
//! refetched from the remote service; otherwise the remaining entries stay
//! persisted for the next trigger.
//!
//! Runs are single-flight: a call made while another run is active returns
//! [`SkipReason::AlreadyRunning`] without waiting for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use super::metrics::{RunStats, SyncMetrics};
use super::network_monitor::NetworkMonitor;
use super::sync_state::{SkipReason, SyncEvent, SyncOutcome, SyncState};
use crate::client::offline::optimistic::AppCache;
use crate::client::offline::queue::{Completion, FailureDisposition, OperationQueue, QueueEntry};
use crate::client::offline::reconciliation::Reconciler;
use crate::client::remote::{RemoteError, RemoteService};
use crate::client::session::SessionState;
use crate::shared::error::Result;
use crate::shared::record::Record;

/// Capacity of the event channel; slow subscribers miss older events
const EVENT_CAPACITY: usize = 64;

/// Clears the running flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct QueueProcessor {
    queue: Arc<OperationQueue>,
    remote: Arc<dyn RemoteService>,
    cache: Arc<AppCache>,
    reconciler: Reconciler,
    session: SessionState,
    network: NetworkMonitor,
    timeout: Duration,
    running: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
    metrics: RwLock<SyncMetrics>,
    last_error: RwLock<Option<String>>,
}

impl std::fmt::Debug for QueueProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProcessor")
            .field("timeout", &self.timeout)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl QueueProcessor {
    pub fn new(
        queue: Arc<OperationQueue>,
        remote: Arc<dyn RemoteService>,
        cache: Arc<AppCache>,
        session: SessionState,
        network: NetworkMonitor,
        timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            reconciler: Reconciler::new(remote.clone(), cache.clone(), timeout),
            queue,
            remote,
            cache,
            session,
            network,
            timeout,
            running: AtomicBool::new(false),
            events,
            metrics: RwLock::new(SyncMetrics::new()),
            last_error: RwLock::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub async fn metrics(&self) -> SyncMetrics {
        self.metrics.read().await.clone()
    }

    /// Snapshot for status displays
    pub async fn state(&self) -> Result<SyncState> {
        Ok(SyncState {
            is_syncing: self.is_running(),
            last_sync: self.queue.store().load_last_sync().await?,
            pending_operations: self.queue.len().await?,
            dead_letters: self.queue.dead_letters().await?.len(),
            network_status: self.network.status(),
            last_error: self.last_error.read().await.clone(),
        })
    }

    /// Drain the queue once
    pub async fn process(&self) -> Result<SyncOutcome> {
        if !self.session.is_authenticated() {
            tracing::debug!("sync skipped: no session");
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::NoSession,
            });
        }
        if !self.network.is_online() {
            tracing::debug!("sync skipped: offline");
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::Offline,
            });
        }
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::debug!("sync skipped: run already in progress");
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::AlreadyRunning,
            });
        };

        let initial = self.queue.len().await?;
        if initial == 0 {
            return Ok(SyncOutcome::Synced { applied: 0 });
        }

        let started = Instant::now();
        tracing::info!(pending = initial, "sync started");
        self.emit(SyncEvent::Started { pending: initial });

        let mut stats = RunStats::default();
        for _ in 0..initial + 2 {
            let Some(entry) = self.queue.begin().await? else {
                break;
            };

            match self.apply(&entry).await {
                Ok(created) => {
                    if let Completion::Applied { resolved } = self.queue.complete(&entry.id, created.as_ref()).await? {
                        stats.applied += 1;
                        if let Some(mapping) = resolved {
                            self.cache
                                .rename_id(mapping.table, &mapping.temporary, &mapping.resolved)
                                .await;
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        entry_id = %entry.id,
                        table = %entry.table,
                        operation = %entry.operation,
                        error = %error,
                        "sync failed for entry"
                    );
                    *self.last_error.write().await = Some(error.to_string());

                    match self.queue.fail(&entry.id, &error).await? {
                        FailureDisposition::Rotated { .. } => stats.rotations += 1,
                        FailureDisposition::DeadLettered { reason } => {
                            stats.dead_lettered += 1;
                            self.emit(SyncEvent::DeadLettered {
                                entry_id: entry.id.clone(),
                                table: entry.table,
                                reason,
                            });
                        }
                        FailureDisposition::Cancelled | FailureDisposition::Vanished => {}
                    }
                }
            }

            if self.queue.is_empty().await? {
                break;
            }
        }

        let outcome = if self.queue.clear_if_drained().await? {
            // Rejected changes live on as dead letters; the cache takes the server's rows.
            let report = self.reconciler.refetch_all().await;
            if report.is_complete() {
                self.queue.clear_id_map().await?;
            }

            if stats.dead_lettered > 0 {
                tracing::warn!(dead_lettered = stats.dead_lettered, "queue drained with rejected entries");
                self.emit(SyncEvent::Incomplete { remaining: 0 });
                SyncOutcome::Incomplete { remaining: 0 }
            } else {
                self.queue.store().save_last_sync(Utc::now()).await?;
                *self.last_error.write().await = None;

                tracing::info!(applied = stats.applied, "sync complete");
                self.emit(SyncEvent::Completed { applied: stats.applied });
                SyncOutcome::Synced { applied: stats.applied }
            }
        } else {
            let remaining = self.queue.len().await?;
            tracing::warn!(remaining, "some items failed to sync");
            self.emit(SyncEvent::Incomplete { remaining });
            SyncOutcome::Incomplete { remaining }
        };

        self.metrics.write().await.record_run(&outcome, stats, started.elapsed());
        Ok(outcome)
    }

    /// Send one entry, bounded by the remote timeout
    async fn apply(&self, entry: &QueueEntry) -> std::result::Result<Option<Record>, RemoteError> {
        match tokio::time::timeout(self.timeout, entry.send_to(self.remote.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
