//! # State Reconciliation
//!
//! After the queue drains completely the cache is rebuilt from the remote
//! service instead of being patched entry by entry: every collection is
//! fetched concurrently and replaces its cached copy. This also replaces any
//! temporary id still in the cache with the server's.
//!
//! A collection whose fetch fails keeps its cached rows.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use super::optimistic::AppCache;
use crate::client::remote::{RemoteError, RemoteService};
use crate::shared::record::Table;

/// Outcome of a full refetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefetchReport {
    /// Collections replaced, with their row counts
    pub refreshed: Vec<(Table, usize)>,
    /// Collections left untouched
    pub failed: Vec<(Table, RemoteError)>,
}

impl RefetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Rebuilds the cache from the system of record
#[derive(Clone)]
pub struct Reconciler {
    remote: Arc<dyn RemoteService>,
    cache: Arc<AppCache>,
    timeout: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").field("timeout", &self.timeout).finish()
    }
}

impl Reconciler {
    pub fn new(remote: Arc<dyn RemoteService>, cache: Arc<AppCache>, timeout: Duration) -> Self {
        Self { remote, cache, timeout }
    }

    /// Refetch one collection
    pub async fn refetch(&self, table: Table) -> Result<usize, RemoteError> {
        let rows = tokio::time::timeout(self.timeout, self.remote.fetch_all(table))
            .await
            .map_err(|_| RemoteError::Timeout(self.timeout))??;
        let count = rows.len();
        self.cache.replace_all(table, rows).await;
        Ok(count)
    }

    /// Refetch every collection concurrently
    pub async fn refetch_all(&self) -> RefetchReport {
        let results = join_all(Table::ALL.into_iter().map(|table| async move { (table, self.refetch(table).await) })).await;

        let mut report = RefetchReport::default();
        for (table, result) in results {
            match result {
                Ok(count) => report.refreshed.push((table, count)),
                Err(e) => {
                    tracing::warn!(%table, error = %e, "refetch failed; keeping cached rows");
                    report.failed.push((table, e));
                }
            }
        }
        tracing::debug!(refreshed = report.refreshed.len(), failed = report.failed.len(), "cache refetched");
        report
    }
}
