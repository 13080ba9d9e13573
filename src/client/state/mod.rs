//! Application state
//!
//! Wires storage, the offline queue, the cache, the processor, the mutation
//! façade and the trigger service into one owner.

use std::sync::Arc;

use crate::client::config::Config;
use crate::client::local_db::{LocalDatabase, QueueStore};
use crate::client::offline::{AppCache, OfflineManager, OperationQueue, RefetchReport, RetryPolicy};
use crate::client::remote::RemoteService;
use crate::client::session::{Session, SessionState};
use crate::client::sync::{NetworkMonitor, QueueProcessor, SyncService, SyncState};
use crate::shared::error::Result;

/// Central state of the offline-first client
#[derive(Debug)]
pub struct AppState {
    config: Config,
    database: LocalDatabase,
    cache: Arc<AppCache>,
    session: SessionState,
    network: NetworkMonitor,
    processor: Arc<QueueProcessor>,
    manager: OfflineManager,
    sync: SyncService,
}

impl AppState {
    /// Open the on-disk database named by `config` and wire everything to `remote`
    pub async fn open(config: Config, remote: Arc<dyn RemoteService>) -> Result<Self> {
        Self::open_with_session(config, SessionState::new(), remote).await
    }

    /// Like [`AppState::open`], sharing `session` with a remote that already holds it
    pub async fn open_with_session(
        config: Config,
        session: SessionState,
        remote: Arc<dyn RemoteService>,
    ) -> Result<Self> {
        let path = config.db_path();
        tracing::info!(path = %path.display(), "opening local database");
        let database = LocalDatabase::open(&path).await?;
        Ok(Self::assemble(config, database, session, remote))
    }

    pub fn with_database(config: Config, database: LocalDatabase, remote: Arc<dyn RemoteService>) -> Self {
        Self::assemble(config, database, SessionState::new(), remote)
    }

    fn assemble(
        config: Config,
        database: LocalDatabase,
        session: SessionState,
        remote: Arc<dyn RemoteService>,
    ) -> Self {
        let app = config.app();
        let timeout = app.remote_timeout;

        let queue = Arc::new(OperationQueue::new(
            QueueStore::new(database.clone()),
            RetryPolicy::from_config(app),
            app.coalesce_updates,
        ));
        let cache = Arc::new(AppCache::new());
        let network = NetworkMonitor::default();

        let processor = Arc::new(QueueProcessor::new(
            queue.clone(),
            remote.clone(),
            cache.clone(),
            session.clone(),
            network.clone(),
            timeout,
        ));
        let manager = OfflineManager::new(queue, remote, cache.clone(), session.clone(), network.clone(), timeout)
            .with_queue_first(app.queue_first);
        let sync = SyncService::new(processor.clone(), network.clone(), session.clone());

        Self {
            config,
            database,
            cache,
            session,
            network,
            processor,
            manager,
            sync,
        }
    }

    /// Establish `session` and load every collection when online
    ///
    /// Returns the refetch report, or `None` when offline.
    pub async fn sign_in(&self, session: Session) -> Option<RefetchReport> {
        self.session.establish(session);
        if !self.network.is_online() {
            tracing::info!("signed in offline; showing cached data");
            return None;
        }

        let report = self.processor.reconciler().refetch_all().await;
        if !report.is_complete() {
            tracing::warn!(failed = report.failed.len(), "initial fetch incomplete");
        }
        Some(report)
    }

    /// End the session and drop cached data; queued mutations are kept
    pub async fn sign_out(&self) {
        self.session.end();
        self.cache.clear().await;
    }

    /// Start reacting to connectivity and session changes
    pub fn start_sync(&mut self) {
        self.sync.start();
    }

    pub fn stop_sync(&mut self) {
        self.sync.stop();
    }

    pub async fn sync_state(&self) -> Result<SyncState> {
        self.processor.state().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &LocalDatabase {
        &self.database
    }

    pub fn cache(&self) -> &Arc<AppCache> {
        &self.cache
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn processor(&self) -> &Arc<QueueProcessor> {
        &self.processor
    }

    pub fn queue(&self) -> &Arc<OperationQueue> {
        self.processor.queue()
    }

    pub fn mutations(&self) -> &OfflineManager {
        &self.manager
    }

    pub fn sync(&self) -> &SyncService {
        &self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::remote::InMemoryRemote;
    use crate::shared::config::AppConfig;
    use crate::shared::record::{record_from, Table};
    use serde_json::json;

    async fn app_state(remote: Arc<InMemoryRemote>) -> AppState {
        let database = LocalDatabase::open_in_memory().await.unwrap();
        AppState::with_database(Config::from_app(AppConfig::default()), database, remote)
    }

    #[tokio::test]
    async fn test_sign_in_loads_collections() {
        let remote = Arc::new(InMemoryRemote::new());
        remote
            .seed(Table::Notes, vec![record_from(json!({"id": 1, "title": "Hello"}))])
            .await;
        let state = app_state(remote).await;

        let report = state.sign_in(Session::new("user-1")).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(state.cache().records(Table::Notes).await.len(), 1);
    }

    #[tokio::test]
    async fn test_sign_in_offline_skips_fetch() {
        let remote = Arc::new(InMemoryRemote::new());
        let state = app_state(remote.clone()).await;
        state.network().set_online(false);

        assert!(state.sign_in(Session::new("user-1")).await.is_none());
        assert!(state.session().is_authenticated());
        assert!(remote.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_keeps_queue() {
        let remote = Arc::new(InMemoryRemote::new());
        let state = app_state(remote).await;
        state.network().set_online(false);
        state.sign_in(Session::new("user-1")).await;

        state
            .mutations()
            .create(Table::Notes, record_from(json!({"title": "Offline"})))
            .await
            .unwrap();
        state.sign_out().await;

        assert!(!state.session().is_authenticated());
        assert!(state.cache().records(Table::Notes).await.is_empty());
        assert_eq!(state.queue().len().await.unwrap(), 1);
        assert_eq!(state.sync_state().await.unwrap().pending_operations, 1);
    }
}
