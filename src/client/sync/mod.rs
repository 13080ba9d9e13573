//! # Background Sync Service
//!
//! Decides when the queue processor runs. There is no timer: a background
//! task reacts to
//!
//! - connectivity returning (offline to online) while a session exists,
//! - a session being established while online,
//! - explicit requests (app brought to the foreground, manual "sync now").
//!
//! The processor itself enforces the session/connectivity gate and
//! single-flight, so overlapping triggers collapse into one run.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zenith::client::sync::{SyncService, SyncTrigger};
//! # fn example(processor: Arc<zenith::client::sync::QueueProcessor>,
//! #            network: zenith::client::sync::NetworkMonitor,
//! #            session: zenith::client::session::SessionState) {
//! let mut service = SyncService::new(processor, network, session);
//! service.start();
//! service.trigger(SyncTrigger::Foreground);
//! service.stop();
//! # }
//! ```

pub mod metrics;
pub mod network_monitor;
pub mod processor;
pub mod sync_state;

pub use metrics::SyncMetrics;
pub use network_monitor::{NetworkMonitor, NetworkStatus};
pub use processor::QueueProcessor;
pub use sync_state::{SkipReason, SyncEvent, SyncOutcome, SyncState, SyncTrigger};

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::client::session::{Session, SessionState};
use crate::shared::error::Result;

/// Event-driven trigger policy around a [`QueueProcessor`]
#[derive(Debug)]
pub struct SyncService {
    processor: Arc<QueueProcessor>,
    network: NetworkMonitor,
    session: SessionState,
    triggers: Option<mpsc::UnboundedSender<SyncTrigger>>,
    background_task: Option<JoinHandle<()>>,
}

impl SyncService {
    pub fn new(processor: Arc<QueueProcessor>, network: NetworkMonitor, session: SessionState) -> Self {
        Self {
            processor,
            network,
            session,
            triggers: None,
            background_task: None,
        }
    }

    pub fn processor(&self) -> &Arc<QueueProcessor> {
        &self.processor
    }

    pub fn is_running(&self) -> bool {
        self.background_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start watching for triggers; a second call is a no-op
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::debug!("sync service already running");
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let processor = Arc::clone(&self.processor);
        let network_rx = self.network.subscribe();
        let session_rx = self.session.subscribe();

        self.triggers = Some(tx);
        self.background_task = Some(tokio::spawn(async move {
            Self::trigger_loop(processor, network_rx, session_rx, rx).await;
        }));
        tracing::info!("sync service started");
    }

    /// Stop the background task
    pub fn stop(&mut self) {
        self.triggers = None;
        if let Some(handle) = self.background_task.take() {
            handle.abort();
            tracing::info!("sync service stopped");
        }
    }

    /// Ask the background task for a run; ignored while stopped
    pub fn trigger(&self, trigger: SyncTrigger) {
        match &self.triggers {
            Some(tx) => {
                if tx.send(trigger).is_err() {
                    tracing::warn!(?trigger, "sync service is not listening");
                }
            }
            None => tracing::debug!(?trigger, "sync service stopped; trigger dropped"),
        }
    }

    /// The app returned to the foreground
    pub fn notify_foreground(&self) {
        self.trigger(SyncTrigger::Foreground);
    }

    /// Run the processor now and wait for its outcome
    pub async fn request_sync(&self) -> Result<SyncOutcome> {
        Self::run(&self.processor, SyncTrigger::Manual).await
    }

    async fn trigger_loop(
        processor: Arc<QueueProcessor>,
        mut network_rx: watch::Receiver<NetworkStatus>,
        mut session_rx: watch::Receiver<Option<Session>>,
        mut requests: mpsc::UnboundedReceiver<SyncTrigger>,
    ) {
        let mut was_online = network_rx.borrow_and_update().is_online();
        let mut had_session = session_rx.borrow_and_update().is_some();

        loop {
            let trigger = tokio::select! {
                changed = network_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = network_rx.borrow_and_update().is_online();
                    let reconnected = online && !was_online;
                    was_online = online;
                    reconnected.then_some(SyncTrigger::Reconnected)
                }
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let has_session = session_rx.borrow_and_update().is_some();
                    let established = has_session && !had_session;
                    had_session = has_session;
                    established.then_some(SyncTrigger::SessionEstablished)
                }
                request = requests.recv() => match request {
                    Some(trigger) => Some(trigger),
                    None => break,
                },
            };

            if let Some(trigger) = trigger {
                if let Err(e) = Self::run(&processor, trigger).await {
                    tracing::error!("sync run failed: {}", e);
                }
            }
        }
        tracing::debug!("sync trigger loop exited");
    }

    async fn run(processor: &QueueProcessor, trigger: SyncTrigger) -> Result<SyncOutcome> {
        tracing::debug!(?trigger, "sync triggered");
        let outcome = processor.process().await?;
        tracing::debug!(?trigger, ?outcome, "sync run finished");
        Ok(outcome)
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Some(handle) = self.background_task.take() {
            handle.abort();
        }
    }
}
