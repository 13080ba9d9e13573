//! Session State
//!
//! Holds the current authenticated user. Authentication itself happens
//! elsewhere; the sync engine only needs to know whether a session exists,
//! and the HTTP remote needs its access token.

use std::sync::Arc;

use tokio::sync::watch;

/// An authenticated user session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub access_token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Observable session slot, cheap to clone
#[derive(Debug, Clone)]
pub struct SessionState {
    tx: Arc<watch::Sender<Option<Session>>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn establish(&self, session: Session) {
        tracing::info!(user_id = %session.user_id, "session established");
        self.tx.send_replace(Some(session));
    }

    pub fn end(&self) {
        if self.tx.send_replace(None).is_some() {
            tracing::info!("session ended");
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}
