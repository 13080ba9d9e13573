//! Client fixtures
//!
//! A fully wired [`AppState`] over an in-memory database and an
//! [`InMemoryRemote`], plus payload builders for the record tables.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use zenith::client::local_db::LocalDatabase;
use zenith::client::remote::InMemoryRemote;
use zenith::client::{AppState, Config};
use zenith::shared::config::AppConfig;
use zenith::shared::record::{record_from, Record};

/// Client state plus the remote it talks to
pub struct TestClient {
    pub remote: Arc<InMemoryRemote>,
    pub state: AppState,
}

impl TestClient {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(app: AppConfig) -> Self {
        let remote = Arc::new(InMemoryRemote::new());
        let database = LocalDatabase::open_in_memory()
            .await
            .expect("Failed to open in-memory database");
        let state = AppState::with_database(Config::from_app(app), database, remote.clone());
        Self { remote, state }
    }
}

/// Poll `condition` until it holds, failing after two seconds
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within 2s");
}

pub fn coffee_expense() -> Record {
    record_from(json!({
        "description": "Coffee",
        "amount": 15000,
        "category": "Food",
        "date": "2024-05-01T08:00:00Z"
    }))
}

pub fn note(title: &str) -> Record {
    record_from(json!({"title": title, "content": ""}))
}

pub fn habit(name: &str) -> Record {
    record_from(json!({"name": name, "category": "health", "completed_dates": [], "streak": 0}))
}
