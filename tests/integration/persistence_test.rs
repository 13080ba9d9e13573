//! Queue persistence across restarts

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use zenith::client::local_db::schema::{QUEUE_KEY, LAST_SYNC_KEY};
use zenith::client::offline::{EntryId, Mutation, Operation, OperationQueue, RetryPolicy};
use zenith::client::remote::InMemoryRemote;
use zenith::client::{AppState, Config, Session};
use zenith::shared::config::AppConfig;
use zenith::shared::record::{record_from, RecordId, Table};

use crate::assert_pending;
use crate::common::*;

fn config_for(db: &TestDatabase) -> Config {
    Config::from_app(AppConfig::builder().data_dir(db.data_dir()).build().unwrap())
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let db = TestDatabase::new();
    let before = {
        let queue = OperationQueue::new(db.store().await, RetryPolicy::default(), false);
        queue
            .enqueue(Mutation::insert(Table::Notes, RecordId::temporary(), note("One")))
            .await
            .unwrap();
        queue
            .enqueue(Mutation::delete(Table::Expenses, 12))
            .await
            .unwrap();
        let snapshot = queue.snapshot().await.unwrap();
        queue.store().database().close().await;
        snapshot
    };

    let queue = OperationQueue::new(db.store().await, RetryPolicy::default(), false);
    assert_eq!(queue.snapshot().await.unwrap(), before);
    assert_eq!(before[1].operation, Operation::Delete);
}

#[tokio::test]
async fn test_reads_queue_written_in_legacy_layout() {
    let db = TestDatabase::new();
    let database = db.open().await;
    let legacy = json!([
        {
            "id": "1712345678999x7y8z9abc",
            "table": "expenses",
            "type": "INSERT",
            "payload": {"description": "Coffee", "amount": 15000, "category": "Food"},
            "matchField": "id",
            "matchValue": "temp-1714550000000"
        },
        {
            "id": "1712345680123m4n5p6qrs",
            "table": "budgets",
            "type": "UPDATE",
            "payload": {"amount": 500000},
            "matchField": "category",
            "matchValue": "Food"
        }
    ]);
    database.set(QUEUE_KEY, &legacy.to_string()).await.unwrap();

    let queue = OperationQueue::new(db.store().await, RetryPolicy::default(), false);
    let entries = queue.snapshot().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, EntryId::from("1712345678999x7y8z9abc"));
    assert_eq!(entries[0].attempts, 0);
    assert_eq!(entries[0].match_value, Some(RecordId::from("temp-1714550000000")));
    assert!(entries[0].match_value.as_ref().unwrap().is_temporary());
    assert_eq!(entries[1].operation, Operation::Update);
    assert_eq!(entries[1].match_field, "category");

    // A new mutation appends without dropping the inherited entries
    queue.enqueue(Mutation::delete(Table::Notes, 3)).await.unwrap();
    assert_pending!(queue, 3);
    let head = queue.begin().await.unwrap().unwrap();
    assert_eq!(head.id.as_str(), "1712345678999x7y8z9abc");
}

#[tokio::test]
async fn test_corrupt_queue_reads_as_empty() {
    let db = TestDatabase::new();
    db.open().await.set(QUEUE_KEY, "{not json").await.unwrap();

    let queue = OperationQueue::new(db.store().await, RetryPolicy::default(), false);
    assert_pending!(queue, 0);

    // The next write replaces the corrupt value
    queue.enqueue(Mutation::delete(Table::Savings, 1)).await.unwrap();
    assert_pending!(queue, 1);
}

#[tokio::test]
async fn test_pending_mutations_survive_app_restart() {
    let db = TestDatabase::new();
    let remote = Arc::new(InMemoryRemote::new());

    {
        let state = AppState::open(config_for(&db), remote.clone()).await.unwrap();
        state.network().set_online(false);
        state.sign_in(Session::new("user-1")).await;
        state.mutations().create(Table::Expenses, coffee_expense()).await.unwrap();
        assert_pending!(state.queue(), 1);
        state.database().close().await;
    }

    let state = AppState::open(config_for(&db), remote.clone()).await.unwrap();
    assert_pending!(state.queue(), 1);
    state.sign_in(Session::new("user-1")).await;
    let outcome = state.sync().request_sync().await.unwrap();
    assert!(outcome.fully_synced());

    // A drained queue leaves no persisted value behind
    assert_eq!(state.database().get(QUEUE_KEY).await.unwrap(), None);
    assert!(state.database().get(LAST_SYNC_KEY).await.unwrap().is_some());
    assert_eq!(remote.rows(Table::Expenses).await.len(), 1);
}

#[tokio::test]
async fn test_dead_letters_survive_restart() {
    let db = TestDatabase::new();
    let entry_id = {
        let queue = OperationQueue::new(db.store().await, RetryPolicy::new(1), false);
        queue
            .enqueue(Mutation::update(Table::Budgets, 3, record_from(json!({"amount": 1}))))
            .await
            .unwrap();
        let entry = queue.begin().await.unwrap().unwrap();
        queue
            .fail(&entry.id, &zenith::client::remote::RemoteError::from_status(422, "check violation"))
            .await
            .unwrap();
        queue.store().database().close().await;
        entry.id
    };

    let queue = OperationQueue::new(db.store().await, RetryPolicy::default(), false);
    let letters = queue.dead_letters().await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].entry.id, entry_id);

    queue.requeue_dead_letter(&entry_id).await.unwrap();
    assert_pending!(queue, 1);
    assert!(queue.dead_letters().await.unwrap().is_empty());
}
