//! Offline create, reconnect and reconcile

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use zenith::client::remote::{RemoteCall, RemoteError};
use zenith::client::sync::{SkipReason, SyncEvent, SyncOutcome};
use zenith::client::Session;
use zenith::shared::config::AppConfig;
use zenith::shared::error::ZenithError;
use zenith::shared::record::{record_from, Expense, ExpenseCategory, RecordId, Table};

use crate::common::*;
use crate::{assert_err, assert_ok, assert_pending};

#[tokio::test]
async fn test_offline_create_syncs_after_reconnect() {
    let mut client = TestClient::new().await;
    let state = &mut client.state;
    assert_pending!(state.queue(), 0);
    assert!(!state.session().is_authenticated());

    state.network().set_online(false);
    state.start_sync();
    state.sign_in(Session::new("user-1")).await;

    let temp = assert_ok!(state.mutations().create(Table::Expenses, coffee_expense()).await);
    assert!(temp.is_temporary());
    assert_pending!(state.queue(), 1);
    let cached = state.cache().get(Table::Expenses, &temp).await.unwrap();
    assert_eq!(cached["description"], json!("Coffee"));

    let mut events = state.processor().subscribe();
    state.network().set_online(true);

    let queue = state.queue().clone();
    eventually(|| {
        let queue = queue.clone();
        async move { queue.is_empty().await.unwrap() }
    })
    .await;
    loop {
        if let SyncEvent::Completed { applied } = events.recv().await.unwrap() {
            assert_eq!(applied, 1);
            break;
        }
    }

    let expenses: Vec<Expense> = state.cache().typed().await.unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].id, RecordId::Number(1));
    assert_eq!(expenses[0].category, ExpenseCategory::Food);
    assert!(!state.cache().contains_temporary_ids().await);
    assert!(state.queue().store().load_id_map().await.unwrap().is_empty());

    let sync_state = state.sync_state().await.unwrap();
    assert!(sync_state.last_sync.is_some());
    assert_eq!(sync_state.pending_operations, 0);
    state.stop_sync();
}

#[tokio::test]
async fn test_offline_edits_collapse_into_one_create() {
    let client = TestClient::new().await;
    let state = &client.state;
    state.network().set_online(false);
    state.sign_in(Session::new("user-1")).await;

    let id = state.mutations().create(Table::Notes, note("Draft")).await.unwrap();
    state
        .mutations()
        .update(Table::Notes, id.clone(), record_from(json!({"content": "Body"})))
        .await
        .unwrap();
    assert_pending!(state.queue(), 1);

    state.network().set_online(true);
    let outcome = state.sync().request_sync().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Synced { applied: 1 });

    let creates: Vec<RemoteCall> = client
        .remote
        .calls()
        .await
        .into_iter()
        .filter(|call| call.is_mutation())
        .collect();
    assert_eq!(creates.len(), 1);
    assert_matches!(&creates[0], RemoteCall::Create { record, .. } => {
        assert_eq!(record["title"], json!("Draft"));
        assert_eq!(record["content"], json!("Body"));
        assert_eq!(record["user_id"], json!("user-1"));
    });
}

#[tokio::test]
async fn test_created_then_deleted_offline_never_reaches_remote() {
    let client = TestClient::new().await;
    let state = &client.state;
    state.network().set_online(false);
    state.sign_in(Session::new("user-1")).await;

    let id = state.mutations().create(Table::Habits, habit("Stretch")).await.unwrap();
    state.mutations().delete(Table::Habits, id).await.unwrap();
    assert_pending!(state.queue(), 0);

    state.network().set_online(true);
    let outcome = state.sync().request_sync().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Synced { applied: 0 });
    assert_eq!(client.remote.mutation_count().await, 0);
}

#[tokio::test]
async fn test_rejected_entry_is_dead_lettered_and_others_sync() {
    // Five permanent failures before dead-lettering; a run makes at most pending + 2 attempts
    let client = TestClient::with_config(AppConfig::builder().dead_letter_after(5).build().unwrap()).await;
    let state = &client.state;
    client
        .remote
        .fail_when(|call| match call {
            RemoteCall::Update { table: Table::Budgets, .. } => Some(RemoteError::from_status(400, "bad column")),
            _ => None,
        })
        .await;
    state.network().set_online(false);
    state.sign_in(Session::new("user-1")).await;

    state
        .mutations()
        .update(Table::Budgets, 1, record_from(json!({"nonexistent": true})))
        .await
        .unwrap();
    state.mutations().create(Table::Notes, note("Keep")).await.unwrap();

    state.network().set_online(true);
    let first = state.sync().request_sync().await.unwrap();
    assert_eq!(first, SyncOutcome::Incomplete { remaining: 1 });

    let second = state.sync().request_sync().await.unwrap();
    assert_eq!(second, SyncOutcome::Incomplete { remaining: 0 });
    assert!(!second.fully_synced());
    assert!(state.queue().is_empty().await.unwrap());

    let letters = state.queue().dead_letters().await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].entry.table, Table::Budgets);
    assert_eq!(letters[0].entry.attempts, 5);
    assert_eq!(client.remote.rows(Table::Notes).await.len(), 1);

    let metrics = state.processor().metrics().await;
    assert_eq!(metrics.total_runs, 2);
    assert_eq!(metrics.dead_lettered, 1);
}

#[tokio::test]
async fn test_sync_requires_session_and_connectivity() {
    let client = TestClient::new().await;
    let state = &client.state;

    let outcome = state.sync().request_sync().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Skipped { reason: SkipReason::NoSession });

    state.network().set_online(false);
    state.sign_in(Session::new("user-1")).await;
    let outcome = state.sync().request_sync().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Skipped { reason: SkipReason::Offline });
    assert!(!outcome.fully_synced());
}

#[tokio::test]
async fn test_mutations_require_session() {
    let client = TestClient::new().await;
    let result = client.state.mutations().create(Table::Savings, record_from(json!({"name": "Trip"}))).await;
    assert_err!(result, ZenithError::NotAuthenticated);
}
