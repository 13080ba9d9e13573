//! Property-based tests for queue draining

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use zenith::client::offline::{AppCache, Mutation, OperationQueue, RetryPolicy};
use zenith::client::remote::{InMemoryRemote, RemoteCall, RemoteError};
use zenith::client::sync::{NetworkMonitor, QueueProcessor, SyncOutcome};
use zenith::client::{Session, SessionState};
use zenith::shared::record::{RecordId, Table};

use crate::common::memory_store;

/// Drain a queue of `len` deletes where entry `failing` always fails
async fn drain_with_one_failure(len: usize, failing: usize, transient: bool) -> (SyncOutcome, Vec<RecordId>) {
    let remote = Arc::new(InMemoryRemote::new());
    let bad = RecordId::Number(failing as i64);
    remote
        .fail_when(move |call| match call {
            RemoteCall::Delete { match_value, .. } if *match_value == bad => Some(if transient {
                RemoteError::Network("reset".to_string())
            } else {
                RemoteError::from_status(409, "conflict")
            }),
            _ => None,
        })
        .await;

    let queue = Arc::new(OperationQueue::new(memory_store().await, RetryPolicy::default(), false));
    for id in 0..len {
        queue.enqueue(Mutation::delete(Table::Notes, id as i64)).await.unwrap();
    }

    let session = SessionState::new();
    session.establish(Session::new("user-1"));
    let processor = QueueProcessor::new(
        queue.clone(),
        remote,
        Arc::new(AppCache::new()),
        session,
        NetworkMonitor::default(),
        Duration::from_secs(5),
    );

    let outcome = processor.process().await.unwrap();
    let remaining = queue
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|entry| entry.match_value)
        .collect();
    (outcome, remaining)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_one_failing_entry_terminates(
        (len, failing) in (1usize..8).prop_flat_map(|len| (Just(len), 0..len)),
        transient in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (outcome, remaining) = runtime.block_on(drain_with_one_failure(len, failing, transient));

        prop_assert_eq!(outcome, SyncOutcome::Incomplete { remaining: 1 });
        prop_assert_eq!(remaining, vec![RecordId::Number(failing as i64)]);
    }
}
