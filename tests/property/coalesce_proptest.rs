//! Property-based tests for queue coalescing

use proptest::prelude::*;
use serde_json::Value;
use zenith::client::offline::queue::{coalesce, EnqueueOutcome, Mutation, Operation, QueueEntry};
use zenith::shared::record::{Record, RecordId, Table};

fn table() -> impl Strategy<Value = Table> {
    prop::sample::select(Table::ALL.to_vec())
}

fn payload() -> impl Strategy<Value = Record> {
    prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..5).prop_map(|fields| {
        fields
            .into_iter()
            .map(|(key, value)| (key, Value::from(value)))
            .collect()
    })
}

/// Unrelated entries already waiting in the queue
fn background() -> impl Strategy<Value = Vec<QueueEntry>> {
    prop::collection::vec((table(), 1..1000i64, payload()), 0..6).prop_map(|rows| {
        rows.into_iter()
            .map(|(table, id, payload)| QueueEntry::from_mutation(Mutation::update(table, id, payload)))
            .collect()
    })
}

proptest! {
    #[test]
    fn test_insert_then_delete_cancels(table in table(), payload in payload(), mut queue in background()) {
        let before = queue.clone();
        let temp = RecordId::temporary();

        coalesce(&mut queue, Mutation::insert(table, temp.clone(), payload), None, false);
        let outcome = coalesce(&mut queue, Mutation::delete(table, temp), None, false);

        let cancelled = matches!(outcome, EnqueueOutcome::CancelledInsert { .. });
        prop_assert!(cancelled);
        prop_assert_eq!(queue, before);
    }

    #[test]
    fn test_insert_then_update_merges(
        table in table(),
        a in any::<i32>(),
        b in any::<i32>(),
        mut queue in background(),
    ) {
        let temp = RecordId::temporary();
        let len = queue.len();
        let mut insert = Record::new();
        insert.insert("a".to_string(), Value::from(a));
        let mut patch = Record::new();
        patch.insert("b".to_string(), Value::from(b));

        coalesce(&mut queue, Mutation::insert(table, temp.clone(), insert), None, false);
        coalesce(&mut queue, Mutation::update(table, temp, patch), None, false);

        prop_assert_eq!(queue.len(), len + 1);
        let entry = &queue[len];
        prop_assert_eq!(entry.operation, Operation::Insert);
        prop_assert_eq!(entry.payload.len(), 2);
        prop_assert_eq!(&entry.payload["a"], &Value::from(a));
        prop_assert_eq!(&entry.payload["b"], &Value::from(b));
    }

    #[test]
    fn test_update_without_pending_insert_appends(
        table in table(),
        id in 1..1000i64,
        patch in payload(),
        mut queue in background(),
    ) {
        let len = queue.len();
        let outcome = coalesce(&mut queue, Mutation::update(table, id, patch), None, false);

        let appended = matches!(outcome, EnqueueOutcome::Appended { .. });
        prop_assert!(appended);
        prop_assert_eq!(queue.len(), len + 1);
        prop_assert_eq!(&queue[len].id, outcome.entry_id());
    }

    #[test]
    fn test_pinned_insert_is_never_cancelled(table in table(), payload in payload()) {
        let temp = RecordId::temporary();
        let mut queue = Vec::new();
        let insert = coalesce(&mut queue, Mutation::insert(table, temp.clone(), payload), None, false);

        coalesce(&mut queue, Mutation::delete(table, temp), Some(insert.entry_id()), false);

        prop_assert_eq!(queue.len(), 2);
        prop_assert_eq!(queue[1].operation, Operation::Delete);
    }
}
