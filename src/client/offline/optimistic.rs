//! # Optimistic Application Cache
//!
//! In-memory copy of every collection the UI reads. Each mutation is applied
//! here before it reaches the remote service (or the queue), so reads reflect
//! the change immediately.
//!
//! ## Features
//!
//! - **Immediate updates**: inserts, patches and deletes apply synchronously
//! - **Rollback**: every applied change can be undone from its snapshot
//! - **Ordering**: inserts land at the front of newest-first collections
//! - **Reconciliation**: replace an optimistic row with the server's copy,
//!   or rename a temporary id once it is resolved
//! - **Typed reads**: deserialize a collection into its record struct

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::queue::{Mutation, Operation};
use crate::shared::error::Result;
use crate::shared::record::{Record, RecordId, Table, TableRecord, DEFAULT_MATCH_FIELD};

/// Rows a mutation touched, as they were before it applied
#[derive(Debug, Clone, PartialEq)]
pub struct RowSnapshot {
    table: Table,
    field: String,
    id: RecordId,
    previous: Vec<(usize, Record)>,
}

/// Cached collections
#[derive(Debug, Default)]
pub struct AppCache {
    tables: RwLock<HashMap<Table, Vec<Record>>>,
}

impl AppCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a mutation optimistically
    ///
    /// The returned snapshot undoes the change through [`AppCache::rollback`].
    pub async fn apply(&self, mutation: &Mutation) -> RowSnapshot {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(mutation.table).or_default();
        let field = mutation.match_field.as_str();
        let snapshot = RowSnapshot {
            table: mutation.table,
            field: field.to_string(),
            id: mutation.match_value.clone(),
            previous: rows
                .iter()
                .enumerate()
                .filter(|(_, row)| matches(row, field, &mutation.match_value))
                .map(|(index, row)| (index, row.clone()))
                .collect(),
        };

        match mutation.operation {
            Operation::Insert => {
                let mut row = mutation.payload.clone();
                row.insert(field.to_string(), mutation.match_value.to_value());
                if mutation.table.inserts_at_front() {
                    rows.insert(0, row);
                } else {
                    rows.push(row);
                }
            }
            Operation::Update => {
                for row in rows.iter_mut().filter(|row| matches(row, field, &mutation.match_value)) {
                    for (key, value) in &mutation.payload {
                        row.insert(key.clone(), value.clone());
                    }
                }
            }
            Operation::Delete => rows.retain(|row| !matches(row, field, &mutation.match_value)),
        }
        snapshot
    }

    /// Put the rows recorded in `snapshot` back where they were
    pub async fn rollback(&self, snapshot: RowSnapshot) {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(snapshot.table).or_default();
        rows.retain(|row| !matches(row, &snapshot.field, &snapshot.id));
        for (index, row) in snapshot.previous {
            let index = index.min(rows.len());
            rows.insert(index, row);
        }
        tracing::debug!(table = %snapshot.table, id = %snapshot.id, "optimistic change rolled back");
    }

    /// Swap the row stored under `local_id` for the server's canonical copy
    pub async fn reconcile(&self, table: Table, local_id: &RecordId, canonical: Record) {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table).or_default();
        match rows.iter_mut().find(|row| matches(row, DEFAULT_MATCH_FIELD, local_id)) {
            Some(row) => *row = canonical,
            None => tracing::debug!(%table, %local_id, "reconciled row no longer cached"),
        }
    }

    /// Rename a record's id in place; returns whether a row was found
    pub async fn rename_id(&self, table: Table, from: &RecordId, to: &RecordId) -> bool {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(&table) else {
            return false;
        };
        let mut renamed = false;
        for row in rows.iter_mut().filter(|row| matches(row, DEFAULT_MATCH_FIELD, from)) {
            row.insert(DEFAULT_MATCH_FIELD.to_string(), to.to_value());
            renamed = true;
        }
        renamed
    }

    pub async fn replace_all(&self, table: Table, rows: Vec<Record>) {
        self.tables.write().await.insert(table, rows);
    }

    /// Rows of a collection, in display order
    pub async fn records(&self, table: Table) -> Vec<Record> {
        self.tables.read().await.get(&table).cloned().unwrap_or_default()
    }

    pub async fn get(&self, table: Table, id: &RecordId) -> Option<Record> {
        let tables = self.tables.read().await;
        tables
            .get(&table)?
            .iter()
            .find(|row| matches(row, DEFAULT_MATCH_FIELD, id))
            .cloned()
    }

    /// Deserialize a whole collection
    pub async fn typed<T: TableRecord>(&self) -> Result<Vec<T>> {
        let rows = self.records(T::TABLE).await;
        rows.into_iter()
            .map(|row| serde_json::from_value(serde_json::Value::Object(row)).map_err(Into::into))
            .collect()
    }

    pub async fn clear(&self) {
        self.tables.write().await.clear();
    }

    /// Whether any cached row still carries a locally generated id
    pub async fn contains_temporary_ids(&self) -> bool {
        let tables = self.tables.read().await;
        tables.values().flatten().any(|row| {
            RecordId::of(row, DEFAULT_MATCH_FIELD).is_some_and(|id| id.is_temporary())
        })
    }
}

fn matches(row: &Record, field: &str, id: &RecordId) -> bool {
    row.get(field).is_some_and(|value| id.matches(value))
}
