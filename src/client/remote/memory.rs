//! # In-Memory Remote
//!
//! A complete in-process [`RemoteService`]: tables live in memory, rows get
//! numeric server ids and a `created_at` stamp, and collections come back in
//! their default order. Every call is logged, the whole remote can be taken
//! "offline", and failure rules can reject specific calls.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use zenith::client::remote::{InMemoryRemote, RemoteCall, RemoteError};
//! use zenith::shared::record::Table;
//!
//! # async fn example() {
//! let remote = InMemoryRemote::new();
//! remote
//!     .fail_when(|call| match call {
//!         RemoteCall::Create { table: Table::Habits, .. } => Some(RemoteError::from_status(409, "duplicate")),
//!         _ => None,
//!     })
//!     .await;
//! # }
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{RemoteError, RemoteService};
use crate::shared::record::{Record, RecordId, Table, DEFAULT_MATCH_FIELD};

/// One call received by the remote
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Create {
        table: Table,
        record: Record,
    },
    Update {
        table: Table,
        match_field: String,
        match_value: RecordId,
        patch: Record,
    },
    Delete {
        table: Table,
        match_field: String,
        match_value: RecordId,
    },
    FetchAll {
        table: Table,
    },
}

impl RemoteCall {
    pub fn table(&self) -> Table {
        match self {
            RemoteCall::Create { table, .. }
            | RemoteCall::Update { table, .. }
            | RemoteCall::Delete { table, .. }
            | RemoteCall::FetchAll { table } => *table,
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, RemoteCall::FetchAll { .. })
    }
}

type FailureRule = Box<dyn Fn(&RemoteCall) -> Option<RemoteError> + Send + Sync>;

#[derive(Default)]
struct Inner {
    tables: HashMap<Table, Vec<Record>>,
    calls: Vec<RemoteCall>,
    rules: Vec<FailureRule>,
}

/// In-process remote service
pub struct InMemoryRemote {
    inner: Mutex<Inner>,
    next_id: AtomicI64,
    offline: AtomicBool,
}

impl std::fmt::Debug for InMemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRemote")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("offline", &self.offline.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicI64::new(1),
            offline: AtomicBool::new(false),
        }
    }

    /// Store rows exactly as given
    pub async fn seed(&self, table: Table, rows: Vec<Record>) {
        let mut inner = self.inner.lock().await;
        inner.tables.entry(table).or_default().extend(rows);
    }

    /// Current rows of a table, in storage order
    pub async fn rows(&self, table: Table) -> Vec<Record> {
        let inner = self.inner.lock().await;
        inner.tables.get(&table).cloned().unwrap_or_default()
    }

    /// Every call received so far
    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn mutation_count(&self) -> usize {
        self.inner.lock().await.calls.iter().filter(|call| call.is_mutation()).count()
    }

    /// Fail every call with a network error while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject calls for which `rule` returns an error
    pub async fn fail_when<F>(&self, rule: F)
    where
        F: Fn(&RemoteCall) -> Option<RemoteError> + Send + Sync + 'static,
    {
        self.inner.lock().await.rules.push(Box::new(rule));
    }

    pub async fn clear_failures(&self) {
        self.inner.lock().await.rules.clear();
    }

    /// Log the call and decide whether it fails
    fn admit(&self, inner: &mut Inner, call: RemoteCall) -> Result<(), RemoteError> {
        let verdict = if self.offline.load(Ordering::SeqCst) {
            Some(RemoteError::Network("remote unreachable".to_string()))
        } else {
            inner.rules.iter().find_map(|rule| rule(&call))
        };
        inner.calls.push(call);
        match verdict {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteService for InMemoryRemote {
    async fn create(&self, table: Table, record: &Record) -> Result<Record, RemoteError> {
        let mut inner = self.inner.lock().await;
        self.admit(
            &mut inner,
            RemoteCall::Create {
                table,
                record: record.clone(),
            },
        )?;

        let mut row = record.clone();
        if !row.contains_key(DEFAULT_MATCH_FIELD) {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            row.insert(DEFAULT_MATCH_FIELD.to_string(), Value::from(id));
        }
        row.entry("created_at".to_string())
            .or_insert_with(|| Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)));
        inner.tables.entry(table).or_default().push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        match_field: &str,
        match_value: &RecordId,
        patch: &Record,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().await;
        self.admit(
            &mut inner,
            RemoteCall::Update {
                table,
                match_field: match_field.to_string(),
                match_value: match_value.clone(),
                patch: patch.clone(),
            },
        )?;

        if let Some(rows) = inner.tables.get_mut(&table) {
            for row in rows
                .iter_mut()
                .filter(|row| row.get(match_field).is_some_and(|v| match_value.matches(v)))
            {
                for (key, value) in patch {
                    row.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, table: Table, match_field: &str, match_value: &RecordId) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().await;
        self.admit(
            &mut inner,
            RemoteCall::Delete {
                table,
                match_field: match_field.to_string(),
                match_value: match_value.clone(),
            },
        )?;

        if let Some(rows) = inner.tables.get_mut(&table) {
            rows.retain(|row| !row.get(match_field).is_some_and(|v| match_value.matches(v)));
        }
        Ok(())
    }

    async fn fetch_all(&self, table: Table) -> Result<Vec<Record>, RemoteError> {
        let mut inner = self.inner.lock().await;
        self.admit(&mut inner, RemoteCall::FetchAll { table })?;

        let mut rows = inner.tables.get(&table).cloned().unwrap_or_default();
        if let Some(order) = table.default_order() {
            rows.sort_by(|a, b| {
                let ordering = compare_field(a, b, order.field);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        Ok(rows)
    }
}

fn compare_field(a: &Record, b: &Record, field: &str) -> CmpOrdering {
    match (a.get(field), b.get(field)) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(_), None) => CmpOrdering::Greater,
        (None, Some(_)) => CmpOrdering::Less,
        _ => CmpOrdering::Equal,
    }
}
