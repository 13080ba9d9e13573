//! # Sync State Management
//!
//! Outcome of a processing run, the events broadcast while it runs, and a
//! point-in-time snapshot of the sync engine for status displays.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::network_monitor::NetworkStatus;
use crate::client::offline::EntryId;
use crate::shared::record::Table;

/// Why a run did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoSession,
    AlreadyRunning,
    Offline,
}

/// Result of one processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The queue drained and every entry was accepted
    Synced { applied: usize },
    /// Entries remain queued, or some were dead-lettered
    Incomplete { remaining: usize },
    Skipped { reason: SkipReason },
}

impl SyncOutcome {
    /// Whether everything reached the remote service
    pub fn fully_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced { .. })
    }
}

/// Progress notifications for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// "Syncing data..."
    Started { pending: usize },
    /// "Sync complete"
    Completed { applied: usize },
    /// "Some items failed to sync"
    Incomplete { remaining: usize },
    DeadLettered {
        entry_id: EntryId,
        table: Table,
        reason: String,
    },
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Reconnected,
    SessionEstablished,
    Foreground,
    Manual,
}

/// Snapshot of the sync engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncState {
    pub is_syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_operations: usize,
    pub dead_letters: usize,
    pub network_status: NetworkStatus,
    pub last_error: Option<String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            is_syncing: false,
            last_sync: None,
            pending_operations: 0,
            dead_letters: 0,
            network_status: NetworkStatus::Offline,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_synced_is_fully_synced() {
        assert!(SyncOutcome::Synced { applied: 0 }.fully_synced());
        assert!(!SyncOutcome::Incomplete { remaining: 1 }.fully_synced());
        assert!(!SyncOutcome::Skipped {
            reason: SkipReason::NoSession
        }
        .fully_synced());
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let value = serde_json::to_value(SyncOutcome::Skipped {
            reason: SkipReason::AlreadyRunning,
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({"status": "skipped", "reason": "already_running"}));
    }
}
