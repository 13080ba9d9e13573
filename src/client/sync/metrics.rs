//! # Sync Metrics
//!
//! Counters for processing runs, kept in memory for status displays.

use std::time::Duration;

use serde::Serialize;

use super::sync_state::SyncOutcome;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncMetrics {
    pub total_runs: u64,
    pub fully_synced_runs: u64,
    pub incomplete_runs: u64,
    pub entries_applied: u64,
    pub rotations: u64,
    pub dead_lettered: u64,
    pub last_run_duration: Option<Duration>,
    pub average_run_duration: Duration,
}

/// Per-run counts reported by the processor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub applied: usize,
    pub rotations: usize,
    pub dead_lettered: usize,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a run that reached the remote service
    pub fn record_run(&mut self, outcome: &SyncOutcome, stats: RunStats, duration: Duration) {
        match outcome {
            SyncOutcome::Synced { .. } => self.fully_synced_runs += 1,
            SyncOutcome::Incomplete { .. } => self.incomplete_runs += 1,
            SyncOutcome::Skipped { .. } => return,
        }
        self.total_runs += 1;
        self.entries_applied += stats.applied as u64;
        self.rotations += stats.rotations as u64;
        self.dead_lettered += stats.dead_lettered as u64;

        // Rolling average over recorded runs
        let total = self.average_run_duration * (self.total_runs - 1) as u32 + duration;
        self.average_run_duration = total / self.total_runs as u32;
        self.last_run_duration = Some(duration);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.fully_synced_runs as f64 / self.total_runs as f64
        }
    }
}
