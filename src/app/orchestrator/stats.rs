//! Apply statistics and run outcomes

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::catalog::CatalogSummary;

use super::status::{Lane, SyncStatus};

/// A unit that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    /// Unit description (`songs/aaa`, `jackets archive`)
    pub unit: String,
    pub reason: String,
}

/// Counters of one apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyStats {
    /// Units planned
    pub total: usize,
    /// Units finished, successfully or not
    pub completed: usize,
    /// Units that failed
    pub failed: usize,
    /// Units never attempted because their category was aborted
    pub skipped: usize,
    /// Items moved into place
    pub placed: usize,
    /// Obsolete items deleted
    pub deleted: usize,
    /// Archives unpacked
    pub archives: usize,
    /// Bytes fetched
    pub bytes: u64,
    pub failures: Vec<UnitFailure>,
    pub started: DateTime<Utc>,
    pub duration: Duration,
}

impl ApplyStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            skipped: 0,
            placed: 0,
            deleted: 0,
            archives: 0,
            bytes: 0,
            failures: Vec::new(),
            started: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    pub fn record_placed(&mut self, bytes: u64) {
        self.completed += 1;
        self.placed += 1;
        self.bytes += bytes;
    }

    pub fn record_archive(&mut self, bytes: u64) {
        self.completed += 1;
        self.archives += 1;
        self.bytes += bytes;
    }

    pub fn record_deleted(&mut self) {
        self.completed += 1;
        self.deleted += 1;
    }

    pub fn record_failure(&mut self, unit: impl Into<String>, reason: impl Into<String>) {
        self.completed += 1;
        self.failed += 1;
        self.failures.push(UnitFailure {
            unit: unit.into(),
            reason: reason.into(),
        });
    }

    pub fn record_skipped(&mut self, count: usize) {
        self.completed += count;
        self.skipped += count;
    }

    /// Whether every planned unit succeeded
    pub fn is_successful(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Calculate completion percentage
    pub fn completion_percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total as f64) * 100.0
    }

    /// Update duration from start time
    pub fn update_duration(&mut self) {
        self.duration = Utc::now()
            .signed_duration_since(self.started)
            .to_std()
            .unwrap_or(Duration::ZERO);
    }
}

/// Final result of an apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub lane: Lane,
    /// Terminal status the lane ended in
    pub status: SyncStatus,
    pub stats: ApplyStats,
    /// Catalog summary, when the reload succeeded
    pub catalog: Option<CatalogSummary>,
    /// The run was cut short by cancellation
    pub cancelled: bool,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}
