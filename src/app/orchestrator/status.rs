//! Per-lane sync status and its publication
//!
//! Each lane owns one `watch` channel. Only the orchestrator holds the
//! [`StatusBoard`] and therefore the senders; UI consumers subscribe and read.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::app::store::format_bytes;

/// Independent status track of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// Existence-only check for new content
    Update,
    /// Hash-verified integrity check and repair
    Fix,
}

impl Lane {
    /// Whether the diff hashes local files
    pub fn checks_hashes(&self) -> bool {
        matches!(self, Lane::Fix)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Update => f.write_str("update"),
            Lane::Fix => f.write_str("fix"),
        }
    }
}

/// Sync state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Checking,
    NoUpdate,
    Available,
    Applying,
    Success,
    Failed,
}

impl SyncStatus {
    /// States from which a check may start
    pub fn can_check(&self) -> bool {
        !matches!(self, SyncStatus::Checking | SyncStatus::Applying)
    }

    pub fn can_apply(&self) -> bool {
        matches!(self, SyncStatus::Available)
    }

    /// Terminal states that `acknowledge` returns to idle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::NoUpdate | SyncStatus::Success | SyncStatus::Failed
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, SyncStatus::Checking | SyncStatus::Applying)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Checking => "checking",
            SyncStatus::NoUpdate => "no-update",
            SyncStatus::Available => "available",
            SyncStatus::Applying => "applying",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Published view of one lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub lane: Lane,
    pub status: SyncStatus,
    /// Units finished (successfully or not) in the current apply
    pub completed: usize,
    /// Units planned for the current apply
    pub total: usize,
    /// Archive bytes written and expected, while an archive is transferring
    pub bytes: Option<(u64, u64)>,
    /// Units that failed in the current apply
    pub failures: usize,
    /// Last error or notable event
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncSnapshot {
    pub fn new(lane: Lane) -> Self {
        Self {
            lane,
            status: SyncStatus::Idle,
            completed: 0,
            total: 0,
            bytes: None,
            failures: 0,
            message: None,
            updated_at: Utc::now(),
        }
    }

    /// User-facing label for the lane's current state
    pub fn status_text(&self) -> String {
        match (self.lane, self.status) {
            (Lane::Update, SyncStatus::Idle) => "Check for update.".to_string(),
            (Lane::Update, SyncStatus::Checking) => "Checking for update...".to_string(),
            (Lane::Update, SyncStatus::NoUpdate) => "No update available. Check again?".to_string(),
            (Lane::Update, SyncStatus::Available) => "Update available".to_string(),
            (Lane::Update, SyncStatus::Applying) => format!("Updating... {}", self.progress_text()),
            (Lane::Update, SyncStatus::Success) => "Update finished. Check again?".to_string(),
            (Lane::Update, SyncStatus::Failed) => "Update failed. Restart?".to_string(),
            (Lane::Fix, SyncStatus::Idle) => "Check files.".to_string(),
            (Lane::Fix, SyncStatus::Checking) => "Checking files...".to_string(),
            (Lane::Fix, SyncStatus::NoUpdate) => "All files intact. Check again?".to_string(),
            (Lane::Fix, SyncStatus::Available) => "Repair available".to_string(),
            (Lane::Fix, SyncStatus::Applying) => format!("Repairing... {}", self.progress_text()),
            (Lane::Fix, SyncStatus::Success) => "Repair finished. Check again?".to_string(),
            (Lane::Fix, SyncStatus::Failed) => "Repair failed. Restart?".to_string(),
        }
    }

    fn progress_text(&self) -> String {
        match self.bytes {
            Some((written, expected)) => {
                format!("{}/{}", format_bytes(written), format_bytes(expected))
            }
            None => format!("{}/{}", self.completed, self.total),
        }
    }
}

/// Owner of both lanes' status channels
#[derive(Debug)]
pub struct StatusBoard {
    update: watch::Sender<SyncSnapshot>,
    fix: watch::Sender<SyncSnapshot>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (update, _) = watch::channel(SyncSnapshot::new(Lane::Update));
        let (fix, _) = watch::channel(SyncSnapshot::new(Lane::Fix));
        Self { update, fix }
    }

    fn sender(&self, lane: Lane) -> &watch::Sender<SyncSnapshot> {
        match lane {
            Lane::Update => &self.update,
            Lane::Fix => &self.fix,
        }
    }

    pub fn subscribe(&self, lane: Lane) -> watch::Receiver<SyncSnapshot> {
        self.sender(lane).subscribe()
    }

    pub fn snapshot(&self, lane: Lane) -> SyncSnapshot {
        self.sender(lane).borrow().clone()
    }

    pub fn status(&self, lane: Lane) -> SyncStatus {
        self.sender(lane).borrow().status
    }

    /// Apply a change to a lane's snapshot and notify subscribers
    pub(crate) fn update(&self, lane: Lane, change: impl FnOnce(&mut SyncSnapshot)) {
        self.sender(lane).send_modify(|snapshot| {
            change(snapshot);
            snapshot.updated_at = Utc::now();
        });
    }

    /// Move a lane to a new state, resetting progress when entering a new phase
    pub(crate) fn transition(&self, lane: Lane, status: SyncStatus, message: Option<String>) {
        self.update(lane, |snapshot| {
            if matches!(status, SyncStatus::Checking | SyncStatus::Idle) {
                snapshot.completed = 0;
                snapshot.total = 0;
                snapshot.failures = 0;
            }
            snapshot.bytes = None;
            snapshot.status = status;
            snapshot.message = message;
        });
    }
}
