//! Live progress display for check and apply runs
//!
//! The display follows a lane's `SyncSnapshot` watch channel. On a terminal it
//! drives an indicatif bar (unit counts, or bytes while an archive streams);
//! elsewhere it falls back to plain status lines on stderr.
//!
//! # Examples
//!
//! ```rust,no_run
//! use bpm_assets::cli::{ProgressConfig, ProgressDisplay};
//! # use bpm_assets::app::{Lane, Orchestrator};
//!
//! # async fn example(orchestrator: &Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
//! let mut display = ProgressDisplay::new(ProgressConfig::default());
//! display.start(orchestrator.subscribe(Lane::Update))?;
//!
//! let outcome = orchestrator.apply(Lane::Update).await?;
//! display.finish(&outcome).await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::{format_bytes, ApplyOutcome, SyncSnapshot, SyncStatus};
use crate::errors::{AppError, Result};

/// Configuration for progress display
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Enable visual progress bars
    pub enable_progress_bars: bool,
    /// Spinner tick interval
    pub update_interval: Duration,
    /// Suppress text-mode status lines
    pub quiet: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: true,
            update_interval: Duration::from_millis(100),
            quiet: false,
        }
    }
}

/// What the bar is currently counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarMode {
    Units,
    Bytes,
}

/// Progress display bound to one lane's snapshots
pub struct ProgressDisplay {
    config: ProgressConfig,
    bar: Option<ProgressBar>,
    update_task: Option<JoinHandle<()>>,
    is_terminal: bool,
}

impl ProgressDisplay {
    /// Create a new progress display with the given configuration
    pub fn new(config: ProgressConfig) -> Self {
        let is_terminal = atty::is(atty::Stream::Stderr);

        Self {
            config,
            bar: None,
            update_task: None,
            is_terminal,
        }
    }

    /// Whether indicatif bars are drawn
    pub fn uses_bars(&self) -> bool {
        self.config.enable_progress_bars && self.is_terminal
    }

    /// Start following the given snapshot channel
    pub fn start(&mut self, rx: watch::Receiver<SyncSnapshot>) -> Result<()> {
        if !self.uses_bars() {
            let quiet = self.config.quiet;
            self.update_task = Some(tokio::spawn(Self::follow_text(rx, quiet)));
            return Ok(());
        }

        let bar = ProgressBar::new(0);
        bar.set_style(unit_style()?);
        bar.enable_steady_tick(self.config.update_interval);

        let task_bar = bar.clone();
        self.update_task = Some(tokio::spawn(async move {
            if let Err(e) = Self::follow_bar(rx, task_bar).await {
                debug!("Progress bar stopped: {}", e);
            }
        }));
        self.bar = Some(bar);

        debug!("Progress display started");
        Ok(())
    }

    /// Stop following and print the run summary
    pub async fn finish(&mut self, outcome: &ApplyOutcome) {
        if let Some(task) = self.update_task.take() {
            task.abort();
            let _ = task.await;
        }

        if let Some(bar) = self.bar.take() {
            if outcome.is_success() {
                bar.finish_with_message(outcome.status.to_string());
            } else {
                bar.abandon_with_message(outcome.status.to_string());
            }
        }

        if !self.config.quiet {
            for line in summary_lines(outcome) {
                eprintln!("{}", line);
            }
        }
    }

    async fn follow_bar(
        mut rx: watch::Receiver<SyncSnapshot>,
        bar: ProgressBar,
    ) -> Result<()> {
        let mut mode = BarMode::Units;

        loop {
            let snapshot = rx.borrow_and_update().clone();

            let wanted = if snapshot.bytes.is_some() {
                BarMode::Bytes
            } else {
                BarMode::Units
            };
            if wanted != mode {
                bar.set_style(match wanted {
                    BarMode::Units => unit_style()?,
                    BarMode::Bytes => byte_style()?,
                });
                mode = wanted;
            }

            match snapshot.bytes {
                Some((written, expected)) => {
                    bar.set_length(expected.max(written));
                    bar.set_position(written);
                }
                None => {
                    bar.set_length(snapshot.total as u64);
                    bar.set_position(snapshot.completed as u64);
                }
            }
            bar.set_message(snapshot.status_text());

            if rx.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    async fn follow_text(mut rx: watch::Receiver<SyncSnapshot>, quiet: bool) {
        let mut last_status: Option<SyncStatus> = None;
        let mut last_completed = 0usize;

        loop {
            let snapshot = rx.borrow_and_update().clone();

            if let Some(line) = text_update(&snapshot, last_status, last_completed) {
                if !quiet {
                    eprintln!("{}", line);
                }
            }
            last_status = Some(snapshot.status);
            last_completed = snapshot.completed;

            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Drop for ProgressDisplay {
    fn drop(&mut self) {
        if let Some(task) = self.update_task.take() {
            task.abort();
        }
    }
}

fn unit_style() -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map_err(|e| AppError::generic(format!("Progress bar template error: {}", e)))?
        .progress_chars("##-"))
}

fn byte_style() -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {bytes_per_sec}",
        )
        .map_err(|e| AppError::generic(format!("Progress bar template error: {}", e)))?
        .progress_chars("##-"))
}

/// Line to print in text mode, if the snapshot warrants one.
///
/// Status changes always print; while applying, one line per completed unit.
fn text_update(
    snapshot: &SyncSnapshot,
    last_status: Option<SyncStatus>,
    last_completed: usize,
) -> Option<String> {
    if last_status != Some(snapshot.status) {
        return Some(snapshot.status_text());
    }

    if snapshot.status == SyncStatus::Applying && snapshot.completed != last_completed {
        return Some(snapshot.status_text());
    }

    None
}

/// Human-readable summary of a finished run
pub fn summary_lines(outcome: &ApplyOutcome) -> Vec<String> {
    let stats = &outcome.stats;
    let mut lines = vec![
        format!("{} lane: {}", outcome.lane, outcome.status),
        format!("   Steps: {}/{} completed", stats.completed, stats.total),
        format!(
            "   Placed: {}, archives: {}, deleted: {}",
            stats.placed, stats.archives, stats.deleted
        ),
        format!("   Downloaded: {}", format_bytes(stats.bytes)),
        format!("   Duration: {:.1}s", stats.duration.as_secs_f64()),
    ];

    if stats.failed > 0 || stats.skipped > 0 {
        lines.push(format!(
            "   Failed: {}, skipped: {}",
            stats.failed, stats.skipped
        ));
        for failure in &stats.failures {
            lines.push(format!("     {}: {}", failure.unit, failure.reason));
        }
    }

    if outcome.cancelled {
        lines.push("   Run was cancelled".to_string());
    }

    if let Some(catalog) = &outcome.catalog {
        lines.push(format!(
            "   Catalog: {} songs, {} jackets, {} courses",
            catalog.songs, catalog.jackets, catalog.courses
        ));
        if !catalog.unreadable.is_empty() {
            lines.push(format!(
                "   Unreadable records: {}",
                catalog.unreadable.join(", ")
            ));
        }
    }

    lines
}
