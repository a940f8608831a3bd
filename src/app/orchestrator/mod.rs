//! Sync orchestration
//!
//! The orchestrator drives the check/apply state machine for two independent
//! lanes (update and fix), owns the published status of both, and is the only
//! component that mutates the content store during a run.
//!
//! ```text
//! idle -> checking -> {no-update | available} -> applying -> {success | failed} -> idle
//! ```
//!
//! # Architecture
//!
//! - [`config`] - Concurrency, strategy and failure policy
//! - [`plan`] - Plans produced by a check
//! - [`status`] - Per-lane status and its `watch` publication
//! - [`stats`] - Apply counters and outcomes
//! - [`signals`] - Ctrl-C handling
//!
//! # Examples
//!
//! ```rust,no_run
//! use bpm_assets::app::{
//!     connect_remote, ClientConfig, ContentStore, Lane, Orchestrator, StoreCatalog, StoreConfig,
//!     SyncConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(ContentStore::new(StoreConfig::default()).await?);
//! let remote = connect_remote(&ClientConfig::default())?;
//! let orchestrator = Orchestrator::new(SyncConfig::default(), store, remote)
//!     .with_catalog(Arc::new(StoreCatalog::new()));
//!
//! let plan = orchestrator.check(Lane::Update).await?;
//! if plan.has_changes() {
//!     let outcome = orchestrator.apply(Lane::Update).await?;
//!     println!("{} items placed", outcome.stats.placed);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod plan;
pub mod signals;
pub mod stats;
pub mod status;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::catalog::{CatalogReloader, CatalogSummary};
use crate::app::client::{RemoteStore, TransferProgress};
use crate::app::diff::{compute_diff, course_list_changed, ArchiveRefresh, CategoryPlan};
use crate::app::fetch::{FetchExecutor, FetchUnit, Fetched};
use crate::app::manifest::ManifestFetcher;
use crate::app::models::Category;
use crate::app::store::{ContentStore, Settings};
use crate::errors::{DownloadResult, SyncError, SyncResult};

pub use config::SyncConfig;
pub use plan::{SyncPlan, TransferStrategy};
pub use signals::SignalHandler;
pub use stats::{ApplyOutcome, ApplyStats, UnitFailure};
pub use status::{Lane, StatusBoard, SyncSnapshot, SyncStatus};

type RunSlot = StdMutex<Option<CancellationToken>>;

fn lock_run(slot: &RunSlot) -> MutexGuard<'_, Option<CancellationToken>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive claim on the orchestrator for one check or apply
///
/// Dropping the guard ends the run. A lane still `checking` or `applying` at
/// that point belongs to a future that was dropped before finishing; it is
/// moved to `failed` so a new check can start.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    board: &'a StatusBoard,
    current_run: &'a RunSlot,
    lane: Lane,
}

impl<'a> RunGuard<'a> {
    fn acquire(orchestrator: &'a Orchestrator, lane: Lane) -> SyncResult<Self> {
        orchestrator
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::RunInProgress)?;
        Ok(Self {
            running: &orchestrator.running,
            board: &orchestrator.board,
            current_run: &orchestrator.current_run,
            lane,
        })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = lock_run(self.current_run).take() {
            token.cancel();
        }
        let status = self.board.status(self.lane);
        if status.is_busy() {
            warn!("{} lane abandoned while {}", self.lane, status);
            self.board.transition(
                self.lane,
                SyncStatus::Failed,
                Some(SyncError::Cancelled.to_string()),
            );
        }
        self.running.store(false, Ordering::Release);
    }
}

/// Check/apply state machine over the content store
#[derive(Debug)]
pub struct Orchestrator {
    config: SyncConfig,
    store: Arc<ContentStore>,
    remote: Arc<dyn RemoteStore>,
    fetcher: ManifestFetcher,
    executor: FetchExecutor,
    catalog: Option<Arc<dyn CatalogReloader>>,
    board: StatusBoard,
    plans: Mutex<HashMap<Lane, SyncPlan>>,
    running: AtomicBool,
    shutdown: CancellationToken,
    current_run: RunSlot,
}

impl Orchestrator {
    pub fn new(config: SyncConfig, store: Arc<ContentStore>, remote: Arc<dyn RemoteStore>) -> Self {
        let executor = FetchExecutor::new(remote.clone(), store.clone())
            .with_retry_policy(config.retry)
            .with_verify_downloads(config.verify_downloads);

        Self {
            fetcher: ManifestFetcher::new(remote.clone()),
            executor,
            config,
            store,
            remote,
            catalog: None,
            board: StatusBoard::new(),
            plans: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            current_run: StdMutex::new(None),
        }
    }

    /// Link the collaborator reloaded after a successful apply
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogReloader>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn subscribe(&self, lane: Lane) -> watch::Receiver<SyncSnapshot> {
        self.board.subscribe(lane)
    }

    pub fn snapshot(&self, lane: Lane) -> SyncSnapshot {
        self.board.snapshot(lane)
    }

    /// Plan waiting for `apply` on a lane
    pub async fn pending_plan(&self, lane: Lane) -> Option<SyncPlan> {
        self.plans.lock().await.get(&lane).cloned()
    }

    /// Token cancelling the current run and every later one
    ///
    /// Intended for process shutdown (see [`SignalHandler`]).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel the run in progress, if any
    pub async fn cancel(&self) {
        if let Some(token) = lock_run(&self.current_run).as_ref() {
            info!("Cancelling sync run");
            token.cancel();
        }
    }

    /// Whether an update check is suggested by the configured interval
    pub async fn update_due(&self) -> SyncResult<bool> {
        let settings = self.store.load_settings().await?;
        Ok(settings.update_due(Utc::now(), self.config.update_interval))
    }

    /// Return a terminal lane state to idle
    pub fn acknowledge(&self, lane: Lane) -> SyncResult<()> {
        let status = self.board.status(lane);
        if !status.is_terminal() {
            return Err(invalid_transition(lane, status, "acknowledge"));
        }
        self.board.transition(lane, SyncStatus::Idle, None);
        Ok(())
    }

    fn begin_run(&self) -> CancellationToken {
        let token = self.shutdown.child_token();
        *lock_run(&self.current_run) = Some(token.clone());
        token
    }

    fn end_run(&self) {
        *lock_run(&self.current_run) = None;
    }

    fn validate(&self) -> SyncResult<()> {
        self.config
            .validate()
            .map_err(|reason| SyncError::InvalidConfig { reason })
    }

    /// Compare remote and local state and publish whether work is available
    ///
    /// # Errors
    ///
    /// Manifest, transport and store failures move the lane to `failed` and
    /// are returned; a concurrent run gives [`SyncError::RunInProgress`].
    pub async fn check(&self, lane: Lane) -> SyncResult<SyncPlan> {
        self.validate()?;
        let _guard = RunGuard::acquire(self, lane)?;

        let status = self.board.status(lane);
        if !status.can_check() {
            return Err(invalid_transition(lane, status, "check"));
        }

        info!(
            "Checking {} lane ({} strategy)",
            lane, self.config.strategy
        );
        self.plans.lock().await.remove(&lane);
        self.board.transition(lane, SyncStatus::Checking, None);

        let token = self.begin_run();
        let result = tokio::select! {
            _ = token.cancelled() => Err(SyncError::Cancelled),
            result = self.build_plan(lane) => result,
        };
        self.end_run();

        match result {
            Ok(plan) => {
                let summary = plan.summary();
                if plan.has_changes() {
                    info!("{} lane: changes available ({})", lane, summary);
                    self.plans.lock().await.insert(lane, plan.clone());
                    self.board
                        .transition(lane, SyncStatus::Available, Some(summary));
                } else {
                    info!("{} lane: no update", lane);
                    self.board.transition(lane, SyncStatus::NoUpdate, None);
                }
                Ok(plan)
            }
            Err(e) => {
                error!("{} lane check failed: {}", lane, e);
                self.board
                    .transition(lane, SyncStatus::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn build_plan(&self, lane: Lane) -> SyncResult<SyncPlan> {
        let strategy = self.config.strategy;
        let mut plan = SyncPlan::new(lane, strategy);

        if strategy == TransferStrategy::Archive && lane == Lane::Update {
            let settings = self.store.load_settings().await?;
            for category in Category::ENUMERABLE {
                plan.categories
                    .push(self.archive_etag_plan(category, &settings).await?);
            }
            let course_hash = self.fetcher.fetch_course_hash().await?;
            plan.course_list_changed = course_list_changed(&course_hash, self.store.as_ref()).await;
            plan.course_hash = Some(course_hash);
            return Ok(plan);
        }

        let snapshot = self.fetcher.fetch_snapshot().await?;
        for category in Category::ENUMERABLE {
            let Some(manifest) = snapshot.manifest(category) else {
                continue;
            };
            let mut category_plan =
                compute_diff(manifest, self.store.as_ref(), lane.checks_hashes()).await?;
            if strategy == TransferStrategy::Archive && category_plan.has_changes() {
                category_plan.archive = Some(ArchiveRefresh { remote_etag: None });
            }
            plan.categories.push(category_plan);
        }
        plan.course_list_changed =
            course_list_changed(&snapshot.course_hash, self.store.as_ref()).await;
        plan.course_hash = Some(snapshot.course_hash);
        Ok(plan)
    }

    /// Compare a category archive's entity tag with the recorded one
    async fn archive_etag_plan(
        &self,
        category: Category,
        settings: &Settings,
    ) -> SyncResult<CategoryPlan> {
        let mut plan = CategoryPlan::empty(category);
        let Some(archive) = category.archive_name() else {
            return Ok(plan);
        };

        let meta = self.remote.head(archive).await?;
        let recorded = settings.etag(category);
        debug!(
            "{} etag: remote {:?}, recorded {:?}",
            archive, meta.etag, recorded
        );
        let changed = match (&meta.etag, recorded) {
            (Some(remote), Some(local)) => remote != local,
            _ => true,
        };
        if changed {
            plan.archive = Some(ArchiveRefresh {
                remote_etag: meta.etag,
            });
        }
        Ok(plan)
    }

    /// Execute the plan of the last check on a lane
    ///
    /// Item failures do not stop the run; the lane ends in `failed` when any
    /// unit failed. The returned outcome carries the counters either way.
    pub async fn apply(&self, lane: Lane) -> SyncResult<ApplyOutcome> {
        self.validate()?;
        let _guard = RunGuard::acquire(self, lane)?;

        let status = self.board.status(lane);
        if !status.can_apply() {
            return Err(invalid_transition(lane, status, "apply"));
        }
        let catalog = self.linked_catalog()?;
        let plan = self
            .plans
            .lock()
            .await
            .remove(&lane)
            .ok_or_else(|| SyncError::NoPendingPlan {
                lane: lane.to_string(),
            })?;

        Ok(self.run_apply(plan, catalog).await)
    }

    /// Refresh every archive and the course list regardless of entity tags
    ///
    /// Runs on the update lane.
    pub async fn force_sync(&self) -> SyncResult<ApplyOutcome> {
        self.validate()?;
        let lane = Lane::Update;
        let _guard = RunGuard::acquire(self, lane)?;

        let status = self.board.status(lane);
        if !status.can_check() {
            return Err(invalid_transition(lane, status, "force-sync"));
        }
        let catalog = self.linked_catalog()?;

        info!("Forcing full sync");
        self.plans.lock().await.remove(&lane);
        self.board.transition(lane, SyncStatus::Checking, None);

        let course_hash = match self.fetcher.fetch_course_hash().await {
            Ok(hash) => hash,
            Err(e) => {
                error!("Force sync failed: {}", e);
                self.board
                    .transition(lane, SyncStatus::Failed, Some(e.to_string()));
                return Err(e.into());
            }
        };

        let mut plan = SyncPlan::new(lane, TransferStrategy::Archive);
        for category in Category::ENUMERABLE {
            let mut category_plan = CategoryPlan::empty(category);
            category_plan.archive = Some(ArchiveRefresh { remote_etag: None });
            plan.categories.push(category_plan);
        }
        plan.course_list_changed = true;
        plan.course_hash = Some(course_hash);
        self.board
            .transition(lane, SyncStatus::Available, Some(plan.summary()));

        Ok(self.run_apply(plan, catalog).await)
    }

    fn linked_catalog(&self) -> SyncResult<Arc<dyn CatalogReloader>> {
        self.catalog.clone().ok_or_else(|| {
            error!("No catalog reloader linked; refusing to apply");
            SyncError::CollaboratorMissing {
                what: "catalog reloader".to_string(),
            }
        })
    }

    async fn run_apply(&self, plan: SyncPlan, catalog: Arc<dyn CatalogReloader>) -> ApplyOutcome {
        let lane = plan.lane;
        let token = self.begin_run();
        let mut stats = ApplyStats::new(plan.total_units());

        info!(
            "Applying {} lane: {} units ({})",
            lane,
            stats.total,
            plan.summary()
        );
        self.board.update(lane, |snapshot| {
            snapshot.status = SyncStatus::Applying;
            snapshot.completed = 0;
            snapshot.total = stats.total;
            snapshot.failures = 0;
            snapshot.bytes = None;
            snapshot.message = None;
        });

        let mut settings = match self.store.load_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Starting from default settings: {}", e);
                Settings::default()
            }
        };

        let mut cancelled = false;
        for category_plan in &plan.categories {
            if let Err(SyncError::Cancelled) = self
                .apply_category(lane, category_plan, &mut stats, &mut settings, &token)
                .await
            {
                cancelled = true;
                break;
            }
        }

        if !cancelled {
            if let Some(unit) = plan.course_unit() {
                if let Err(SyncError::Cancelled) =
                    self.apply_course_list(lane, unit, &mut stats, &token).await
                {
                    cancelled = true;
                }
            }
        }

        self.end_run();
        stats.update_duration();

        if stats.is_successful() && !cancelled {
            settings.last_update = Some(Utc::now());
        }
        if let Err(e) = self.store.save_settings(&settings).await {
            error!("Failed to save settings: {}", e);
            stats.record_failure("settings", e.to_string());
        }
        if let Err(e) = self.store.clear_staging().await {
            warn!("Failed to clear staging area: {}", e);
        }

        let success = stats.is_successful() && !cancelled;
        let catalog_summary = if success {
            self.reload_catalog(catalog.as_ref()).await
        } else {
            None
        };

        let (status, message) = if success {
            (SyncStatus::Success, None)
        } else if cancelled {
            (SyncStatus::Failed, Some(SyncError::Cancelled.to_string()))
        } else {
            let failed = stats.failed + stats.skipped;
            (
                SyncStatus::Failed,
                Some(
                    SyncError::ItemsFailed {
                        failed,
                        total: stats.total,
                    }
                    .to_string(),
                ),
            )
        };

        info!(
            "{} lane apply finished as {} in {:?}: {} placed, {} deleted, {} archives, {} failed, {} skipped",
            lane,
            status,
            stats.duration,
            stats.placed,
            stats.deleted,
            stats.archives,
            stats.failed,
            stats.skipped
        );
        self.board.update(lane, |snapshot| {
            snapshot.status = status;
            snapshot.completed = stats.completed;
            snapshot.failures = stats.failed + stats.skipped;
            snapshot.bytes = None;
            snapshot.message = message;
        });

        ApplyOutcome {
            lane,
            status,
            stats,
            catalog: catalog_summary,
            cancelled,
        }
    }

    async fn reload_catalog(&self, catalog: &dyn CatalogReloader) -> Option<CatalogSummary> {
        match catalog.reload(&self.store).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!("Catalog reload failed: {}", e);
                None
            }
        }
    }

    fn publish_progress(&self, lane: Lane, stats: &ApplyStats) {
        self.board.update(lane, |snapshot| {
            snapshot.completed = stats.completed;
            snapshot.failures = stats.failed + stats.skipped;
            snapshot.bytes = None;
        });
    }

    async fn apply_category(
        &self,
        lane: Lane,
        plan: &CategoryPlan,
        stats: &mut ApplyStats,
        settings: &mut Settings,
        token: &CancellationToken,
    ) -> SyncResult<()> {
        if !plan.has_changes() {
            return Ok(());
        }
        if let Some(refresh) = &plan.archive {
            return self
                .apply_archive(lane, plan.category, refresh, stats, settings, token)
                .await;
        }

        self.apply_items(lane, plan, stats, token).await?;
        self.delete_obsolete(lane, plan, stats, token).await
    }

    async fn apply_items(
        &self,
        lane: Lane,
        plan: &CategoryPlan,
        stats: &mut ApplyStats,
        token: &CancellationToken,
    ) -> SyncResult<()> {
        let units = SyncPlan::units_for(plan);
        let unit_count = units.len();
        let executor = &self.executor;
        let mut results = stream::iter(units)
            .map(move |unit| async move {
                let result = executor.fetch(&unit).await;
                (unit, result)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut processed = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(SyncError::Cancelled),
                next = results.next() => next,
            };
            let Some((unit, result)) = next else {
                break;
            };
            processed += 1;

            match result {
                Ok(fetched) => self.place(&unit, &fetched, stats).await,
                Err(e) if e.is_client_error() && self.config.abort_category_on_client_error => {
                    error!(
                        "{} refused by origin, aborting {}: {}",
                        unit, plan.category, e
                    );
                    stats.record_failure(unit.to_string(), e.to_string());
                    let remaining = unit_count - processed;
                    if remaining > 0 {
                        warn!("Skipping {} remaining {} units", remaining, plan.category);
                        stats.record_skipped(remaining);
                    }
                    self.publish_progress(lane, stats);
                    break;
                }
                Err(e) => {
                    warn!("Failed to fetch {}: {}", unit, e);
                    stats.record_failure(unit.to_string(), e.to_string());
                }
            }
            self.publish_progress(lane, stats);
        }
        Ok(())
    }

    async fn place(&self, unit: &FetchUnit, fetched: &Fetched, stats: &mut ApplyStats) {
        let FetchUnit::Item(item) = unit else {
            return;
        };
        match self.store.place(fetched.staged(), item).await {
            Ok(()) => stats.record_placed(fetched.bytes()),
            Err(e) => {
                error!("Failed to place {}: {}", item, e);
                stats.record_failure(unit.to_string(), e.to_string());
            }
        }
    }

    async fn delete_obsolete(
        &self,
        lane: Lane,
        plan: &CategoryPlan,
        stats: &mut ApplyStats,
        token: &CancellationToken,
    ) -> SyncResult<()> {
        for name in &plan.obsolete {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self.store.delete_item(plan.category, name).await {
                Ok(()) => {
                    debug!("Deleted obsolete {}/{}", plan.category, name);
                    stats.record_deleted();
                }
                Err(e) => {
                    warn!("Failed to delete {}/{}: {}", plan.category, name, e);
                    stats.record_failure(format!("{}/{}", plan.category, name), e.to_string());
                }
            }
            self.publish_progress(lane, stats);
        }
        Ok(())
    }

    /// Fetch an archive while publishing its byte progress
    async fn fetch_tracked(
        &self,
        lane: Lane,
        unit: &FetchUnit,
        token: &CancellationToken,
    ) -> SyncResult<DownloadResult<Fetched>> {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<TransferProgress>();
        let fetch = self.executor.fetch_with_progress(unit, Some(&progress_tx));
        tokio::pin!(fetch);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(SyncError::Cancelled),
                Some(progress) = progress_rx.recv() => {
                    self.board.update(lane, |snapshot| {
                        snapshot.bytes = Some((
                            progress.written,
                            progress.expected.unwrap_or(progress.written),
                        ));
                    });
                }
                result = &mut fetch => return Ok(result),
            }
        }
    }

    async fn apply_archive(
        &self,
        lane: Lane,
        category: Category,
        refresh: &ArchiveRefresh,
        stats: &mut ApplyStats,
        settings: &mut Settings,
        token: &CancellationToken,
    ) -> SyncResult<()> {
        let unit = FetchUnit::Archive(category);
        let fetched = match self.fetch_tracked(lane, &unit, token).await? {
            Ok(fetched) => fetched,
            Err(e) => {
                error!("Failed to fetch {}: {}", unit, e);
                stats.record_failure(unit.to_string(), e.to_string());
                self.publish_progress(lane, stats);
                return Ok(());
            }
        };

        let Fetched::Archive {
            staged, etag, bytes, ..
        } = fetched
        else {
            return Ok(());
        };

        match self.store.replace_from_archive(category, &staged).await {
            Ok(entries) => {
                info!("{} replaced from archive ({} entries)", category, entries);
                stats.record_archive(bytes);
                let etag = etag.or_else(|| refresh.remote_etag.clone());
                if etag.is_none() {
                    warn!(
                        "{} was served without an entity tag; the next update check will fetch it again",
                        unit
                    );
                }
                settings.set_etag(category, etag);
            }
            Err(e) => {
                error!("Failed to unpack {}: {}", unit, e);
                stats.record_failure(unit.to_string(), e.to_string());
                // Refetch on the next check
                settings.set_etag(category, None);
            }
        }
        self.publish_progress(lane, stats);
        Ok(())
    }

    async fn apply_course_list(
        &self,
        lane: Lane,
        unit: FetchUnit,
        stats: &mut ApplyStats,
        token: &CancellationToken,
    ) -> SyncResult<()> {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SyncError::Cancelled),
            result = self.executor.fetch(&unit) => result,
        };
        match result {
            Ok(fetched) => self.place(&unit, &fetched, stats).await,
            Err(e) => {
                warn!("Failed to fetch {}: {}", unit, e);
                stats.record_failure(unit.to_string(), e.to_string());
            }
        }
        self.publish_progress(lane, stats);
        Ok(())
    }
}

fn invalid_transition(lane: Lane, from: SyncStatus, action: &str) -> SyncError {
    SyncError::InvalidTransition {
        lane: lane.to_string(),
        from: from.to_string(),
        action: action.to_string(),
    }
}
