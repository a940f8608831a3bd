//! Command handlers for the BPM Assets CLI
//!
//! This module implements the command handlers that coordinate between
//! CLI arguments and the sync engine.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app::{
    connect_remote, course_list_changed, format_bytes, ApplyOutcome, Category, ContentStore,
    Lane, ManifestFetcher, Orchestrator, RemoteStore, SignalHandler, StoreCatalog, SyncConfig,
    SyncPlan, VerificationReport,
};
use crate::cli::{
    CheckArgs, GlobalArgs, ProgressConfig, ProgressDisplay, ResetArgs, SeedArgs, StatusArgs,
    UpdateArgs,
};
use crate::config::AppConfig;
use crate::errors::{AppError, Result, SyncError};

/// Items listed per category in dry-run output
const DRY_RUN_LISTING: usize = 10;

/// Store, origin and sync settings resolved from config file, environment and flags
pub struct Runtime {
    pub store: Arc<ContentStore>,
    pub remote: Arc<dyn RemoteStore>,
    pub sync: SyncConfig,
    pub quiet: bool,
}

impl Runtime {
    /// Resolve configuration and open the store and origin
    pub async fn open(global: &GlobalArgs) -> Result<Self> {
        let mut app_config = AppConfig::load(global.config.clone()).await?;

        if let Some(dir) = &global.data_dir {
            app_config.store.data_root = Some(dir.clone());
        }
        if let Some(base_url) = &global.base_url {
            app_config.client.base_url = base_url.clone();
        }

        let (store_config, client_config, sync) = app_config.to_runtime_config()?;

        let store = Arc::new(ContentStore::new(store_config).await?);
        let remote = connect_remote(&client_config)?;
        debug!(
            "Opened store at {} against {}",
            store.root().display(),
            client_config.base_url
        );

        Ok(Self {
            store,
            remote,
            sync,
            quiet: global.quiet,
        })
    }

    /// Orchestrator wired to the store catalog
    pub fn orchestrator(&self, sync: SyncConfig) -> Orchestrator {
        Orchestrator::new(sync, self.store.clone(), self.remote.clone())
            .with_catalog(Arc::new(StoreCatalog::new()))
    }
}

/// Handle the check command
///
/// Runs a check on the selected lane and reports what an update would do.
pub async fn handle_check(global: &GlobalArgs, args: CheckArgs) -> Result<()> {
    let runtime = Runtime::open(global).await?;
    let mut sync = runtime.sync.clone();
    if let Some(strategy) = args.strategy() {
        sync = sync.with_strategy(strategy);
    }

    let lane = args.lane();
    let orchestrator = runtime.orchestrator(sync);
    let _signals = SignalHandler::new(orchestrator.shutdown_token()).setup();

    let start = Instant::now();
    let plan = orchestrator.check(lane).await?;
    info!("{} check completed in {:?}", lane, start.elapsed());

    println!("{}", orchestrator.snapshot(lane).status_text());
    if plan.has_changes() {
        println!("  {}", plan.summary());
        println!(
            "  Run `bpm_assets update{}` to apply.",
            if lane == Lane::Fix { " --fix" } else { "" }
        );
    }

    Ok(())
}

/// Handle the update command
///
/// Checks the selected lane and, when work is available, applies it with
/// live progress. A run that ends with failures is reported as an error.
pub async fn handle_update(global: &GlobalArgs, args: UpdateArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    let runtime = Runtime::open(global).await?;
    let mut sync = runtime.sync.clone();
    if let Some(strategy) = args.strategy() {
        sync = sync.with_strategy(strategy);
    }
    if let Some(concurrency) = args.concurrency {
        sync = sync.with_concurrency(concurrency);
    }

    let lane = args.lane();
    let orchestrator = runtime.orchestrator(sync);
    let _signals = SignalHandler::new(orchestrator.shutdown_token()).setup();

    let plan = orchestrator.check(lane).await?;
    if !plan.has_changes() {
        println!("{}", orchestrator.snapshot(lane).status_text());
        return Ok(());
    }

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    println!("{}: {}", orchestrator.snapshot(lane).status_text(), plan.summary());

    let mut display = ProgressDisplay::new(progress_config(&runtime));
    display.start(orchestrator.subscribe(lane))?;
    let outcome = orchestrator.apply(lane).await?;
    display.finish(&outcome).await;

    outcome_result(&outcome)
}

/// Handle the force-sync command
pub async fn handle_force_sync(global: &GlobalArgs) -> Result<()> {
    let runtime = Runtime::open(global).await?;
    let orchestrator = runtime.orchestrator(runtime.sync.clone());
    let _signals = SignalHandler::new(orchestrator.shutdown_token()).setup();

    println!("Replacing all categories from the origin archives...");

    let mut display = ProgressDisplay::new(progress_config(&runtime));
    display.start(orchestrator.subscribe(Lane::Update))?;
    let outcome = orchestrator.force_sync().await?;
    display.finish(&outcome).await;

    outcome_result(&outcome)
}

/// Handle the status command
pub async fn handle_status(global: &GlobalArgs, args: StatusArgs) -> Result<()> {
    let runtime = Runtime::open(global).await?;
    let stats = runtime.store.stats().await?;

    println!("BPM Assets Store");
    println!("================");
    println!("Location: {}", stats.root.display());
    println!("Songs: {}", stats.songs);
    println!("Jackets: {}", stats.jackets);
    println!(
        "Course list: {}",
        if stats.has_courses { "present" } else { "missing" }
    );
    println!("Size: {}", stats.format_size());

    let settings = &stats.settings;
    match settings.last_update {
        Some(at) => println!("Last update: {}", at.format("%Y-%m-%d %H:%M UTC")),
        None => println!("Last update: never"),
    }
    if let Some(at) = settings.initial_load {
        println!("Seeded: {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
    for category in [Category::Songs, Category::Jackets] {
        if let Some(etag) = settings.etag(category) {
            println!("{} archive tag: {}", category, etag);
        }
    }
    if settings.update_due(Utc::now(), runtime.sync.update_interval) {
        println!("An update check is due. Run `bpm_assets check`.");
    }

    if args.verify {
        println!();
        verify_store(&runtime).await?;
    }

    Ok(())
}

/// Hash every local item against the origin manifests
async fn verify_store(runtime: &Runtime) -> Result<()> {
    let fetcher = ManifestFetcher::new(runtime.remote.clone());
    let snapshot = fetcher.fetch_snapshot().await?;

    let start = Instant::now();
    let mut report = VerificationReport::new();
    for category in [Category::Songs, Category::Jackets] {
        if let Some(manifest) = snapshot.manifest(category) {
            report.merge(runtime.store.verify_against(manifest).await);
        }
    }
    let courses_stale =
        course_list_changed(&snapshot.course_hash, runtime.store.as_ref()).await;
    info!("Verification completed in {:?}", start.elapsed());

    println!("Verification");
    println!("============");
    println!("Checked: {}", report.files_checked);
    println!("Verified: {}", report.files_verified);
    println!("Missing: {}", report.files_missing);
    println!(
        "Corrupted: {}",
        report.files_failed - report.files_missing
    );
    println!(
        "Course list: {}",
        if courses_stale { "stale" } else { "up to date" }
    );

    for failure in report.failed_files.iter().take(DRY_RUN_LISTING) {
        println!("  {}/{}: {}", failure.category, failure.name, failure.reason);
    }
    if report.failed_files.len() > DRY_RUN_LISTING {
        println!(
            "  ... and {} more",
            report.failed_files.len() - DRY_RUN_LISTING
        );
    }

    if !report.is_successful() || courses_stale {
        println!("Run `bpm_assets update --fix` to repair.");
    }

    Ok(())
}

/// Handle the seed command
pub async fn handle_seed(global: &GlobalArgs, args: SeedArgs) -> Result<()> {
    let runtime = Runtime::open(global).await?;

    let copied = runtime.store.seed_from(&args.from, args.force).await?;
    if copied == 0 {
        warn!("Seeding from {} copied nothing", args.from.display());
    }

    println!(
        "Seeded {} files from {} into {}",
        copied,
        args.from.display(),
        runtime.store.root().display()
    );
    Ok(())
}

/// Handle the reset command
pub async fn handle_reset(global: &GlobalArgs, args: ResetArgs) -> Result<()> {
    if !args.yes {
        return Err(AppError::generic(
            "Reset deletes all local content; pass --yes to confirm",
        ));
    }

    let runtime = Runtime::open(global).await?;
    let stats = runtime.store.stats().await?;
    runtime.store.reset().await?;

    println!(
        "Removed {} songs, {} jackets ({}) from {}",
        stats.songs,
        stats.jackets,
        format_bytes(stats.total_bytes),
        stats.root.display()
    );
    Ok(())
}

fn progress_config(runtime: &Runtime) -> ProgressConfig {
    ProgressConfig {
        enable_progress_bars: !runtime.quiet,
        quiet: runtime.quiet,
        ..Default::default()
    }
}

fn print_dry_run(plan: &SyncPlan) {
    println!("Dry run - {} steps would run:", plan.total_units());

    for category_plan in &plan.categories {
        if let Some(refresh) = &category_plan.archive {
            println!(
                "  {}: replace from archive{}",
                category_plan.category,
                refresh
                    .remote_etag
                    .as_deref()
                    .map(|tag| format!(" (tag {})", tag))
                    .unwrap_or_default()
            );
            continue;
        }

        if !category_plan.missing.is_empty() {
            println!(
                "  {}: {} to download",
                category_plan.category,
                category_plan.missing.len()
            );
            for name in category_plan.missing_names().iter().take(DRY_RUN_LISTING) {
                println!("    + {}", name);
            }
            if category_plan.missing.len() > DRY_RUN_LISTING {
                println!(
                    "    ... and {} more",
                    category_plan.missing.len() - DRY_RUN_LISTING
                );
            }
        }

        if !category_plan.obsolete.is_empty() {
            println!(
                "  {}: {} to delete",
                category_plan.category,
                category_plan.obsolete.len()
            );
            for name in category_plan.obsolete.iter().take(DRY_RUN_LISTING) {
                println!("    - {}", name);
            }
        }
    }

    if plan.course_list_changed {
        println!("  {}: replace", Category::CourseList);
    }
}

/// Map a finished run to the process result
fn outcome_result(outcome: &ApplyOutcome) -> Result<()> {
    if outcome.is_success() {
        return Ok(());
    }

    if outcome.cancelled {
        return Err(SyncError::Cancelled.into());
    }

    Err(SyncError::ItemsFailed {
        failed: outcome.stats.failed + outcome.stats.skipped,
        total: outcome.stats.total,
    }
    .into())
}
