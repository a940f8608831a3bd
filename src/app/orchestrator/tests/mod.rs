//! Orchestrator state machine tests against an on-disk origin

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};

use crate::app::catalog::StoreCatalog;
use crate::app::client::{DirectoryRemote, RemoteMeta, RemoteStore, TransferProgress};
use crate::app::fetch::RetryPolicy;
use crate::app::hash::{ContentDigest, HashAlgorithm};
use crate::app::models::Category;
use crate::app::store::{ContentStore, StoreConfig};
use crate::errors::{DownloadError, DownloadResult, SyncError};

use super::*;

fn sha1_hex(data: &[u8]) -> String {
    ContentDigest::compute(HashAlgorithm::Sha1, data).to_hex()
}

/// Origin directory laid out like the remote
struct Origin {
    dir: TempDir,
}

impl Origin {
    fn new() -> Self {
        let origin = Self {
            dir: TempDir::new().unwrap(),
        };
        origin.publish(Category::Songs, &[]);
        origin.publish(Category::Jackets, &[]);
        origin.publish_courses("[]");
        origin
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn publish(&self, category: Category, items: &[(&str, &str)]) {
        let dir = self.path().join(category.remote_dir().unwrap());
        std::fs::create_dir_all(&dir).unwrap();
        let mut names = String::new();
        let mut hashes = String::new();
        for (name, content) in items {
            std::fs::write(dir.join(category.file_name(name)), content).unwrap();
            names.push_str(&format!("{}\n", name));
            hashes.push_str(&format!("{}\n", sha1_hex(content.as_bytes())));
        }
        std::fs::write(self.path().join(category.names_manifest()), names).unwrap();
        std::fs::write(self.path().join(category.hashes_manifest()), hashes).unwrap();
    }

    fn publish_courses(&self, content: &str) {
        std::fs::write(self.path().join("courses.json"), content).unwrap();
        std::fs::write(
            self.path().join("hashed_courses.txt"),
            format!("{}\n", sha1_hex(content.as_bytes())),
        )
        .unwrap();
    }

    fn publish_archive(&self, category: Category, entries: &[(&str, &str)]) {
        let file = std::fs::File::create(self.path().join(category.archive_name().unwrap())).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn remote(&self) -> Arc<dyn RemoteStore> {
        Arc::new(DirectoryRemote::new(self.path()))
    }
}

/// Remote failing downloads of selected paths with a fixed status
#[derive(Debug)]
struct FlakyRemote {
    inner: DirectoryRemote,
    failures: HashMap<String, u16>,
}

impl FlakyRemote {
    fn new(root: &Path, failures: &[(&str, u16)]) -> Self {
        Self {
            inner: DirectoryRemote::new(root),
            failures: failures
                .iter()
                .map(|(path, status)| (path.to_string(), *status))
                .collect(),
        }
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    fn describe(&self) -> String {
        format!("flaky {}", self.inner.describe())
    }

    async fn fetch_text(&self, path: &str) -> DownloadResult<String> {
        self.inner.fetch_text(path).await
    }

    async fn head(&self, path: &str) -> DownloadResult<RemoteMeta> {
        self.inner.head(path).await
    }

    async fn download(
        &self,
        path: &str,
        destination: &Path,
        resume: bool,
        progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<RemoteMeta> {
        if let Some(status) = self.failures.get(path) {
            return Err(DownloadError::from_status(*status, path));
        }
        self.inner.download(path, destination, resume, progress).await
    }
}

/// Remote whose manifest requests wait until the gate opens
#[derive(Debug)]
struct GatedRemote {
    inner: DirectoryRemote,
    gate: Notify,
    open: AtomicBool,
}

impl GatedRemote {
    fn new(root: &Path) -> Self {
        Self {
            inner: DirectoryRemote::new(root),
            gate: Notify::new(),
            open: AtomicBool::new(false),
        }
    }

    fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.gate.notify_waiters();
    }
}

#[async_trait]
impl RemoteStore for GatedRemote {
    fn describe(&self) -> String {
        "gated".to_string()
    }

    async fn fetch_text(&self, path: &str) -> DownloadResult<String> {
        let notified = self.gate.notified();
        if !self.open.load(Ordering::SeqCst) {
            notified.await;
        }
        self.inner.fetch_text(path).await
    }

    async fn head(&self, path: &str) -> DownloadResult<RemoteMeta> {
        self.inner.head(path).await
    }

    async fn download(
        &self,
        path: &str,
        destination: &Path,
        resume: bool,
        progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<RemoteMeta> {
        self.inner.download(path, destination, resume, progress).await
    }
}

/// Remote whose download of one path writes a few bytes and then never finishes
#[derive(Debug)]
struct StallingRemote {
    inner: DirectoryRemote,
    stalled: String,
}

#[async_trait]
impl RemoteStore for StallingRemote {
    fn describe(&self) -> String {
        "stalling".to_string()
    }

    async fn fetch_text(&self, path: &str) -> DownloadResult<String> {
        self.inner.fetch_text(path).await
    }

    async fn head(&self, path: &str) -> DownloadResult<RemoteMeta> {
        self.inner.head(path).await
    }

    async fn download(
        &self,
        path: &str,
        destination: &Path,
        resume: bool,
        progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<RemoteMeta> {
        if path == self.stalled {
            tokio::fs::write(destination, b"{\"trunc").await?;
            std::future::pending::<()>().await;
        }
        self.inner.download(path, destination, resume, progress).await
    }
}

/// Remote reporting no entity tags
#[derive(Debug)]
struct UntaggedRemote {
    inner: DirectoryRemote,
}

#[async_trait]
impl RemoteStore for UntaggedRemote {
    fn describe(&self) -> String {
        "untagged".to_string()
    }

    async fn fetch_text(&self, path: &str) -> DownloadResult<String> {
        self.inner.fetch_text(path).await
    }

    async fn head(&self, path: &str) -> DownloadResult<RemoteMeta> {
        let meta = self.inner.head(path).await?;
        Ok(RemoteMeta { etag: None, ..meta })
    }

    async fn download(
        &self,
        path: &str,
        destination: &Path,
        resume: bool,
        progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<RemoteMeta> {
        let meta = self.inner.download(path, destination, resume, progress).await?;
        Ok(RemoteMeta { etag: None, ..meta })
    }
}

fn test_config() -> SyncConfig {
    SyncConfig::default().with_retry_policy(RetryPolicy::none())
}

async fn open_store(data: &TempDir) -> Arc<ContentStore> {
    Arc::new(
        ContentStore::new(StoreConfig::with_data_root(data.path().to_path_buf()))
            .await
            .unwrap(),
    )
}

async fn orchestrator(remote: Arc<dyn RemoteStore>, data: &TempDir, config: SyncConfig) -> Orchestrator {
    Orchestrator::new(config, open_store(data).await, remote)
        .with_catalog(Arc::new(StoreCatalog::new()))
}

/// Remote {aaa, bbb, ccc}; local {aaa (stale), zzz}
async fn abc_scenario() -> (Origin, TempDir) {
    let origin = Origin::new();
    origin.publish(
        Category::Songs,
        &[("aaa", "{\"v\":2}"), ("bbb", "{}"), ("ccc", "{}")],
    );

    let data = TempDir::new().unwrap();
    let store = open_store(&data).await;
    store.write_item(Category::Songs, "aaa", b"{\"v\":1}").await.unwrap();
    store.write_item(Category::Songs, "zzz", b"{}").await.unwrap();
    store.write_item(Category::CourseList, "courses", b"[]").await.unwrap();
    (origin, data)
}

#[tokio::test]
async fn test_update_lane_checks_existence_only() {
    let (origin, data) = abc_scenario().await;
    let orchestrator = orchestrator(origin.remote(), &data, test_config()).await;

    let plan = orchestrator.check(Lane::Update).await.unwrap();
    let songs = plan.category(Category::Songs).unwrap();
    assert_eq!(songs.missing_names(), vec!["bbb", "ccc"]);
    assert_eq!(songs.obsolete, vec!["zzz".to_string()]);
    assert!(!plan.course_list_changed);
    assert_eq!(orchestrator.snapshot(Lane::Update).status, SyncStatus::Available);

    let outcome = orchestrator.apply(Lane::Update).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.stats.placed, 2);
    assert_eq!(outcome.stats.deleted, 1);
    assert_eq!(outcome.catalog.unwrap().songs, 3);

    let store = orchestrator.store();
    assert_eq!(
        store.list_items(Category::Songs).await.unwrap(),
        vec!["aaa", "bbb", "ccc"]
    );
    // The stale record is untouched by the update lane
    assert_eq!(store.read_item(Category::Songs, "aaa").await.unwrap(), b"{\"v\":1}");
    assert!(store.load_settings().await.unwrap().last_update.is_some());
    assert!(!store.layout().staging_dir().exists());
}

#[tokio::test]
async fn test_fix_lane_repairs_stale_items() {
    let (origin, data) = abc_scenario().await;
    let orchestrator = orchestrator(origin.remote(), &data, test_config()).await;

    let plan = orchestrator.check(Lane::Fix).await.unwrap();
    let songs = plan.category(Category::Songs).unwrap();
    assert_eq!(songs.missing_names(), vec!["aaa", "bbb", "ccc"]);
    assert_eq!(songs.obsolete, vec!["zzz".to_string()]);

    // The update lane is independent
    assert_eq!(orchestrator.snapshot(Lane::Update).status, SyncStatus::Idle);

    let outcome = orchestrator.apply(Lane::Fix).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(
        orchestrator
            .store()
            .read_item(Category::Songs, "aaa")
            .await
            .unwrap(),
        b"{\"v\":2}"
    );
}

#[tokio::test]
async fn test_second_check_is_no_update() {
    let (origin, data) = abc_scenario().await;
    let orchestrator = orchestrator(origin.remote(), &data, test_config()).await;

    orchestrator.check(Lane::Fix).await.unwrap();
    orchestrator.apply(Lane::Fix).await.unwrap();

    let plan = orchestrator.check(Lane::Fix).await.unwrap();
    assert!(!plan.has_changes());
    assert_eq!(orchestrator.snapshot(Lane::Fix).status, SyncStatus::NoUpdate);
    assert!(orchestrator.pending_plan(Lane::Fix).await.is_none());

    orchestrator.acknowledge(Lane::Fix).unwrap();
    assert_eq!(orchestrator.snapshot(Lane::Fix).status, SyncStatus::Idle);
}

#[tokio::test]
async fn test_item_failure_does_not_stop_the_run() {
    let origin = Origin::new();
    let songs: Vec<(String, String)> = (1..=5)
        .map(|i| (format!("s{}", i), format!("{{\"n\":{}}}", i)))
        .collect();
    let refs: Vec<(&str, &str)> = songs
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_str()))
        .collect();
    origin.publish(Category::Songs, &refs);

    let remote = Arc::new(FlakyRemote::new(origin.path(), &[("data/s3.json", 500)]));
    let data = TempDir::new().unwrap();
    let orchestrator = orchestrator(remote, &data, test_config().with_concurrency(1)).await;

    orchestrator.check(Lane::Update).await.unwrap();
    let outcome = orchestrator.apply(Lane::Update).await.unwrap();

    assert_eq!(outcome.status, SyncStatus::Failed);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.failures[0].unit, "songs/s3");
    assert_eq!(
        orchestrator.store().list_items(Category::Songs).await.unwrap(),
        vec!["s1", "s2", "s4", "s5"]
    );

    let snapshot = orchestrator.snapshot(Lane::Update);
    assert_eq!(snapshot.status, SyncStatus::Failed);
    assert_eq!(snapshot.completed, snapshot.total);
    assert_eq!(snapshot.failures, 1);
    assert!(orchestrator
        .store()
        .load_settings()
        .await
        .unwrap()
        .last_update
        .is_none());

    // Failed is retryable
    let plan = orchestrator.check(Lane::Update).await.unwrap();
    assert_eq!(plan.category(Category::Songs).unwrap().missing_names(), vec!["s3"]);
}

#[tokio::test]
async fn test_client_error_aborts_category() {
    let origin = Origin::new();
    origin.publish(
        Category::Songs,
        &[("aaa", "{}"), ("bbb", "{}"), ("ccc", "{}"), ("ddd", "{}")],
    );
    origin.publish(Category::Jackets, &[("aaa", "png")]);

    let remote = Arc::new(FlakyRemote::new(origin.path(), &[("data/bbb.json", 404)]));
    let data = TempDir::new().unwrap();
    let orchestrator = orchestrator(remote, &data, test_config().with_concurrency(1)).await;

    orchestrator.check(Lane::Update).await.unwrap();
    let outcome = orchestrator.apply(Lane::Update).await.unwrap();

    assert_eq!(outcome.status, SyncStatus::Failed);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.skipped, 2);
    let store = orchestrator.store();
    assert_eq!(store.list_items(Category::Songs).await.unwrap(), vec!["aaa"]);
    // Other categories still run
    assert_eq!(store.list_items(Category::Jackets).await.unwrap(), vec!["aaa"]);
}

#[tokio::test]
async fn test_client_error_without_abort_continues() {
    let origin = Origin::new();
    origin.publish(Category::Songs, &[("aaa", "{}"), ("bbb", "{}"), ("ccc", "{}")]);

    let remote = Arc::new(FlakyRemote::new(origin.path(), &[("data/aaa.json", 403)]));
    let data = TempDir::new().unwrap();
    open_store(&data)
        .await
        .write_item(Category::CourseList, "courses", b"[]")
        .await
        .unwrap();
    let config = test_config()
        .with_concurrency(1)
        .with_abort_category_on_client_error(false);
    let orchestrator = orchestrator(remote, &data, config).await;

    orchestrator.check(Lane::Update).await.unwrap();
    let outcome = orchestrator.apply(Lane::Update).await.unwrap();
    assert_eq!(outcome.stats.skipped, 0);
    assert_eq!(outcome.stats.placed, 2);
    assert_eq!(outcome.status, SyncStatus::Failed);
    assert_eq!(
        orchestrator.store().list_items(Category::Songs).await.unwrap(),
        vec!["bbb", "ccc"]
    );
}

#[tokio::test]
async fn test_corrupt_manifest_fails_check() {
    let origin = Origin::new();
    std::fs::write(origin.path().join("all_songs.txt"), "aaa\nbbb\nccc\n").unwrap();
    std::fs::write(origin.path().join("hashed_songs.txt"), "h1\nh2\n").unwrap();

    let data = TempDir::new().unwrap();
    let orchestrator = orchestrator(origin.remote(), &data, test_config()).await;

    let err = orchestrator.check(Lane::Update).await.unwrap_err();
    assert!(matches!(err, SyncError::Manifest(_)));
    let snapshot = orchestrator.snapshot(Lane::Update);
    assert_eq!(snapshot.status, SyncStatus::Failed);
    assert!(snapshot.message.unwrap().contains("3 names but 2 hashes"));
}

#[tokio::test]
async fn test_apply_requires_available_plan() {
    let (origin, data) = abc_scenario().await;
    let orchestrator = orchestrator(origin.remote(), &data, test_config()).await;

    let err = orchestrator.apply(Lane::Update).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidTransition { .. }));
    assert!(matches!(
        orchestrator.acknowledge(Lane::Update),
        Err(SyncError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_missing_catalog_aborts_before_mutation() {
    let (origin, data) = abc_scenario().await;
    let orchestrator = Orchestrator::new(test_config(), open_store(&data).await, origin.remote());

    orchestrator.check(Lane::Update).await.unwrap();
    let err = orchestrator.apply(Lane::Update).await.unwrap_err();
    assert!(matches!(err, SyncError::CollaboratorMissing { .. }));

    assert_eq!(orchestrator.snapshot(Lane::Update).status, SyncStatus::Available);
    assert!(orchestrator.pending_plan(Lane::Update).await.is_some());
    assert_eq!(
        orchestrator.store().list_items(Category::Songs).await.unwrap(),
        vec!["aaa", "zzz"]
    );
}

#[tokio::test]
async fn test_concurrent_run_is_rejected_and_cancel_fails_lane() {
    let origin = Origin::new();
    let remote = Arc::new(GatedRemote::new(origin.path()));
    let data = TempDir::new().unwrap();
    let orchestrator = Arc::new(orchestrator(remote, &data, test_config()).await);

    let background = orchestrator.clone();
    let first = tokio::spawn(async move { background.check(Lane::Update).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(orchestrator.snapshot(Lane::Update).status, SyncStatus::Checking);
    let err = orchestrator.check(Lane::Fix).await.unwrap_err();
    assert!(matches!(err, SyncError::RunInProgress));

    orchestrator.cancel().await;
    let result = first.await.unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert_eq!(orchestrator.snapshot(Lane::Update).status, SyncStatus::Failed);
}

#[tokio::test]
async fn test_archive_strategy_replaces_wholesale() {
    let origin = Origin::new();
    origin.publish_archive(Category::Songs, &[("aaa.json", "{}"), ("bbb.json", "{}")]);
    origin.publish_archive(Category::Jackets, &[("aaa.png", "png")]);
    origin.publish_courses("[{\"name\":\"c\"}]");

    let data = TempDir::new().unwrap();
    let store = open_store(&data).await;
    store.write_item(Category::Songs, "ghost", b"{}").await.unwrap();

    let config = test_config().with_strategy(TransferStrategy::Archive);
    let orchestrator = Orchestrator::new(config, store, origin.remote())
        .with_catalog(Arc::new(StoreCatalog::new()));

    let plan = orchestrator.check(Lane::Update).await.unwrap();
    assert!(plan
        .categories
        .iter()
        .all(|p| p.archive.is_some()));
    assert!(plan.course_list_changed);

    let outcome = orchestrator.apply(Lane::Update).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.stats.archives, 2);
    assert_eq!(outcome.catalog.unwrap().courses, 1);

    let store = orchestrator.store();
    assert_eq!(store.list_items(Category::Songs).await.unwrap(), vec!["aaa", "bbb"]);
    let settings = store.load_settings().await.unwrap();
    assert!(settings.data_etag.is_some());
    assert!(settings.jackets_etag.is_some());

    // Entity tags now match
    let plan = orchestrator.check(Lane::Update).await.unwrap();
    assert!(!plan.has_changes());

    // Force sync ignores them
    let outcome = orchestrator.force_sync().await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.stats.archives, 2);
}

#[tokio::test]
async fn test_progress_is_published() {
    let (origin, data) = abc_scenario().await;
    let orchestrator = orchestrator(origin.remote(), &data, test_config()).await;
    let mut rx = orchestrator.subscribe(Lane::Update);

    orchestrator.check(Lane::Update).await.unwrap();
    orchestrator.apply(Lane::Update).await.unwrap();

    assert!(rx.has_changed().unwrap());
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.status, SyncStatus::Success);
    assert_eq!(snapshot.total, 3);
    assert_eq!(snapshot.completed, 3);
    assert_eq!(snapshot.status_text(), "Update finished. Check again?");
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn test_runs_can_be_spawned() {
    let (origin, data) = abc_scenario().await;
    let orchestrator = orchestrator(origin.remote(), &data, test_config()).await;

    assert_send(&orchestrator.check(Lane::Fix));
    assert_send(&orchestrator.apply(Lane::Fix));
    assert_send(&orchestrator.force_sync());
    assert_send(&orchestrator.cancel());

    let orchestrator = Arc::new(orchestrator);
    let background = orchestrator.clone();
    let plan = tokio::spawn(async move { background.check(Lane::Fix).await })
        .await
        .unwrap()
        .unwrap();
    assert!(plan.has_changes());
}

#[tokio::test]
async fn test_abandoned_check_leaves_lane_retryable() {
    let origin = Origin::new();
    origin.publish(Category::Songs, &[("aaa", "{}")]);
    let remote = Arc::new(GatedRemote::new(origin.path()));
    let data = TempDir::new().unwrap();
    let orchestrator = orchestrator(remote.clone(), &data, test_config()).await;

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), orchestrator.check(Lane::Update)).await;
    assert!(abandoned.is_err());

    let snapshot = orchestrator.snapshot(Lane::Update);
    assert_eq!(snapshot.status, SyncStatus::Failed);
    assert!(snapshot.message.is_some());

    orchestrator.acknowledge(Lane::Update).unwrap();
    remote.open();
    let plan = orchestrator.check(Lane::Update).await.unwrap();
    assert_eq!(
        plan.category(Category::Songs).unwrap().missing_names(),
        vec!["aaa"]
    );
    assert_eq!(orchestrator.snapshot(Lane::Update).status, SyncStatus::Available);
}

/// Four songs on the origin, the third of which never finishes downloading
async fn stalled_scenario() -> (Origin, TempDir, Orchestrator) {
    let origin = Origin::new();
    origin.publish(
        Category::Songs,
        &[("s1", "{}"), ("s2", "{}"), ("s3", "{}"), ("s4", "{}")],
    );
    let remote = Arc::new(StallingRemote {
        inner: DirectoryRemote::new(origin.path()),
        stalled: "data/s3.json".to_string(),
    });

    let data = TempDir::new().unwrap();
    open_store(&data)
        .await
        .write_item(Category::CourseList, "courses", b"[]")
        .await
        .unwrap();
    let orchestrator = orchestrator(remote, &data, test_config().with_concurrency(1)).await;
    (origin, data, orchestrator)
}

async fn wait_for_completed(orchestrator: &Orchestrator, lane: Lane, completed: usize) {
    let mut rx = orchestrator.subscribe(lane);
    tokio::time::timeout(Duration::from_secs(5), async {
        while rx.borrow_and_update().completed < completed {
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_cancel_during_apply_places_nothing_partial() {
    let (_origin, _data, orchestrator) = stalled_scenario().await;
    let orchestrator = Arc::new(orchestrator);
    orchestrator.check(Lane::Update).await.unwrap();

    let background = orchestrator.clone();
    let run = tokio::spawn(async move { background.apply(Lane::Update).await });
    wait_for_completed(&orchestrator, Lane::Update, 2).await;
    // The third download is now stuck with bytes in staging
    tokio::time::sleep(Duration::from_millis(20)).await;

    orchestrator.cancel().await;
    let outcome = run.await.unwrap().unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.status, SyncStatus::Failed);
    assert_eq!(outcome.stats.placed, 2);
    assert_eq!(orchestrator.snapshot(Lane::Update).status, SyncStatus::Failed);

    let store = orchestrator.store();
    assert_eq!(store.list_items(Category::Songs).await.unwrap(), vec!["s1", "s2"]);
    assert!(!store.layout().item_path(Category::Songs, "s3").exists());
    assert!(!store.layout().staging_dir().exists());
    assert!(store.load_settings().await.unwrap().last_update.is_none());
}

#[tokio::test]
async fn test_abandoned_apply_leaves_lane_retryable() {
    let (_origin, _data, orchestrator) = stalled_scenario().await;
    orchestrator.check(Lane::Update).await.unwrap();

    tokio::select! {
        _ = orchestrator.apply(Lane::Update) => panic!("apply finished past a stalled download"),
        _ = wait_for_completed(&orchestrator, Lane::Update, 2) => {}
    }
    assert_eq!(orchestrator.snapshot(Lane::Update).status, SyncStatus::Failed);
    assert!(orchestrator.pending_plan(Lane::Update).await.is_none());

    // Items placed before the abandon stay; the rest is planned again
    let plan = orchestrator.check(Lane::Update).await.unwrap();
    assert_eq!(
        plan.category(Category::Songs).unwrap().missing_names(),
        vec!["s3", "s4"]
    );
    assert!(!orchestrator
        .store()
        .layout()
        .item_path(Category::Songs, "s3")
        .exists());
}

#[tokio::test]
async fn test_archive_without_entity_tag_is_refetched() {
    let origin = Origin::new();
    origin.publish_archive(Category::Songs, &[("aaa.json", "{}")]);
    origin.publish_archive(Category::Jackets, &[("aaa.png", "png")]);

    let remote = Arc::new(UntaggedRemote {
        inner: DirectoryRemote::new(origin.path()),
    });
    let data = TempDir::new().unwrap();
    let config = test_config().with_strategy(TransferStrategy::Archive);
    let orchestrator = orchestrator(remote, &data, config).await;

    orchestrator.check(Lane::Update).await.unwrap();
    let outcome = orchestrator.apply(Lane::Update).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(
        orchestrator.store().list_items(Category::Songs).await.unwrap(),
        vec!["aaa"]
    );

    let settings = orchestrator.store().load_settings().await.unwrap();
    assert_eq!(settings.etag(Category::Songs), None);

    // Nothing to compare against, so the archive is planned again
    let plan = orchestrator.check(Lane::Update).await.unwrap();
    assert!(plan.category(Category::Songs).unwrap().archive.is_some());
}
