//! End-to-end sync scenarios
//!
//! Drives the orchestrator against an origin served over HTTP (and, for the
//! seeding flow, a local mirror) and inspects the resulting store.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use bpm_assets::app::{
    connect_remote, AssetClient, Category, ClientConfig, ContentStore, Lane, Orchestrator,
    RemoteStore, RetryPolicy, StoreCatalog, StoreConfig, SyncConfig, SyncStatus,
    TransferStrategy,
};
use bpm_assets::app::client::partial;

use common::{sha1_hex, Fault, Origin, TestServer};

fn sync_config() -> SyncConfig {
    SyncConfig::default().with_retry_policy(RetryPolicy::none())
}

async fn open_store(data: &TempDir) -> Arc<ContentStore> {
    Arc::new(
        ContentStore::new(StoreConfig::with_data_root(data.path().to_path_buf()))
            .await
            .unwrap(),
    )
}

fn http_remote(server: &TestServer) -> Arc<dyn RemoteStore> {
    Arc::new(AssetClient::new(&server.client_config().with_max_retries(0)).unwrap())
}

fn orchestrator(
    config: SyncConfig,
    store: Arc<ContentStore>,
    remote: Arc<dyn RemoteStore>,
) -> Orchestrator {
    Orchestrator::new(config, store, remote).with_catalog(Arc::new(StoreCatalog::new()))
}

#[tokio::test]
async fn test_one_failing_song_of_five() {
    let origin = Origin::new();
    let songs: Vec<(String, String)> = (1..=5)
        .map(|i| (format!("s{}", i), format!("{{\"id\":{}}}", i)))
        .collect();
    let items: Vec<(&str, &str)> = songs
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_str()))
        .collect();
    origin.publish(Category::Songs, &items);

    let server = TestServer::serve_dir(origin.path()).await;
    server.inject("/data/s3.json", Fault::Status(500));

    let data = TempDir::new().unwrap();
    let store = open_store(&data).await;
    store
        .write_item(Category::CourseList, "courses", b"[]")
        .await
        .unwrap();
    let orchestrator = orchestrator(sync_config(), store, http_remote(&server));

    let plan = orchestrator.check(Lane::Update).await.unwrap();
    assert_eq!(plan.total_units(), 5);

    let outcome = orchestrator.apply(Lane::Update).await.unwrap();
    assert_eq!(outcome.status, SyncStatus::Failed);
    assert_eq!(outcome.stats.placed, 4);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.completed, 5);
    assert!(!outcome.cancelled);

    let store = orchestrator.store();
    assert_eq!(
        store.list_items(Category::Songs).await.unwrap(),
        vec!["s1", "s2", "s4", "s5"]
    );
    // Nothing left behind in staging
    assert!(!store.layout().staging_dir().join("songs").join("s3.json.tmp").exists());
    assert!(store.load_settings().await.unwrap().last_update.is_none());

    // The next cycle only wants the failed song
    orchestrator.acknowledge(Lane::Update).unwrap();
    let retry = orchestrator.check(Lane::Update).await.unwrap();
    let songs = retry.category(Category::Songs).unwrap();
    assert_eq!(songs.missing_names(), vec!["s3"]);
}

#[tokio::test]
async fn test_archive_strategy_over_http_removes_ghosts() {
    let origin = Origin::new();
    origin.publish_archive(
        Category::Songs,
        &[("aaa.json", "{\"bpm\":150}"), ("bbb.json", "{\"bpm\":180}")],
    );
    origin.publish_archive(Category::Jackets, &[("aaa.png", "png-a")]);
    origin.publish_courses("[{\"name\":\"A\"},{\"name\":\"B\"}]");

    let server = TestServer::serve_dir(origin.path()).await;

    let data = TempDir::new().unwrap();
    let store = open_store(&data).await;
    store.write_item(Category::Songs, "ghost", b"{}").await.unwrap();
    store.write_item(Category::Jackets, "ghost", b"png").await.unwrap();

    let config = sync_config().with_strategy(TransferStrategy::Archive);
    let orchestrator = orchestrator(config, store, http_remote(&server));

    let plan = orchestrator.check(Lane::Update).await.unwrap();
    assert!(plan.has_changes());
    assert!(plan.course_list_changed);

    let outcome = orchestrator.apply(Lane::Update).await.unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.stats.failures);
    assert_eq!(outcome.stats.archives, 2);

    let catalog = outcome.catalog.unwrap();
    assert_eq!(catalog.songs, 2);
    assert_eq!(catalog.jackets, 1);
    assert_eq!(catalog.courses, 2);

    let store = orchestrator.store();
    assert_eq!(
        store.list_items(Category::Songs).await.unwrap(),
        vec!["aaa", "bbb"]
    );
    assert_eq!(
        store.list_items(Category::Jackets).await.unwrap(),
        vec!["aaa"]
    );

    let settings = store.load_settings().await.unwrap();
    let head = server.requests();
    assert!(head.iter().any(|r| r.method == "HEAD" && r.path == "/data.zip"));
    assert!(settings.etag(Category::Songs).is_some());
    assert!(settings.last_update.is_some());

    // Unchanged entity tags: nothing to do
    orchestrator.acknowledge(Lane::Update).unwrap();
    let plan = orchestrator.check(Lane::Update).await.unwrap();
    assert!(!plan.has_changes());
    assert_eq!(orchestrator.snapshot(Lane::Update).status, SyncStatus::NoUpdate);
}

#[tokio::test]
async fn test_lanes_after_seeding_from_bundle() {
    let origin = Origin::new();
    origin.publish(
        Category::Songs,
        &[("aaa", "{\"v\":2}"), ("bbb", "{\"v\":1}")],
    );
    origin.publish(Category::Jackets, &[("aaa", "png-a")]);
    origin.publish_courses("[]");

    // Bundle shipped with an older copy of aaa and an entry since removed
    let bundle = TempDir::new().unwrap();
    std::fs::create_dir_all(bundle.path().join("songs")).unwrap();
    std::fs::create_dir_all(bundle.path().join("jackets")).unwrap();
    std::fs::write(bundle.path().join("songs/aaa.json"), "{\"v\":1}").unwrap();
    std::fs::write(bundle.path().join("songs/old.json"), "{}").unwrap();
    std::fs::write(bundle.path().join("jackets/aaa.png"), "png-a").unwrap();
    std::fs::write(bundle.path().join("courses.json"), "[]").unwrap();

    let data = TempDir::new().unwrap();
    let store = open_store(&data).await;
    let copied = store.seed_from(bundle.path(), false).await.unwrap();
    assert_eq!(copied, 4);
    assert!(store.load_settings().await.unwrap().initial_load.is_some());

    let remote = connect_remote(
        &ClientConfig::default().with_base_url(origin.path().to_string_lossy()),
    )
    .unwrap();
    let orchestrator = orchestrator(sync_config(), store, remote);

    // Update lane: existence only, so the stale aaa is not noticed
    let plan = orchestrator.check(Lane::Update).await.unwrap();
    let songs = plan.category(Category::Songs).unwrap();
    assert_eq!(songs.missing_names(), vec!["bbb"]);
    assert_eq!(songs.obsolete, vec!["old".to_string()]);
    assert!(!plan.course_list_changed);

    let outcome = orchestrator.apply(Lane::Update).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.stats.placed, 1);
    assert_eq!(outcome.stats.deleted, 1);

    // Fix lane: hashes reveal the stale record
    let plan = orchestrator.check(Lane::Fix).await.unwrap();
    let songs = plan.category(Category::Songs).unwrap();
    assert_eq!(songs.missing_names(), vec!["aaa"]);
    assert!(songs.obsolete.is_empty());

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
    assert_eq!(
        orchestrator.snapshot(Lane::Fix).status_text(),
        "Repair finished. Check again?"
    );

    // Both lanes now agree that nothing is left
    orchestrator.acknowledge(Lane::Fix).unwrap();
    assert!(!orchestrator.check(Lane::Fix).await.unwrap().has_changes());
    orchestrator.acknowledge(Lane::Update).unwrap();
    assert!(!orchestrator.check(Lane::Update).await.unwrap().has_changes());
}

#[tokio::test]
async fn test_interrupted_archive_of_older_version_is_not_resumed() {
    // An earlier run stopped halfway through the previous data.zip
    let previous = Origin::new();
    previous.publish_archive(Category::Songs, &[("aaa.json", "{\"v\":1}")]);
    let previous_zip = std::fs::read(previous.path().join("data.zip")).unwrap();

    let origin = Origin::new();
    origin.publish_archive(
        Category::Songs,
        &[("aaa.json", "{\"v\":2}"), ("bbb.json", "{\"v\":2}")],
    );
    origin.publish_archive(Category::Jackets, &[("aaa.png", "png-a")]);
    let server = TestServer::serve_dir(origin.path()).await;

    let data = TempDir::new().unwrap();
    let store = open_store(&data).await;
    store.write_item(Category::Songs, "keep", b"{}").await.unwrap();

    let staged = store.layout().staging_archive_path("data.zip");
    std::fs::create_dir_all(staged.parent().unwrap()).unwrap();
    std::fs::write(&staged, &previous_zip[..previous_zip.len() / 2]).unwrap();
    std::fs::write(
        partial::tag_path(&staged),
        format!("\"{}\"", sha1_hex(&previous_zip)),
    )
    .unwrap();

    let config = sync_config().with_strategy(TransferStrategy::Archive);
    let orchestrator = orchestrator(config, store, http_remote(&server));
    orchestrator.check(Lane::Update).await.unwrap();
    let outcome = orchestrator.apply(Lane::Update).await.unwrap();

    assert!(outcome.is_success(), "{:?}", outcome.stats.failures);
    assert_eq!(
        orchestrator.store().list_items(Category::Songs).await.unwrap(),
        vec!["aaa", "bbb"]
    );
    assert_eq!(
        orchestrator
            .store()
            .read_item(Category::Songs, "bbb")
            .await
            .unwrap(),
        b"{\"v\":2}"
    );

    let archive_get = server
        .requests()
        .into_iter()
        .find(|r| r.method == "GET" && r.path == "/data.zip")
        .unwrap();
    assert_eq!(
        archive_get.if_range,
        Some(format!("\"{}\"", sha1_hex(&previous_zip)))
    );
}
