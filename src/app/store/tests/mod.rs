//! Store tests covering archive replacement, bundle seeding and reset

use std::io::Write;
use std::path::Path;

use tempfile::TempDir;

use crate::app::models::Category;
use crate::app::store::{ContentStore, StoreConfig};
use crate::errors::StoreError;

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in entries {
        zip.start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

async fn store_in(dir: &Path) -> ContentStore {
    ContentStore::new(StoreConfig::with_data_root(dir.to_path_buf()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_archive_replaces_category_wholesale() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(temp_dir.path()).await;

    store.write_item(Category::Songs, "ghost", b"{}").await.unwrap();
    store.write_item(Category::Songs, "aaa", b"old").await.unwrap();

    let archive = store.layout().staging_archive_path("data.zip");
    std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
    write_zip(
        &archive,
        &[("aaa.json", &b"new"[..]), ("bbb.json", &b"{\"bpm\":150}"[..])],
    );

    let entries = store
        .replace_from_archive(Category::Songs, &archive)
        .await
        .unwrap();
    assert_eq!(entries, 2);

    assert_eq!(
        store.list_items(Category::Songs).await.unwrap(),
        vec!["aaa", "bbb"]
    );
    assert!(!store
        .layout()
        .item_path(Category::Songs, "ghost")
        .exists());
    assert_eq!(store.read_item(Category::Songs, "aaa").await.unwrap(), b"new");
    // The staged archive is consumed
    assert!(!archive.exists());
}

#[tokio::test]
async fn test_corrupt_archive_is_extraction_failure() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(temp_dir.path()).await;
    store.write_item(Category::Jackets, "aaa", b"png").await.unwrap();

    let archive = temp_dir.path().join("jackets.zip.part");
    std::fs::write(&archive, b"definitely not a zip").unwrap();

    let err = store
        .replace_from_archive(Category::Jackets, &archive)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ExtractionFailure { .. }));

    // Existing content survives a failed extraction
    assert_eq!(
        store.list_items(Category::Jackets).await.unwrap(),
        vec!["aaa"]
    );
    assert!(!store.layout().staging_unpack_dir(Category::Jackets).exists());
}

#[tokio::test]
async fn test_damaged_entry_leaves_category_intact() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(temp_dir.path()).await;
    store.write_item(Category::Songs, "keep", b"{}").await.unwrap();

    // Readable directory, but an entry whose bytes no longer match its CRC
    let archive = store.layout().staging_archive_path("data.zip");
    std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
    {
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("bbb.json", options).unwrap();
        zip.write_all(&[b'x'; 256]).unwrap();
        zip.finish().unwrap();
    }
    let mut bytes = std::fs::read(&archive).unwrap();
    // Local header (30 bytes) + name (8 bytes), then stored data
    bytes[60] ^= 0xff;
    std::fs::write(&archive, bytes).unwrap();

    let err = store
        .replace_from_archive(Category::Songs, &archive)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ExtractionFailure { .. }));
    assert_eq!(
        store.list_items(Category::Songs).await.unwrap(),
        vec!["keep"]
    );
}

#[tokio::test]
async fn test_seed_from_bundle() {
    let bundle = TempDir::new().unwrap();
    std::fs::create_dir_all(bundle.path().join("songs")).unwrap();
    std::fs::create_dir_all(bundle.path().join("jackets")).unwrap();
    std::fs::write(bundle.path().join("songs/aaa.json"), b"{}").unwrap();
    std::fs::write(bundle.path().join("songs/bbb.json"), b"{}").unwrap();
    std::fs::write(bundle.path().join("jackets/aaa.png"), b"png").unwrap();
    std::fs::write(bundle.path().join("courses.json"), b"[]").unwrap();

    let data = TempDir::new().unwrap();
    let store = store_in(data.path()).await;
    let copied = store.seed_from(bundle.path(), false).await.unwrap();
    assert_eq!(copied, 4);
    assert_eq!(store.list_items(Category::Songs).await.unwrap().len(), 2);
    assert!(store.load_settings().await.unwrap().initial_load.is_some());

    // A populated store is only reseeded with force
    let err = store.seed_from(bundle.path(), false).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadySeeded { .. }));
    assert_eq!(store.seed_from(bundle.path(), true).await.unwrap(), 4);
}

#[tokio::test]
async fn test_reset_clears_everything() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(temp_dir.path()).await;

    store.write_item(Category::Songs, "aaa", b"{}").await.unwrap();
    store.write_item(Category::CourseList, "courses", b"[]").await.unwrap();
    let mut settings = store.load_settings().await.unwrap();
    settings.data_etag = Some("\"e1\"".to_string());
    store.save_settings(&settings).await.unwrap();

    store.reset().await.unwrap();

    assert!(store.is_empty().await.unwrap());
    assert_eq!(store.load_settings().await.unwrap().data_etag, None);
    assert!(store.root().exists());
}
