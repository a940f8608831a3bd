//! Fetcher tests against a local mirror

use std::sync::Arc;

use tempfile::TempDir;

use crate::app::client::DirectoryRemote;
use crate::app::hash::ManifestHash;
use crate::app::manifest::ManifestFetcher;
use crate::app::models::Category;
use crate::errors::{DownloadError, ManifestError};

async fn mirror_with(files: &[(&str, &str)]) -> (TempDir, ManifestFetcher) {
    let temp_dir = TempDir::new().unwrap();
    for (name, content) in files {
        tokio::fs::write(temp_dir.path().join(name), content)
            .await
            .unwrap();
    }
    let remote = Arc::new(DirectoryRemote::new(temp_dir.path()));
    (temp_dir, ManifestFetcher::new(remote))
}

#[tokio::test]
async fn test_fetch_manifest_pairs_lists() {
    let (_dir, fetcher) = mirror_with(&[
        ("all_songs.txt", "aaa\nbbb\nccc\n"),
        ("hashed_songs.txt", "h1\nh2\nh3\n"),
    ])
    .await;

    let manifest = fetcher.fetch_manifest(Category::Songs).await.unwrap();
    assert_eq!(manifest.category(), Category::Songs);
    assert_eq!(manifest.len(), 3);
    assert_eq!(manifest.hash_of("ccc"), Some(&ManifestHash::new("h3")));
    assert!(!manifest.contains("zzz"));
}

#[tokio::test]
async fn test_mismatched_lists_are_corrupt() {
    let (_dir, fetcher) = mirror_with(&[
        ("all_songs.txt", "aaa\nbbb\nccc\n"),
        ("hashed_songs.txt", "h1\nh2\n"),
    ])
    .await;

    let err = fetcher.fetch_manifest(Category::Songs).await.unwrap_err();
    assert!(matches!(err, ManifestError::LengthMismatch { .. }));
}

#[tokio::test]
async fn test_missing_list_is_network_error() {
    let (_dir, fetcher) = mirror_with(&[("all_jackets.txt", "aaa\n")]).await;

    let err = fetcher.fetch_manifest(Category::Jackets).await.unwrap_err();
    match err {
        ManifestError::Network { file, source } => {
            assert_eq!(file, "hashed_jackets.txt");
            assert!(matches!(source, DownloadError::NotFound { .. }));
        }
        other => panic!("expected network error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_snapshot() {
    let (_dir, fetcher) = mirror_with(&[
        ("all_songs.txt", "aaa\nbbb\n"),
        ("hashed_songs.txt", "h1\nh2\n"),
        ("all_jackets.txt", "aaa\n"),
        ("hashed_jackets.txt", "j1\n"),
        ("hashed_courses.txt", "C0\n"),
    ])
    .await;

    let snapshot = fetcher.fetch_snapshot().await.unwrap();
    assert_eq!(snapshot.songs.len(), 2);
    assert_eq!(snapshot.jackets.len(), 1);
    assert_eq!(snapshot.course_hash, ManifestHash::new("c0"));
    assert!(snapshot.manifest(Category::CourseList).is_none());
}

#[tokio::test]
async fn test_course_list_has_no_item_manifest() {
    let (_dir, fetcher) = mirror_with(&[]).await;
    assert!(fetcher.fetch_manifest(Category::CourseList).await.is_err());
}
