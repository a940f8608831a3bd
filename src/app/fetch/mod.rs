//! Fetch executor
//!
//! Turns planned units of work into staged files. A unit is either a single
//! item, fetched with retries and verified against its manifest hash, or a
//! whole-category archive fetched as a resumable [`BackgroundTransfer`].
//! Nothing outside the staging area is touched here; moving a staged file into
//! place or unpacking an archive is left to the caller.
//!
//! # Module Organization
//!
//! - [`retry`] - Exponential backoff policy
//! - [`transfer`] - Background transfers with progress and completion channels

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::client::{RemoteStore, TransferProgress};
use crate::app::models::{Category, ItemRef};
use crate::app::store::ContentStore;
use crate::errors::{DownloadError, DownloadResult};

pub mod retry;
pub mod transfer;

pub use retry::RetryPolicy;
pub use transfer::BackgroundTransfer;

/// One unit of work for the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchUnit {
    /// A single item (song record, jacket image or the course list)
    Item(ItemRef),
    /// The bulk archive of an enumerable category
    Archive(Category),
}

impl FetchUnit {
    pub fn category(&self) -> Category {
        match self {
            FetchUnit::Item(item) => item.category,
            FetchUnit::Archive(category) => *category,
        }
    }
}

impl fmt::Display for FetchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchUnit::Item(item) => write!(f, "{}", item),
            FetchUnit::Archive(category) => write!(f, "{} archive", category),
        }
    }
}

/// A successfully staged unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Item {
        item: ItemRef,
        staged: PathBuf,
        bytes: u64,
    },
    Archive {
        category: Category,
        staged: PathBuf,
        /// Entity tag reported with the archive
        etag: Option<String>,
        bytes: u64,
    },
}

impl Fetched {
    pub fn staged(&self) -> &Path {
        match self {
            Fetched::Item { staged, .. } | Fetched::Archive { staged, .. } => staged,
        }
    }

    pub fn bytes(&self) -> u64 {
        match self {
            Fetched::Item { bytes, .. } | Fetched::Archive { bytes, .. } => *bytes,
        }
    }
}

/// Downloads units into the store's staging area
#[derive(Debug, Clone)]
pub struct FetchExecutor {
    remote: Arc<dyn RemoteStore>,
    store: Arc<ContentStore>,
    retry: RetryPolicy,
    verify_downloads: bool,
}

impl FetchExecutor {
    pub fn new(remote: Arc<dyn RemoteStore>, store: Arc<ContentStore>) -> Self {
        Self {
            remote,
            store,
            retry: RetryPolicy::default(),
            verify_downloads: true,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check fresh item downloads against their manifest hash
    pub fn with_verify_downloads(mut self, verify: bool) -> Self {
        self.verify_downloads = verify;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch a unit into staging
    pub async fn fetch(&self, unit: &FetchUnit) -> DownloadResult<Fetched> {
        self.fetch_with_progress(unit, None).await
    }

    /// Fetch a unit into staging, forwarding archive byte progress
    pub async fn fetch_with_progress(
        &self,
        unit: &FetchUnit,
        progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<Fetched> {
        match unit {
            FetchUnit::Item(item) => self.fetch_item(item).await,
            FetchUnit::Archive(category) => self.fetch_archive(*category, progress).await,
        }
    }

    /// Download one item, retrying transient failures
    ///
    /// A download whose hash does not match the manifest is discarded and
    /// reported as [`DownloadError::HashMismatch`]; it is not retried.
    pub async fn fetch_item(&self, item: &ItemRef) -> DownloadResult<Fetched> {
        let staged = self.store.layout().staging_item_path(item);
        let label = item.to_string();

        let result = self
            .with_retry(&label, || self.attempt_item(item, &staged))
            .await;
        if result.is_err() {
            discard(&staged).await;
        }
        result
    }

    async fn attempt_item(&self, item: &ItemRef, staged: &Path) -> DownloadResult<Fetched> {
        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!("Fetching {} from {}", item, item.remote_path());
        self.remote
            .download(&item.remote_path(), staged, false, None)
            .await?;

        if self.verify_downloads {
            if let Some(expected) = &item.expected_hash {
                let digest = self
                    .store
                    .verifier()
                    .calculate_file_hash(staged)
                    .await
                    .map_err(|e| {
                        DownloadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
                    })?;
                if !digest.matches(expected) {
                    return Err(DownloadError::HashMismatch {
                        name: item.to_string(),
                        expected: expected.to_string(),
                        actual: digest.to_hex(),
                    });
                }
            }
        }

        let bytes = tokio::fs::metadata(staged).await?.len();
        Ok(Fetched::Item {
            item: item.clone(),
            staged: staged.to_path_buf(),
            bytes,
        })
    }

    /// Download a category archive on a background transfer
    ///
    /// A partial archive left by an interrupted run is resumed.
    pub async fn fetch_archive(
        &self,
        category: Category,
        progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<Fetched> {
        let archive = category
            .archive_name()
            .ok_or_else(|| DownloadError::NotFound {
                url: format!("{} archive", category),
            })?;
        let staged = self.store.layout().staging_archive_path(archive);
        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let meta = self
            .with_retry(archive, || {
                BackgroundTransfer::start(self.remote.clone(), archive, staged.clone(), true)
                    .wait(progress)
            })
            .await?;

        let bytes = tokio::fs::metadata(&staged).await?.len();
        if let Some(expected) = meta.content_length {
            if bytes != expected {
                return Err(DownloadError::IncompleteDownload {
                    received: bytes,
                    expected,
                });
            }
        }

        Ok(Fetched::Archive {
            category,
            staged,
            etag: meta.etag,
            bytes,
        })
    }

    async fn with_retry<T, F, Fut>(&self, label: &str, mut attempt: F) -> DownloadResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DownloadResult<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && self.retry.allows(retries) => {
                    let delay = self.retry.delay_for(retries);
                    retries += 1;
                    warn!(
                        "Fetching {} failed ({}), retry {}/{} in {:?}",
                        label, e, retries, self.retry.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() && retries > 0 => {
                    return Err(DownloadError::MaxRetriesExceeded {
                        max_retries: retries,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn discard(staged: &Path) {
    match tokio::fs::remove_file(staged).await {
        Ok(()) => debug!("Discarded {}", staged.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not discard {}: {}", staged.display(), e),
    }
}
