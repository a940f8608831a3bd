//! Local directory mirror of the asset origin
//!
//! Serves the same layout as the HTTP origin from a directory on disk. Useful
//! for offline installs and for exercising the sync engine without a network.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use super::{partial, RemoteMeta, RemoteStore, TransferProgress};
use crate::constants::files::HASH_CHUNK_SIZE;
use crate::errors::{DownloadError, DownloadResult};

/// Remote store backed by a local directory
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build from a `file://` URL or a plain path
    pub fn from_location(location: &str) -> DownloadResult<Self> {
        let location = location.trim();
        if location.starts_with("file:") {
            let url = url::Url::parse(location).map_err(|e| DownloadError::InvalidUrl {
                url: location.to_string(),
                error: e.to_string(),
            })?;
            let path = url.to_file_path().map_err(|_| DownloadError::InvalidUrl {
                url: location.to_string(),
                error: "not a local file path".to_string(),
            })?;
            Ok(Self::new(path))
        } else {
            Ok(Self::new(location))
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn map_io(&self, path: &str, e: std::io::Error) -> DownloadError {
        match e.kind() {
            std::io::ErrorKind::NotFound => DownloadError::NotFound {
                url: self.resolve(path).display().to_string(),
            },
            std::io::ErrorKind::PermissionDenied => DownloadError::Forbidden {
                url: self.resolve(path).display().to_string(),
            },
            _ => DownloadError::Io(e),
        }
    }

    async fn meta(&self, path: &str) -> DownloadResult<RemoteMeta> {
        let metadata = tokio::fs::metadata(self.resolve(path))
            .await
            .map_err(|e| self.map_io(path, e))?;
        if !metadata.is_file() {
            return Err(DownloadError::NotFound {
                url: self.resolve(path).display().to_string(),
            });
        }
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(RemoteMeta {
            etag: Some(format!("\"{:x}-{:x}\"", metadata.len(), modified)),
            content_length: Some(metadata.len()),
        })
    }
}

#[async_trait]
impl RemoteStore for DirectoryRemote {
    fn describe(&self) -> String {
        format!("mirror {}", self.root.display())
    }

    async fn fetch_text(&self, path: &str) -> DownloadResult<String> {
        tokio::fs::read_to_string(self.resolve(path))
            .await
            .map_err(|e| self.map_io(path, e))
    }

    async fn head(&self, path: &str) -> DownloadResult<RemoteMeta> {
        self.meta(path).await
    }

    async fn download(
        &self,
        path: &str,
        destination: &Path,
        resume: bool,
        progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<RemoteMeta> {
        let meta = self.meta(path).await?;
        let total = meta.content_length.unwrap_or(0);

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let existing = if resume {
            let current = meta.etag.as_deref();
            let existing = match partial::resumable(destination).await? {
                Some((len, tag)) if Some(tag.as_str()) == current && len <= total => len,
                Some(_) => {
                    debug!("Partial {} is from another version", destination.display());
                    0
                }
                None => 0,
            };
            partial::record_tag(destination, current).await?;
            existing
        } else {
            0
        };

        let mut source = File::open(self.resolve(path))
            .await
            .map_err(|e| self.map_io(path, e))?;
        let mut target = if existing > 0 {
            source.seek(std::io::SeekFrom::Start(existing)).await?;
            OpenOptions::new().append(true).open(destination).await?
        } else {
            File::create(destination).await?
        };

        let mut written = existing;
        let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
        loop {
            let read = source.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            target.write_all(&buffer[..read]).await?;
            written += read as u64;
            if let Some(tx) = progress {
                let _ = tx.send(TransferProgress {
                    written,
                    expected: Some(total),
                });
            }
        }
        target.flush().await?;

        Ok(meta)
    }
}
