//! Access to the asset origin
//!
//! The sync engine talks to the origin only through the [`RemoteStore`] trait.
//! Two implementations are provided:
//! - [`AssetClient`]: HTTP(S) origin with rate limiting, request-level backoff,
//!   streamed downloads and `Range` resume
//! - [`DirectoryRemote`]: a local directory serving the same layout
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: Core HTTP operations with resilience patterns
//! - `download`: Streamed downloads with resume
//! - `mirror`: Local directory remote
//! - `partial`: Entity tags of resumable partial downloads

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::errors::{DownloadError, DownloadResult};

pub mod config;
pub mod download;
pub mod http;
pub mod mirror;
pub mod partial;

pub use config::ClientConfig;
pub use mirror::DirectoryRemote;

use download::DownloadHandler;
use http::HttpHandler;

/// Metadata the origin reports for a resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMeta {
    /// Opaque entity tag (`ETag` header)
    pub etag: Option<String>,
    /// Size of the resource in bytes
    pub content_length: Option<u64>,
}

/// Byte progress of a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub written: u64,
    pub expected: Option<u64>,
}

/// Read-only view of the asset origin
///
/// Paths are relative to the origin base (`all_songs.txt`, `data/aaa.json`,
/// `data.zip`).
#[async_trait]
pub trait RemoteStore: Send + Sync + Debug {
    /// Human-readable origin description for logs
    fn describe(&self) -> String;

    /// Fetch a small text resource (manifests)
    async fn fetch_text(&self, path: &str) -> DownloadResult<String>;

    /// Entity tag and length of a resource without fetching its body
    async fn head(&self, path: &str) -> DownloadResult<RemoteMeta>;

    /// Stream a resource into `destination`, optionally resuming a partial file
    ///
    /// A partial is resumed only when its recorded entity tag (see
    /// [`partial`]) still matches the resource; otherwise it is replaced.
    async fn download(
        &self,
        path: &str,
        destination: &Path,
        resume: bool,
        progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<RemoteMeta>;
}

/// HTTP client for the asset origin
///
/// Handles rate limiting, throttling backoff and streamed downloads.
#[derive(Debug)]
pub struct AssetClient {
    http_handler: HttpHandler,
    base_url: Url,
}

impl AssetClient {
    /// Creates a client for the configured base URL
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the base URL is invalid or the HTTP client
    /// cannot be built
    pub fn new(config: &ClientConfig) -> DownloadResult<Self> {
        let base_url = parse_base_url(&config.base_url)?;
        let http_handler = HttpHandler::new(config)?;

        tracing::info!("Created asset client for {}", base_url);

        Ok(Self {
            http_handler,
            base_url,
        })
    }

    /// Get the origin base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path relative to the base URL
    pub fn url_for(&self, path: &str) -> DownloadResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| DownloadError::InvalidUrl {
                url: format!("{}{}", self.base_url, path),
                error: e.to_string(),
            })
    }
}

#[async_trait]
impl RemoteStore for AssetClient {
    fn describe(&self) -> String {
        self.base_url.to_string()
    }

    async fn fetch_text(&self, path: &str) -> DownloadResult<String> {
        let url = self.url_for(path)?;
        self.http_handler.get_text(&url).await
    }

    async fn head(&self, path: &str) -> DownloadResult<RemoteMeta> {
        let url = self.url_for(path)?;
        DownloadHandler::new(&self.http_handler).head(&url).await
    }

    async fn download(
        &self,
        path: &str,
        destination: &Path,
        resume: bool,
        progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<RemoteMeta> {
        let url = self.url_for(path)?;
        DownloadHandler::new(&self.http_handler)
            .download_to(&url, destination, resume, progress)
            .await
    }
}

/// Parse a base URL, making sure it ends with a slash so joins stay below it
fn parse_base_url(raw: &str) -> DownloadResult<Url> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized).map_err(|e| DownloadError::InvalidUrl {
        url: raw.to_string(),
        error: e.to_string(),
    })
}

/// Build the remote selected by the configuration
///
/// `http://` and `https://` base URLs give an [`AssetClient`]; anything else is
/// treated as a local mirror directory.
pub fn connect_remote(config: &ClientConfig) -> DownloadResult<Arc<dyn RemoteStore>> {
    if config.is_local_mirror() {
        let mirror = DirectoryRemote::from_location(&config.base_url)?;
        tracing::info!("Using local mirror at {}", mirror.root().display());
        Ok(Arc::new(mirror))
    } else {
        Ok(Arc::new(AssetClient::new(config)?))
    }
}
