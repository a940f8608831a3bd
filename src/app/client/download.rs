//! Streamed downloads with resume support
//!
//! Bodies are streamed chunk by chunk into the destination file. When resuming,
//! an HTTP `Range` request guarded by `If-Range` continues from the bytes
//! already on disk. A changed resource or a server that ignores the range (200)
//! and a rejected range (416) both cause a restart from zero.

use std::path::Path;

use reqwest::header::{CONTENT_LENGTH, ETAG};
use reqwest::{Method, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use url::Url;

use super::http::{ensure_success, ByteRange, HttpHandler};
use super::partial;
use super::{RemoteMeta, TransferProgress};
use crate::errors::{DownloadError, DownloadResult};

/// File download operations handler
pub struct DownloadHandler<'a> {
    http_handler: &'a HttpHandler,
}

impl<'a> DownloadHandler<'a> {
    /// Creates a new DownloadHandler with the given HTTP handler
    pub fn new(http_handler: &'a HttpHandler) -> Self {
        Self { http_handler }
    }

    /// Downloads `url` into `destination`
    ///
    /// The destination is written in place; callers point it at a staging path
    /// and move the file once it is complete. With `resume`, the entity tag of
    /// the response is kept next to the destination for a later resume.
    pub async fn download_to(
        &self,
        url: &Url,
        destination: &Path,
        resume: bool,
        progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    ) -> DownloadResult<RemoteMeta> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = if resume {
            partial::resumable(destination).await?
        } else {
            None
        };

        let range = partial.as_ref().map(|(start, tag)| ByteRange {
            start: *start,
            if_range: tag.as_str(),
        });
        let mut offset = range.map(|r| r.start).unwrap_or(0);
        let mut response = self.http_handler.send(Method::GET, url, range).await?;

        if offset > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            tracing::debug!("Range rejected for {}, restarting from zero", url);
            offset = 0;
            response = self.http_handler.send(Method::GET, url, None).await?;
        }

        let mut response = ensure_success(response, url)?;

        let append = offset > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
        if offset > 0 && !append {
            tracing::debug!("Range not honoured for {}, restarting from zero", url);
            offset = 0;
        }

        let body_len = header_u64(&response, CONTENT_LENGTH.as_str());
        let expected = body_len.map(|len| len + offset);
        let etag = header_string(&response, ETAG.as_str());
        if resume {
            partial::record_tag(destination, etag.as_deref()).await?;
        }

        let mut file = if append {
            OpenOptions::new().append(true).open(destination).await?
        } else {
            File::create(destination).await?
        };

        let mut written = offset;
        report(progress, written, expected);
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            report(progress, written, expected);
        }
        file.flush().await?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(DownloadError::IncompleteDownload {
                    received: written,
                    expected,
                });
            }
        }

        tracing::debug!(
            "Downloaded {} ({} bytes{})",
            url,
            written,
            if append { ", resumed" } else { "" }
        );

        Ok(RemoteMeta {
            etag,
            content_length: Some(written),
        })
    }

    /// Reads entity tag and length from a HEAD response
    pub async fn head(&self, url: &Url) -> DownloadResult<RemoteMeta> {
        let response = self.http_handler.head(url).await?;
        Ok(RemoteMeta {
            etag: header_string(&response, ETAG.as_str()),
            content_length: header_u64(&response, CONTENT_LENGTH.as_str()),
        })
    }
}

fn report(
    progress: Option<&mpsc::UnboundedSender<TransferProgress>>,
    written: u64,
    expected: Option<u64>,
) {
    if let Some(tx) = progress {
        // The receiver may already be gone when the run was cancelled
        let _ = tx.send(TransferProgress { written, expected });
    }
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn header_u64(response: &reqwest::Response, name: &str) -> Option<u64> {
    header_string(response, name).and_then(|s| s.trim().parse().ok())
}
