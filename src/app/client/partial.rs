//! Bookkeeping for resumable partial downloads
//!
//! A partial file is only resumed when the entity tag of the response that
//! produced it is known and the origin still reports that tag. The tag lives in
//! a sidecar next to the partial (`data.zip.part` -> `data.zip.part.etag`) and
//! is written before the first body byte, so an interrupted transfer always
//! leaves a partial that can be validated.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::DownloadResult;

/// Sidecar path holding the entity tag of a partial download
pub fn tag_path(partial: &Path) -> PathBuf {
    let mut name = OsString::from(partial.as_os_str());
    name.push(".etag");
    PathBuf::from(name)
}

/// Length of a partial download and the tag it was fetched under
///
/// A partial without a recorded tag cannot be validated against the origin
/// and is removed.
pub async fn resumable(partial: &Path) -> DownloadResult<Option<(u64, String)>> {
    let len = match tokio::fs::metadata(partial).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return Ok(None),
    };

    let tag = match tokio::fs::read_to_string(tag_path(partial)).await {
        Ok(tag) if !tag.trim().is_empty() => Some(tag.trim().to_string()),
        _ => None,
    };

    match tag {
        Some(tag) if len > 0 => Ok(Some((len, tag))),
        _ => {
            debug!("Discarding unverifiable partial {}", partial.display());
            discard(partial).await?;
            Ok(None)
        }
    }
}

/// Record the tag of the response now being written to `partial`
///
/// Without a tag the partial can never be resumed, so any stale sidecar is
/// removed instead.
pub async fn record_tag(partial: &Path, etag: Option<&str>) -> DownloadResult<()> {
    let sidecar = tag_path(partial);
    match etag {
        Some(tag) => tokio::fs::write(&sidecar, tag).await?,
        None => remove_if_present(&sidecar).await?,
    }
    Ok(())
}

/// Remove a partial download and its sidecar
pub async fn discard(partial: &Path) -> DownloadResult<()> {
    remove_if_present(partial).await?;
    remove_if_present(&tag_path(partial)).await
}

async fn remove_if_present(path: &Path) -> DownloadResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
