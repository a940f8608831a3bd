//! Manifest retrieval and parsing
//!
//! The origin publishes, per enumerable category, an ordered list of item names
//! and a parallel list of their hashes, plus a single hash for the course list.
//! [`ManifestFetcher`] retrieves these and turns them into [`Manifest`] values
//! for the diff engine.
//!
//! # Module Organization
//!
//! - [`types`] - Manifest, entries and fetch statistics
//! - [`parse`] - Line splitting and list pairing
//! - `tests` - Fetcher tests against a local mirror

use std::sync::Arc;

use tracing::{debug, info};

use crate::app::client::RemoteStore;
use crate::app::hash::ManifestHash;
use crate::app::models::Category;
use crate::constants::remote;
use crate::errors::{ManifestError, ManifestResult};

pub mod parse;
pub mod types;

#[cfg(test)]
mod tests;

pub use parse::{manifest_from_lists, parse_course_hash, parse_lines};
pub use types::{Manifest, ManifestEntry, ManifestStats, RemoteSnapshot};

/// Fetches and parses manifests from the origin
#[derive(Debug, Clone)]
pub struct ManifestFetcher {
    remote: Arc<dyn RemoteStore>,
}

impl ManifestFetcher {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    async fn fetch_file(&self, file: &str) -> ManifestResult<String> {
        self.remote
            .fetch_text(file)
            .await
            .map_err(|source| ManifestError::Network {
                file: file.to_string(),
                source,
            })
    }

    /// Fetch the names and hashes lists of a category concurrently and pair them
    pub async fn fetch_manifest(&self, category: Category) -> ManifestResult<Manifest> {
        if !category.is_enumerable() {
            return Err(ManifestError::InvalidFormat {
                file: category.hashes_manifest(),
                line: 0,
                content: format!("{} has no item list", category),
            });
        }

        let names_file = category.names_manifest();
        let hashes_file = category.hashes_manifest();
        debug!("Fetching {} and {}", names_file, hashes_file);

        let (names, hashes) =
            tokio::try_join!(self.fetch_file(&names_file), self.fetch_file(&hashes_file))?;

        let (manifest, stats) = manifest_from_lists(category, &names, &hashes)?;
        debug!("{} manifest stats: {:?}", category, stats);
        Ok(manifest)
    }

    /// Fetch the hash of the remote course list
    pub async fn fetch_course_hash(&self) -> ManifestResult<ManifestHash> {
        let text = self.fetch_file(remote::COURSES_HASH_FILE).await?;
        parse_course_hash(&text, remote::COURSES_HASH_FILE)
    }

    /// Fetch everything a per-item check needs in one go
    pub async fn fetch_snapshot(&self) -> ManifestResult<RemoteSnapshot> {
        let (songs, jackets, course_hash) = tokio::try_join!(
            self.fetch_manifest(Category::Songs),
            self.fetch_manifest(Category::Jackets),
            self.fetch_course_hash()
        )?;

        info!(
            "Remote manifests from {}: {} songs, {} jackets",
            self.remote.describe(),
            songs.len(),
            jackets.len()
        );

        Ok(RemoteSnapshot {
            songs,
            jackets,
            course_hash,
        })
    }
}
