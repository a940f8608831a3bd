//! Catalog reload after a successful sync
//!
//! The sync engine does not interpret song records. After content changes it
//! hands the store to a [`CatalogReloader`], which rebuilds whatever in-memory
//! view its consumers need. [`StoreCatalog`] is the default implementation: it
//! parses every song record and the course list and keeps a summary.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::app::models::Category;
use crate::app::store::ContentStore;
use crate::errors::{StoreError, StoreResult};

/// Consumer notified after content changed
#[async_trait]
pub trait CatalogReloader: Send + Sync + Debug {
    /// Re-read the content store
    async fn reload(&self, store: &ContentStore) -> StoreResult<CatalogSummary>;
}

/// What a reload found in the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    /// Song records that parsed as JSON
    pub songs: usize,
    /// Song records that could not be read or parsed
    pub unreadable: Vec<String>,
    /// Jacket images present
    pub jackets: usize,
    /// Entries in the course list (0 when absent)
    pub courses: usize,
}

/// Catalog view backed by the content store
#[derive(Debug, Default)]
pub struct StoreCatalog {
    latest: RwLock<Option<CatalogSummary>>,
}

impl StoreCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of the last successful reload
    pub async fn latest(&self) -> Option<CatalogSummary> {
        self.latest.read().await.clone()
    }

    /// Parse every song record and the course list
    pub async fn load(store: &ContentStore) -> StoreResult<CatalogSummary> {
        let mut summary = CatalogSummary::default();

        for name in store.list_items(Category::Songs).await? {
            let parsed = match store.read_item(Category::Songs, &name).await {
                Ok(bytes) => serde_json::from_slice::<serde_json::Value>(&bytes)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(_) => summary.songs += 1,
                Err(reason) => {
                    warn!("Skipping unreadable song record {}: {}", name, reason);
                    summary.unreadable.push(name);
                }
            }
        }

        summary.jackets = store.list_items(Category::Jackets).await?.len();

        let courses_file = store.layout().courses_file();
        match tokio::fs::read(&courses_file).await {
            Ok(bytes) => {
                let courses: Vec<serde_json::Value> =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::InvalidRecord {
                        path: courses_file.clone(),
                        reason: e.to_string(),
                    })?;
                summary.courses = courses.len();
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(courses_file, e)),
        }

        Ok(summary)
    }
}

#[async_trait]
impl CatalogReloader for StoreCatalog {
    async fn reload(&self, store: &ContentStore) -> StoreResult<CatalogSummary> {
        let summary = Self::load(store).await?;
        info!(
            "Catalog reloaded: {} songs, {} jackets, {} courses",
            summary.songs, summary.jackets, summary.courses
        );
        *self.latest.write().await = Some(summary.clone());
        Ok(summary)
    }
}
