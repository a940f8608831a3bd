//! Three-way diff between a remote manifest and local content
//!
//! For one category the engine yields the items that must be fetched (absent,
//! or present with a stale hash when hashes are checked) and the local items no
//! longer published (obsolete). Local state is read through [`LocalInventory`].

use std::collections::HashSet;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::app::hash::ManifestHash;
use crate::app::manifest::Manifest;
use crate::app::models::{Category, ItemRef};
use crate::errors::{HashError, HashResult, StoreResult};

/// Concurrent local hash computations during a hash-checked diff
const HASH_CONCURRENCY: usize = 8;

/// Read access to local content needed to compute a diff
#[async_trait]
pub trait LocalInventory: Send + Sync {
    /// Whether an item is present
    async fn contains(&self, category: Category, name: &str) -> bool;

    /// Lowercase hex digest of an item
    async fn item_hash(&self, category: Category, name: &str) -> HashResult<String>;

    /// Names of all items of an enumerable category, sorted
    async fn list_items(&self, category: Category) -> StoreResult<Vec<String>>;

    /// Lowercase hex digest of the course list
    async fn course_list_hash(&self) -> HashResult<String>;
}

/// Archive download replacing a whole category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRefresh {
    /// Entity tag the origin reported when the plan was made
    pub remote_etag: Option<String>,
}

/// Pending work for one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPlan {
    pub category: Category,
    /// Items to fetch, in manifest order
    pub missing: Vec<ItemRef>,
    /// Local item names absent from the manifest, sorted
    pub obsolete: Vec<String>,
    /// Replace the category wholesale from its archive instead of per item
    pub archive: Option<ArchiveRefresh>,
}

impl CategoryPlan {
    pub fn empty(category: Category) -> Self {
        Self {
            category,
            missing: Vec::new(),
            obsolete: Vec::new(),
            archive: None,
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.missing.is_empty() || !self.obsolete.is_empty() || self.archive.is_some()
    }

    pub fn missing_names(&self) -> Vec<&str> {
        self.missing.iter().map(|i| i.name.as_str()).collect()
    }
}

/// Compare a manifest with local content
///
/// With `check_hashes` false only existence is checked (update lane). With it
/// true every present item is hashed (fix lane); an item that cannot be hashed
/// is treated as missing so it gets repaired.
pub async fn compute_diff(
    manifest: &Manifest,
    local: &dyn LocalInventory,
    check_hashes: bool,
) -> StoreResult<CategoryPlan> {
    let category = manifest.category();

    // Owned entries keep the future `Send` for a spawned orchestrator run
    let statuses: Vec<bool> = stream::iter(manifest.entries().to_vec())
        .map(move |entry| async move {
            if !local.contains(category, &entry.name).await {
                return true;
            }
            if !check_hashes {
                return false;
            }
            match local.item_hash(category, &entry.name).await {
                Ok(actual) => {
                    let stale = ManifestHash::new(&actual) != entry.hash;
                    if stale {
                        debug!(
                            "{}/{} is stale: local {} remote {}",
                            category, entry.name, actual, entry.hash
                        );
                    }
                    stale
                }
                Err(e) => {
                    log_hash_failure(category, &entry.name, &e);
                    true
                }
            }
        })
        .buffered(HASH_CONCURRENCY)
        .collect()
        .await;

    let missing: Vec<ItemRef> = manifest
        .items()
        .zip(statuses)
        .filter_map(|(item, is_missing)| is_missing.then_some(item))
        .collect();

    let remote_names: HashSet<&str> = manifest.entries().iter().map(|e| e.name.as_str()).collect();
    let mut obsolete: Vec<String> = local
        .list_items(category)
        .await?
        .into_iter()
        .filter(|name| !remote_names.contains(name.as_str()))
        .collect();
    obsolete.sort();

    debug!(
        "{} diff: {} missing, {} obsolete (hash check: {})",
        category,
        missing.len(),
        obsolete.len(),
        check_hashes
    );

    Ok(CategoryPlan {
        category,
        missing,
        obsolete,
        archive: None,
    })
}

/// Whether the local course list differs from the remote hash
///
/// A missing or unreadable local course list counts as changed.
pub async fn course_list_changed(remote_hash: &ManifestHash, local: &dyn LocalInventory) -> bool {
    match local.course_list_hash().await {
        Ok(actual) => ManifestHash::new(&actual) != *remote_hash,
        Err(e) => {
            log_hash_failure(Category::CourseList, "courses", &e);
            true
        }
    }
}

fn log_hash_failure(category: Category, name: &str, error: &HashError) {
    match error {
        HashError::FileNotFound { .. } => debug!("{}/{} vanished while hashing", category, name),
        HashError::ReadFailed { .. } => {
            warn!("{}/{} unreadable, scheduling repair: {}", category, name, error)
        }
    }
}
