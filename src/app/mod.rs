//! Core application logic for BPM Assets
//!
//! This module contains the sync engine: the content store, the origin client,
//! manifest parsing, hashing, the diff engine, the fetch executor and the
//! orchestrator driving them.
//!
//! # Examples
//!
//! ```rust,no_run
//! use bpm_assets::app::{
//!     compute_diff, connect_remote, Category, ClientConfig, ContentStore, ManifestFetcher,
//!     StoreConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ContentStore::new(StoreConfig::default()).await?;
//! let fetcher = ManifestFetcher::new(connect_remote(&ClientConfig::default())?);
//!
//! let manifest = fetcher.fetch_manifest(Category::Songs).await?;
//! let plan = compute_diff(&manifest, &store, false).await?;
//! println!("{} songs missing, {} obsolete", plan.missing.len(), plan.obsolete.len());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod client;
pub mod diff;
pub mod fetch;
pub mod hash;
pub mod manifest;
pub mod models;
pub mod orchestrator;
pub mod store;

// Re-export main public API
pub use catalog::{CatalogReloader, CatalogSummary, StoreCatalog};
pub use client::{
    connect_remote, AssetClient, ClientConfig, DirectoryRemote, RemoteMeta, RemoteStore,
    TransferProgress,
};
pub use diff::{compute_diff, course_list_changed, ArchiveRefresh, CategoryPlan, LocalInventory};
pub use fetch::{BackgroundTransfer, FetchExecutor, FetchUnit, Fetched, RetryPolicy};
pub use hash::{ContentDigest, HashAlgorithm, HashVerifier, ManifestHash};
pub use manifest::{Manifest, ManifestEntry, ManifestFetcher, RemoteSnapshot};
pub use models::{Category, ItemRef};
pub use orchestrator::{
    ApplyOutcome, ApplyStats, Lane, Orchestrator, SignalHandler, SyncConfig, SyncPlan,
    SyncSnapshot, SyncStatus, TransferStrategy,
};
pub use store::{
    format_bytes, ContentStore, Settings, StoreConfig, StoreStats, VerificationReport,
};
