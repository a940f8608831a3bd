//! On-device content store
//!
//! The store keeps one file per song record and per jacket image, the course
//! list, a staging area for in-flight downloads and the persisted sync settings.
//! Content is only ever changed by an atomic rename out of staging, an archive
//! replace, a delete, a bundle seed or a reset.
//!
//! # Module Organization
//!
//! - [`config`] - Configuration types and defaults
//! - [`layout`] - Path generation for items, staging and settings
//! - [`manager`] - Core store with atomic placement and archive replace
//! - [`settings`] - Persisted entity tags and update timestamps
//! - [`stats`] - Counts, disk usage and byte formatting
//! - [`verification`] - Integrity reports against a manifest
//!
//! # Examples
//!
//! ```rust,no_run
//! use bpm_assets::app::models::Category;
//! use bpm_assets::app::store::{ContentStore, StoreConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ContentStore::new(StoreConfig::with_data_root(PathBuf::from("./data"))).await?;
//! for name in store.list_items(Category::Songs).await? {
//!     println!("{}", name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod layout;
pub mod manager;
pub mod settings;
pub mod stats;
pub mod verification;

#[cfg(test)]
mod tests;

pub use config::StoreConfig;
pub use layout::StoreLayout;
pub use manager::ContentStore;
pub use settings::Settings;
pub use stats::{format_bytes, StoreStats};
pub use verification::{VerificationFailure, VerificationReport};
