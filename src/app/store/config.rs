//! Content store configuration types and defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::hash::HashAlgorithm;

/// Configuration for the on-disk content store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for content (OS-specific data directory if None)
    pub data_root: Option<PathBuf>,
    /// Digest algorithm used for local files
    pub hash_algorithm: HashAlgorithm,
    /// Keep the staged archive after a successful extraction
    pub keep_archives: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_root: None,
            hash_algorithm: HashAlgorithm::default(),
            keep_archives: false,
        }
    }
}

impl StoreConfig {
    /// Create a store configuration rooted at a custom directory
    pub fn with_data_root(data_root: PathBuf) -> Self {
        Self {
            data_root: Some(data_root),
            ..Default::default()
        }
    }

    /// Set the digest algorithm
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Keep or discard staged archives after extraction
    pub fn with_keep_archives(mut self, keep: bool) -> Self {
        self.keep_archives = keep;
        self
    }
}
