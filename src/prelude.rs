//! Prelude module for BPM Assets Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use bpm_assets::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use bpm_assets::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let store = Arc::new(ContentStore::new(StoreConfig::default()).await?);
//!     let remote = connect_remote(&ClientConfig::default())?;
//!     let orchestrator = Orchestrator::new(SyncConfig::default(), store, remote)
//!         .with_catalog(Arc::new(StoreCatalog::new()));
//!
//!     orchestrator.check(Lane::Update).await?;
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Essential app components that are used in most integrations
pub use crate::app::{
    // Origin access
    connect_remote,
    ClientConfig,
    RemoteStore,

    // Content store
    ContentStore,
    StoreConfig,
    StoreCatalog,

    // Core orchestration
    Lane,
    Orchestrator,
    SyncConfig,
    SyncSnapshot,
    SyncStatus,
    TransferStrategy,

    // Data types
    Category,
    HashAlgorithm,
    ItemRef,
};

// Commonly used constants
pub use crate::constants::{DEFAULT_BASE_URL, DEFAULT_CONCURRENCY, USER_AGENT};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
