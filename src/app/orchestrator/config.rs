//! Configuration for the sync orchestrator

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::fetch::RetryPolicy;
use crate::constants::sync;

use super::plan::TransferStrategy;

/// Configuration for check and apply runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Concurrent per-item fetches (1 = sequential)
    pub concurrency: usize,
    /// Transfer strategy used by checks
    pub strategy: TransferStrategy,
    /// Stop fetching a category after a permanent client error (404, 403, ...)
    pub abort_category_on_client_error: bool,
    /// Verify fresh item downloads against the manifest hash
    pub verify_downloads: bool,
    /// Retry policy for single units
    pub retry: RetryPolicy,
    /// Interval after which an update check is suggested
    pub update_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: sync::DEFAULT_CONCURRENCY,
            strategy: TransferStrategy::default(),
            abort_category_on_client_error: true,
            verify_downloads: true,
            retry: RetryPolicy::default(),
            update_interval: sync::UPDATE_CHECK_INTERVAL,
        }
    }
}

impl SyncConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_strategy(mut self, strategy: TransferStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_abort_category_on_client_error(mut self, abort: bool) -> Self {
        self.abort_category_on_client_error = abort;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.concurrency > sync::MAX_CONCURRENCY {
            return Err(format!(
                "Concurrency cannot exceed {}",
                sync::MAX_CONCURRENCY
            ));
        }

        if self.update_interval.is_zero() {
            return Err("Update interval cannot be zero".to_string());
        }

        Ok(())
    }
}
