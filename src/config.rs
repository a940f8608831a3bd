//! Configuration management for BPM Assets
//!
//! This module provides unified configuration management with automatic
//! first-run initialization, multi-source loading, and zero-config defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{
    ClientConfig, HashAlgorithm, RetryPolicy, StoreConfig, SyncConfig, TransferStrategy,
};
use crate::constants::{http, layout, limits, logging, remote, sync};
use crate::errors::{AppError, ConfigError, Result};

/// Environment variable overriding the origin base URL
pub const ENV_BASE_URL: &str = "BPM_ASSETS_BASE_URL";

/// Environment variable overriding the data root
pub const ENV_DATA_ROOT: &str = "BPM_ASSETS_DATA_ROOT";

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Content store settings
    pub store: StoreConfigToml,
    /// Origin client settings
    pub client: ClientConfigToml,
    /// Check/apply settings
    pub sync: SyncConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly content store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfigToml {
    /// Data directory path
    pub data_root: Option<PathBuf>,
    /// Local digest algorithm ("sha1" or "md5")
    pub hash_algorithm: HashAlgorithm,
    /// Keep staged archives after extraction
    pub keep_archives: bool,
}

impl Default for StoreConfigToml {
    fn default() -> Self {
        Self {
            data_root: None,
            hash_algorithm: HashAlgorithm::default(),
            keep_archives: false,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// Origin base URL or local mirror directory
    pub base_url: String,
    /// Enable HTTP/2 support
    pub http2: bool,
    /// TCP keep-alive timeout in seconds (None = disabled)
    pub tcp_keepalive_secs: Option<u64>,
    /// TCP nodelay setting
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout in seconds (None = no timeout)
    pub pool_idle_timeout_secs: Option<u64>,
    /// Maximum connections per host
    pub pool_max_per_host: usize,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Request-level retries for throttled or failed requests
    pub max_retries: u32,
    /// Request-level backoff base delay in milliseconds
    pub retry_base_delay_ms: u64,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            base_url: remote::DEFAULT_BASE_URL.to_string(),
            http2: false,
            tcp_keepalive_secs: Some(30),
            tcp_nodelay: true,
            pool_idle_timeout_secs: Some(http::POOL_IDLE_TIMEOUT.as_secs()),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay_ms: limits::RETRY_BASE_DELAY_MS,
        }
    }
}

/// TOML-friendly sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfigToml {
    /// Concurrent per-item fetches
    pub concurrency: usize,
    /// "per_item" or "archive"
    pub strategy: TransferStrategy,
    /// Abort a category after a permanent client error
    pub abort_category_on_client_error: bool,
    /// Verify item downloads against manifest hashes
    pub verify_downloads: bool,
    /// Unit-level retry attempts
    pub max_retries: u32,
    /// Unit-level retry base delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// Unit-level retry delay ceiling in milliseconds
    pub retry_max_delay_ms: u64,
    /// Days between suggested update checks
    pub update_interval_days: u64,
}

impl Default for SyncConfigToml {
    fn default() -> Self {
        Self {
            concurrency: sync::DEFAULT_CONCURRENCY,
            strategy: TransferStrategy::default(),
            abort_category_on_client_error: true,
            verify_downloads: true,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay_ms: limits::RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: limits::RETRY_MAX_DELAY_MS,
            update_interval_days: sync::UPDATE_CHECK_INTERVAL.as_secs() / 86_400,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
            colored_output: true,
        }
    }
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> Result<(StoreConfig, ClientConfig, SyncConfig)> {
        let sync = self.sync.to_runtime_config();
        sync.validate().map_err(|reason| ConfigError::InvalidValue {
            field: "sync".to_string(),
            value: format!("concurrency={}", self.sync.concurrency),
            reason,
        })?;

        Ok((
            self.store.to_runtime_config(),
            self.client.to_runtime_config(),
            sync,
        ))
    }

    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (if exists)
    /// 3. Environment variables
    pub async fn load(config_file_override: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::default();

        let config_path = match config_file_override {
            Some(ref path) => Some(path.clone()),
            None => Self::find_config_file().await?,
        };

        if let Some(path) = config_path {
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                config = Self::load_from_file(&path).await?;
            } else if config_file_override.is_some() {
                return Err(ConfigError::NotFound { path }.into());
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `BPM_ASSETS_*` overrides from the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            debug!("Base URL overridden from environment: {}", base_url);
            self.client.base_url = base_url;
        }

        if let Some(root) = lookup(ENV_DATA_ROOT).filter(|v| !v.trim().is_empty()) {
            debug!("Data root overridden from environment: {}", root);
            self.store.data_root = Some(PathBuf::from(root));
        }
    }

    /// Initialize configuration on first run
    ///
    /// Creates a default config file if none exists and notifies the user
    pub async fn initialize_first_run() -> Result<Option<PathBuf>> {
        let config_path = Self::get_default_config_path()?;

        if config_path.exists() {
            return Ok(Some(config_path));
        }

        info!("Creating default configuration file...");
        Self::write_default_config(&config_path).await?;

        println!("Created default configuration file:");
        println!("   {}", config_path.display());
        println!("   You can customize settings by editing this file.");
        println!();

        Ok(Some(config_path))
    }

    /// Write the commented default configuration to `path`
    pub async fn write_default_config(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::generic(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        tokio::fs::write(path, Self::generate_default_config_content())
            .await
            .map_err(|e| {
                AppError::generic(format!(
                    "Failed to write config file {}: {}",
                    path.display(),
                    e
                ))
            })
    }

    /// Find configuration file in standard locations
    async fn find_config_file() -> Result<Option<PathBuf>> {
        let search_paths = vec![
            PathBuf::from("./bpm-assets.toml"),
            Self::get_default_config_path()?,
        ];

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Ok(Some(path));
            }
        }

        debug!("No config file found in standard locations");
        Ok(None)
    }

    /// Get the default config file path for the current user
    pub fn get_default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::generic("Could not determine user config directory"))?;

        Ok(config_dir.join(layout::APP_DIR_NAME).join("config.toml"))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::generic(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::InvalidFormat)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Generate default configuration content with helpful comments
    fn generate_default_config_content() -> String {
        let default_data_path = dirs::data_dir()
            .map(|dir| dir.join(layout::APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("./bpm-data"));

        format!(
            r#"# BPM Assets Configuration
# This file was automatically generated on first run.
# You can customize any of these settings to suit your needs.

[store]
# Data directory (leave unset to use {data})
# data_root = "/path/to/custom/data"

# Local digest algorithm: "sha1" or "md5"
hash_algorithm = "sha1"

# Keep downloaded archives after extraction
keep_archives = false

[client]
# Origin serving manifests, items and archives (or a local mirror directory)
base_url = "{base_url}"
http2 = false
tcp_keepalive_secs = 30
tcp_nodelay = true
pool_idle_timeout_secs = {pool_idle}
pool_max_per_host = {pool_max}
request_timeout_secs = {request_timeout}
connect_timeout_secs = {connect_timeout}
rate_limit_rps = {rps}
max_retries = {retries}
retry_base_delay_ms = {base_delay}

[sync]
# Concurrent per-item downloads (1 = sequential)
concurrency = {concurrency}

# "per_item" fetches only changed items, "archive" replaces whole categories
strategy = "per_item"

# Stop a category after a permanent client error such as 404
abort_category_on_client_error = true

verify_downloads = true
max_retries = {retries}
retry_base_delay_ms = {base_delay}
retry_max_delay_ms = {max_delay}

# Days between suggested update checks
update_interval_days = {interval}

[logging]
level = "{level}"  # error, warn, info, debug, trace
colored_output = true
"#,
            data = default_data_path.display(),
            base_url = remote::DEFAULT_BASE_URL,
            pool_idle = http::POOL_IDLE_TIMEOUT.as_secs(),
            pool_max = http::POOL_MAX_PER_HOST,
            request_timeout = http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout = http::CONNECT_TIMEOUT.as_secs(),
            rps = limits::DEFAULT_RATE_LIMIT_RPS,
            retries = limits::MAX_RETRIES,
            base_delay = limits::RETRY_BASE_DELAY_MS,
            max_delay = limits::RETRY_MAX_DELAY_MS,
            concurrency = sync::DEFAULT_CONCURRENCY,
            interval = sync::UPDATE_CHECK_INTERVAL.as_secs() / 86_400,
            level = logging::DEFAULT_LOG_LEVEL,
        )
    }
}

impl StoreConfigToml {
    /// Convert to runtime StoreConfig
    pub fn to_runtime_config(&self) -> StoreConfig {
        StoreConfig {
            data_root: self.data_root.clone(),
            hash_algorithm: self.hash_algorithm,
            keep_archives: self.keep_archives,
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            http2: self.http2,
            tcp_keepalive: self.tcp_keepalive_secs.map(Duration::from_secs),
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: self.pool_idle_timeout_secs.map(Duration::from_secs),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            rate_limit_rps: self.rate_limit_rps,
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

impl SyncConfigToml {
    /// Convert to runtime SyncConfig
    pub fn to_runtime_config(&self) -> SyncConfig {
        SyncConfig {
            concurrency: self.concurrency,
            strategy: self.strategy,
            abort_category_on_client_error: self.abort_category_on_client_error,
            verify_downloads: self.verify_downloads,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
                multiplier: 2,
            },
            update_interval: Duration::from_secs(self.update_interval_days * 86_400),
        }
    }
}
