//! Error types for BPM Assets
//!
//! This module defines the error types for all components of the sync engine.
//! Errors are designed to be actionable and provide clear context for debugging and
//! user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Download and transport errors
///
/// Every variant is a "network error" from the point of view of the sync
/// engine: the affected item (or archive) could not be obtained.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failure not surfaced as an HTTP error
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    /// Download timeout
    #[error("Download timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Resource does not exist on the origin
    #[error("Not found: {url}")]
    NotFound { url: String },

    /// Access to the resource was refused
    #[error("Forbidden: {url}")]
    Forbidden { url: String },

    /// Server returned a non-success status
    #[error("Server responded with HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Server responded with HTTP 429")]
    RateLimitExceeded,

    /// Server overloaded
    #[error("Server overloaded. Server responded with HTTP 503")]
    ServerOverloaded,

    /// Downloaded content does not match the manifest
    #[error("File hash mismatch for {name}. Expected: {expected}, got: {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// Maximum retries exceeded
    #[error("Maximum retry attempts ({max_retries}) exceeded: {last_error}")]
    MaxRetriesExceeded { max_retries: u32, last_error: String },

    /// Incomplete download
    #[error("Incomplete download: received {received} bytes, expected {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },

    /// Background transfer ended without reporting a result
    #[error("Background transfer for {path} ended without a result")]
    TransferLost { path: String },

    /// The run was cancelled while the transfer was in flight
    #[error("Transfer cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Whether retrying the same request may succeed
    ///
    /// Transport failures, timeouts, throttling and server-side (5xx) errors are
    /// transient. Client errors (4xx other than 408/429), hash mismatches and
    /// local I/O failures are permanent for the current run.
    pub fn is_transient(&self) -> bool {
        match self {
            DownloadError::Http(e) => {
                if let Some(status) = e.status() {
                    is_transient_status(status.as_u16())
                } else {
                    true
                }
            }
            DownloadError::Transport { .. }
            | DownloadError::Timeout { .. }
            | DownloadError::RateLimitExceeded
            | DownloadError::ServerOverloaded
            | DownloadError::IncompleteDownload { .. }
            | DownloadError::TransferLost { .. } => true,
            DownloadError::Status { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }

    /// Whether the origin refused the request for good (a non-retryable 4xx)
    pub fn is_client_error(&self) -> bool {
        match self {
            DownloadError::NotFound { .. } | DownloadError::Forbidden { .. } => true,
            DownloadError::Status { status, .. } => {
                (400..500).contains(status) && !is_transient_status(*status)
            }
            _ => false,
        }
    }

    /// Map a non-success HTTP status into the matching error
    pub fn from_status(status: u16, url: impl Into<String>) -> Self {
        let url = url.into();
        match status {
            404 => DownloadError::NotFound { url },
            403 => DownloadError::Forbidden { url },
            429 => DownloadError::RateLimitExceeded,
            503 => DownloadError::ServerOverloaded,
            status => DownloadError::Status { status, url },
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// Manifest retrieval and parsing errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest could not be fetched
    #[error("Failed to fetch manifest {file}: {source}")]
    Network {
        file: String,
        #[source]
        source: DownloadError,
    },

    /// Names and hashes lists disagree in length
    #[error("Corrupt manifest for {category}: {names} names but {hashes} hashes")]
    LengthMismatch {
        category: String,
        names: usize,
        hashes: usize,
    },

    /// Invalid manifest format
    #[error("Invalid manifest format in {file} at line {line}: {content:?}")]
    InvalidFormat {
        file: String,
        line: usize,
        content: String,
    },

    /// Duplicate entry in manifest
    #[error("Duplicate entry found in manifest for {category}: {name}")]
    DuplicateEntry { category: String, name: String },

    /// Item name that cannot be mapped onto a local file
    #[error("Invalid item name in manifest: {name:?}")]
    InvalidItemName { name: String },
}

impl ManifestError {
    /// Everything except a failed fetch means the remote data itself is corrupt
    pub fn is_corruption(&self) -> bool {
        !matches!(self, ManifestError::Network { .. })
    }
}

/// Local hashing errors
#[derive(Error, Debug)]
pub enum HashError {
    /// The file to hash does not exist
    #[error("File not found for hashing: {path}")]
    FileNotFound { path: PathBuf },

    /// The file exists but could not be read
    #[error("Failed to read {path} for hashing: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Content store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store directory not found or inaccessible
    #[error("Store directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// I/O failure on a store path
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive could not be unpacked; the destination is unusable
    #[error("Failed to extract {archive} into {destination}: {reason}")]
    ExtractionFailure {
        archive: PathBuf,
        destination: PathBuf,
        reason: String,
    },

    /// Staged download could not be moved into place
    #[error("Could not move {staged} into place at {destination}")]
    PlaceFailed {
        staged: PathBuf,
        destination: PathBuf,
    },

    /// Settings file unreadable or unwritable
    #[error("Settings error at {path}: {reason}")]
    Settings { path: PathBuf, reason: String },

    /// Category has no per-item layout
    #[error("Category {category} is not enumerable")]
    NotEnumerable { category: String },

    /// Operation refused on a non-empty store
    #[error("Store at {path} already holds content; use force to overwrite")]
    AlreadySeeded { path: PathBuf },

    /// Stored document could not be parsed
    #[error("Unreadable record {path}: {reason}")]
    InvalidRecord { path: PathBuf, reason: String },
}

impl StoreError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Sync orchestration errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// Another check/apply is already running on this orchestrator
    #[error("A sync run is already in progress")]
    RunInProgress,

    /// The requested action is not allowed from the current lane status
    #[error("Cannot {action} the {lane} lane while it is {from}")]
    InvalidTransition {
        lane: String,
        from: String,
        action: String,
    },

    /// Apply requested without a plan from a preceding check
    #[error("No pending sync plan for the {lane} lane; run a check first")]
    NoPendingPlan { lane: String },

    /// Required collaborator has not been linked
    #[error("Collaborator not linked: {what}")]
    CollaboratorMissing { what: String },

    /// Sync configuration rejected by validation
    #[error("Invalid sync configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The run was cancelled
    #[error("Sync run cancelled")]
    Cancelled,

    /// One or more units failed during apply
    #[error("{failed} of {total} sync steps failed")]
    ItemsFailed { failed: usize, total: usize },

    /// Manifest error during check
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Download error outside per-item accounting (e.g. etag lookup)
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Content store error
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Manifest error
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Hashing error
    #[error(transparent)]
    Hash(#[from] HashError),

    /// Content store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Orchestration error
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable by retrying the check/apply cycle
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(e) => e.is_transient(),
            AppError::Manifest(ManifestError::Network { source, .. }) => source.is_transient(),
            AppError::Sync(SyncError::RunInProgress)
            | AppError::Sync(SyncError::Cancelled)
            | AppError::Sync(SyncError::ItemsFailed { .. })
            | AppError::Sync(SyncError::Download(_)) => true,
            AppError::Sync(SyncError::Manifest(ManifestError::Network { source, .. })) => {
                source.is_transient()
            }
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Download(_) => "download",
            AppError::Manifest(_) => "manifest",
            AppError::Hash(_) => "hash",
            AppError::Store(_) => "store",
            AppError::Sync(_) => "sync",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Manifest result type alias
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;

/// Hash result type alias
pub type HashResult<T> = std::result::Result<T, HashError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Sync result type alias
pub type SyncResult<T> = std::result::Result<T, SyncError>;
