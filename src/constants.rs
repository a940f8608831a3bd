//! Application constants for BPM Assets
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Remote origin layout
pub mod remote {
    /// Default origin serving manifests, items and archives
    pub const DEFAULT_BASE_URL: &str = "https://ddrbpm.com/";

    /// Prefix of the ordered item-name manifests (`all_songs.txt`)
    pub const NAMES_MANIFEST_PREFIX: &str = "all_";

    /// Prefix of the ordered hash manifests (`hashed_songs.txt`)
    pub const HASHES_MANIFEST_PREFIX: &str = "hashed_";

    /// Manifest file extension
    pub const MANIFEST_EXTENSION: &str = "txt";

    /// Course list document
    pub const COURSES_FILE: &str = "courses.json";

    /// Single-line hash manifest for the course list
    pub const COURSES_HASH_FILE: &str = "hashed_courses.txt";

    /// Bulk archive holding every song record
    pub const DATA_ZIP: &str = "data.zip";

    /// Bulk archive holding every jacket image
    pub const JACKETS_ZIP: &str = "jackets.zip";

    /// Remote directory of individual song records
    pub const SONGS_DIR: &str = "data";

    /// Remote directory of individual jacket images
    pub const JACKETS_DIR: &str = "jackets";
}

/// Local storage layout under the data root
pub mod layout {
    /// Directory of song records (one JSON file per song)
    pub const SONGS_DIR: &str = "songs";

    /// Directory of jacket images (one PNG per song)
    pub const JACKETS_DIR: &str = "jackets";

    /// Course list file
    pub const COURSES_FILE: &str = "courses.json";

    /// Download staging area; nothing here is ever presented as content
    pub const STAGING_DIR: &str = ".staging";

    /// Persisted settings (entity tags, last update)
    pub const SETTINGS_FILE: &str = "settings.json";

    /// File extension of song records
    pub const SONG_EXTENSION: &str = "json";

    /// File extension of jacket images
    pub const JACKET_EXTENSION: &str = "png";

    /// Application directory name under the OS data/config dirs
    pub const APP_DIR_NAME: &str = "bpm-assets";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("BPM-Assets/", env!("CARGO_PKG_VERSION"));

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default rate limit for origin requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 20;

    /// Maximum retry attempts for transient failures
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 500;

    /// Maximum backoff delay (milliseconds)
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Suffix of a resumable, partially transferred archive
    pub const PARTIAL_FILE_SUFFIX: &str = ".part";

    /// Suffix of the scratch directory an archive is unpacked into
    pub const UNPACK_DIR_SUFFIX: &str = ".unpack";

    /// Read buffer size for streamed hashing and copying (64KB)
    pub const HASH_CHUNK_SIZE: usize = 64 * 1024;
}

/// Sync orchestration constants
pub mod sync {
    use super::Duration;

    /// Default number of concurrent per-item fetches
    pub const DEFAULT_CONCURRENCY: usize = 4;

    /// Upper bound for per-item fetch concurrency
    pub const MAX_CONCURRENCY: usize = 32;

    /// Suggested interval between update checks
    pub const UPDATE_CHECK_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

// Re-export commonly used constants for convenience
pub use files::TEMP_FILE_SUFFIX;
pub use http::{DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
pub use limits::{DEFAULT_RATE_LIMIT_RPS, MAX_RETRIES, RETRY_BASE_DELAY_MS};
pub use remote::DEFAULT_BASE_URL;
pub use sync::DEFAULT_CONCURRENCY;
