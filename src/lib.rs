//! BPM Assets Library
//!
//! Asset synchronisation for a dance-game BPM reference catalog. Works out which
//! song records, jacket images and course lists are missing or stale compared
//! with the origin, fetches only the differences, verifies their hashes and
//! reconciles the local store while reporting progress.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
