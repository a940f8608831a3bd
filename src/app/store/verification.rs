//! Hash verification of stored content against a manifest
//!
//! Produces a detailed report of which items are present and intact, which are
//! missing and which fail their manifest hash.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::app::hash::ManifestHash;
use crate::app::manifest::Manifest;
use crate::app::models::Category;
use crate::errors::HashError;

use super::manager::ContentStore;

/// Store verification report
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    /// Total items checked
    pub files_checked: usize,
    /// Items that passed verification
    pub files_verified: usize,
    /// Items that failed verification (missing included)
    pub files_failed: usize,
    /// Items that were missing
    pub files_missing: usize,
    /// Total verification time
    pub verification_time: Duration,
    /// Failed items with details
    pub failed_files: Vec<VerificationFailure>,
}

/// Details about a verification failure
#[derive(Debug, Clone)]
pub struct VerificationFailure {
    pub category: Category,
    pub name: String,
    /// Reason for failure
    pub reason: String,
    pub expected_hash: ManifestHash,
    /// Actual hash (if the file could be read)
    pub actual_hash: Option<String>,
}

impl VerificationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get verification success rate as percentage
    pub fn success_rate(&self) -> f64 {
        if self.files_checked == 0 {
            0.0
        } else {
            (self.files_verified as f64 / self.files_checked as f64) * 100.0
        }
    }

    /// Check if verification passed (no failures)
    pub fn is_successful(&self) -> bool {
        self.files_failed == 0
    }

    pub fn add_verified(&mut self) {
        self.files_checked += 1;
        self.files_verified += 1;
    }

    pub fn add_missing(&mut self, category: Category, name: &str, expected_hash: ManifestHash) {
        self.files_checked += 1;
        self.files_missing += 1;
        self.files_failed += 1;
        self.failed_files.push(VerificationFailure {
            category,
            name: name.to_string(),
            reason: "File not found".to_string(),
            expected_hash,
            actual_hash: None,
        });
    }

    pub fn add_failed(
        &mut self,
        category: Category,
        name: &str,
        reason: String,
        expected_hash: ManifestHash,
        actual_hash: Option<String>,
    ) {
        self.files_checked += 1;
        self.files_failed += 1;
        self.failed_files.push(VerificationFailure {
            category,
            name: name.to_string(),
            reason,
            expected_hash,
            actual_hash,
        });
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: VerificationReport) {
        self.files_checked += other.files_checked;
        self.files_verified += other.files_verified;
        self.files_failed += other.files_failed;
        self.files_missing += other.files_missing;
        self.verification_time += other.verification_time;
        self.failed_files.extend(other.failed_files);
    }
}

impl ContentStore {
    /// Hash every manifest item held locally and compare
    pub async fn verify_against(&self, manifest: &Manifest) -> VerificationReport {
        let start_time = Instant::now();
        let mut report = VerificationReport::new();
        let category = manifest.category();

        for entry in manifest.entries() {
            match self.item_digest(category, &entry.name).await {
                Ok(digest) if digest.matches(&entry.hash) => report.add_verified(),
                Ok(digest) => report.add_failed(
                    category,
                    &entry.name,
                    "Hash mismatch".to_string(),
                    entry.hash.clone(),
                    Some(digest.to_hex()),
                ),
                Err(HashError::FileNotFound { .. }) => {
                    report.add_missing(category, &entry.name, entry.hash.clone())
                }
                Err(e) => report.add_failed(
                    category,
                    &entry.name,
                    format!("Verification error: {}", e),
                    entry.hash.clone(),
                    None,
                ),
            }

            if report.files_checked % 1000 == 0 {
                debug!(
                    "Verified {} files, {} failures",
                    report.files_checked, report.files_failed
                );
            }
        }

        report.verification_time = start_time.elapsed();
        info!(
            "{} verification: {}/{} files verified ({:.1}%) in {:.2}s",
            category,
            report.files_verified,
            report.files_checked,
            report.success_rate(),
            report.verification_time.as_secs_f64()
        );
        report
    }
}
