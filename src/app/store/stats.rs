//! Content store statistics and byte formatting

use std::path::PathBuf;

use crate::app::models::Category;

use super::settings::Settings;

/// Item counts and disk usage of a store
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Data root directory
    pub root: PathBuf,
    /// Number of song records
    pub songs: usize,
    /// Number of jacket images
    pub jackets: usize,
    /// Whether the course list is present
    pub has_courses: bool,
    /// Total size of all content in bytes
    pub total_bytes: u64,
    /// Persisted sync settings
    pub settings: Settings,
}

impl StoreStats {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            songs: 0,
            jackets: 0,
            has_courses: false,
            total_bytes: 0,
            settings: Settings::default(),
        }
    }

    /// Record the contents of one category
    pub fn add_category(&mut self, category: Category, count: usize, bytes: u64) {
        match category {
            Category::Songs => self.songs = count,
            Category::Jackets => self.jackets = count,
            Category::CourseList => self.has_courses = count > 0,
        }
        self.total_bytes += bytes;
    }

    /// Format total size in human-readable format
    pub fn format_size(&self) -> String {
        format_bytes(self.total_bytes)
    }
}

/// Format bytes with decimal (base 1000) units: `0 B`, `512 B`, `4.2 kB`, `11 MB`
///
/// One decimal is shown below 10 units, none above.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "kB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1000.0;

    if bytes < 1000 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if size < 10.0 {
        format!("{:.1} {}", size, UNITS[unit_index])
    } else {
        format!("{:.0} {}", size, UNITS[unit_index])
    }
}
