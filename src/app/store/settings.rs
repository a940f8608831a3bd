//! Persisted sync settings
//!
//! Holds the entity tags of the bulk archives that were last applied and the
//! time of the last successful update. Stored as `settings.json` under the data
//! root and written atomically.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::models::Category;
use crate::errors::{StoreError, StoreResult};

/// Sync bookkeeping kept between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Entity tag of the applied `data.zip`
    #[serde(default)]
    pub data_etag: Option<String>,
    /// Entity tag of the applied `jackets.zip`
    #[serde(default)]
    pub jackets_etag: Option<String>,
    /// Completion time of the last successful apply
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    /// When the store was first seeded from a bundle
    #[serde(default)]
    pub initial_load: Option<DateTime<Utc>>,
}

impl Settings {
    /// Recorded entity tag for a category's archive
    pub fn etag(&self, category: Category) -> Option<&str> {
        match category {
            Category::Songs => self.data_etag.as_deref(),
            Category::Jackets => self.jackets_etag.as_deref(),
            Category::CourseList => None,
        }
    }

    pub fn set_etag(&mut self, category: Category, etag: Option<String>) {
        match category {
            Category::Songs => self.data_etag = etag,
            Category::Jackets => self.jackets_etag = etag,
            Category::CourseList => {}
        }
    }

    /// Whether an update check is due
    ///
    /// A store that was never updated is always due.
    pub fn update_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_update {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= interval,
                // last_update in the future: clock moved backwards
                Err(_) => false,
            },
        }
    }

    /// Load settings, falling back to defaults when the file does not exist
    pub async fn load(path: &Path) -> StoreResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                warn!("Unreadable settings at {}: {}", path.display(), e);
                StoreError::Settings {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Write settings via a temp file in the same directory, then rename
    pub async fn save(&self, path: &Path) -> StoreResult<()> {
        let content = serde_json::to_vec_pretty(self).map_err(|e| StoreError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let target = path.to_path_buf();
        let task_path = target.clone();

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let dir = task_path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
            let mut temp =
                tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
            temp.write_all(&content)
                .map_err(|e| StoreError::io(dir, e))?;
            temp.persist(&task_path)
                .map_err(|e| StoreError::io(&task_path, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Settings {
            path: target,
            reason: format!("settings writer task failed: {}", e),
        })?
    }
}
