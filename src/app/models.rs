//! Data models for BPM Assets
//!
//! This module defines the content categories handled by the sync engine and the
//! item references that flow between the manifest fetcher, the diff engine and
//! the fetch executor.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::hash::ManifestHash;
use crate::constants::{layout, remote};
use crate::errors::{ManifestError, ManifestResult};

/// Independently synchronized class of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// One JSON record per song
    Songs,
    /// One PNG jacket image per song
    Jackets,
    /// Single course list document
    CourseList,
}

impl Category {
    /// Categories stored as one file per item, in apply order
    pub const ENUMERABLE: [Category; 2] = [Category::Songs, Category::Jackets];

    /// All categories in apply order
    pub const ALL: [Category; 3] = [Category::Songs, Category::Jackets, Category::CourseList];

    /// Manifest key used in remote file names (`all_<key>.txt`)
    pub fn key(&self) -> &'static str {
        match self {
            Category::Songs => "songs",
            Category::Jackets => "jackets",
            Category::CourseList => "courses",
        }
    }

    pub fn is_enumerable(&self) -> bool {
        !matches!(self, Category::CourseList)
    }

    /// Remote file listing item names
    pub fn names_manifest(&self) -> String {
        format!(
            "{}{}.{}",
            remote::NAMES_MANIFEST_PREFIX,
            self.key(),
            remote::MANIFEST_EXTENSION
        )
    }

    /// Remote file listing item hashes in the same order
    pub fn hashes_manifest(&self) -> String {
        format!(
            "{}{}.{}",
            remote::HASHES_MANIFEST_PREFIX,
            self.key(),
            remote::MANIFEST_EXTENSION
        )
    }

    /// Remote directory serving individual items
    pub fn remote_dir(&self) -> Option<&'static str> {
        match self {
            Category::Songs => Some(remote::SONGS_DIR),
            Category::Jackets => Some(remote::JACKETS_DIR),
            Category::CourseList => None,
        }
    }

    /// Local directory (or file, for the course list) under the data root
    pub fn local_dir(&self) -> &'static str {
        match self {
            Category::Songs => layout::SONGS_DIR,
            Category::Jackets => layout::JACKETS_DIR,
            Category::CourseList => layout::COURSES_FILE,
        }
    }

    /// File extension of a single item
    pub fn extension(&self) -> &'static str {
        match self {
            Category::Songs => layout::SONG_EXTENSION,
            Category::Jackets => layout::JACKET_EXTENSION,
            Category::CourseList => "json",
        }
    }

    /// Bulk archive carrying the whole category
    pub fn archive_name(&self) -> Option<&'static str> {
        match self {
            Category::Songs => Some(remote::DATA_ZIP),
            Category::Jackets => Some(remote::JACKETS_ZIP),
            Category::CourseList => None,
        }
    }

    /// File name of an item of this category
    pub fn file_name(&self, name: &str) -> String {
        match self {
            Category::CourseList => remote::COURSES_FILE.to_string(),
            _ => format!("{}.{}", name, self.extension()),
        }
    }

    /// Path of an item relative to the remote base
    pub fn remote_path(&self, name: &str) -> String {
        match self.remote_dir() {
            Some(dir) => format!("{}/{}", dir, self.file_name(name)),
            None => remote::COURSES_FILE.to_string(),
        }
    }

    /// Recover an item name from a local file name, if it belongs to this category
    pub fn item_name_from_file(&self, file_name: &str) -> Option<String> {
        let path = Path::new(file_name);
        if path.extension().and_then(|e| e.to_str()) != Some(self.extension()) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        validate_item_name(stem).ok()?;
        Some(stem.to_string())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Reject names that cannot be mapped onto a single file in a category directory
pub fn validate_item_name(name: &str) -> ManifestResult<()> {
    let invalid = name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.starts_with('.')
        || name.chars().any(char::is_control);

    if invalid {
        return Err(ManifestError::InvalidItemName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// One named unit of content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub category: Category,
    pub name: String,
    /// Hash the manifest declares for this item, if known
    pub expected_hash: Option<ManifestHash>,
}

impl ItemRef {
    /// Create a validated item reference
    pub fn new(
        category: Category,
        name: impl Into<String>,
        expected_hash: Option<ManifestHash>,
    ) -> ManifestResult<Self> {
        let name = name.into();
        validate_item_name(&name)?;
        Ok(Self {
            category,
            name,
            expected_hash,
        })
    }

    /// The course list as a single item
    pub fn course_list(expected_hash: Option<ManifestHash>) -> Self {
        Self {
            category: Category::CourseList,
            name: "courses".to_string(),
            expected_hash,
        }
    }

    pub fn file_name(&self) -> String {
        self.category.file_name(&self.name)
    }

    pub fn remote_path(&self) -> String {
        self.category.remote_path(&self.name)
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}
