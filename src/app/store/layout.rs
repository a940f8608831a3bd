//! On-disk layout of the content store
//!
//! ```text
//! <root>/songs/<name>.json
//! <root>/jackets/<name>.png
//! <root>/courses.json
//! <root>/settings.json
//! <root>/.staging/<category>/<file>.tmp
//! <root>/.staging/<archive>.part
//! <root>/.staging/<category>.unpack/
//! ```

use std::path::{Path, PathBuf};

use crate::app::models::{Category, ItemRef};
use crate::constants::{files, layout};

/// Path generation for store content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory (enumerable categories) or file (course list) of a category
    pub fn category_path(&self, category: Category) -> PathBuf {
        self.root.join(category.local_dir())
    }

    /// Final location of an item
    pub fn item_path(&self, category: Category, name: &str) -> PathBuf {
        match category {
            Category::CourseList => self.courses_file(),
            _ => self.category_path(category).join(category.file_name(name)),
        }
    }

    pub fn courses_file(&self) -> PathBuf {
        self.root.join(layout::COURSES_FILE)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(layout::SETTINGS_FILE)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(layout::STAGING_DIR)
    }

    /// Where a per-item download lands before being moved into place
    pub fn staging_item_path(&self, item: &ItemRef) -> PathBuf {
        self.staging_dir().join(item.category.key()).join(format!(
            "{}{}",
            item.file_name(),
            files::TEMP_FILE_SUFFIX
        ))
    }

    /// Scratch directory an archive is unpacked into before replacing a category
    pub fn staging_unpack_dir(&self, category: Category) -> PathBuf {
        self.staging_dir()
            .join(format!("{}{}", category.key(), files::UNPACK_DIR_SUFFIX))
    }

    /// Where a (resumable) archive download lands
    pub fn staging_archive_path(&self, archive_name: &str) -> PathBuf {
        self.staging_dir()
            .join(format!("{}{}", archive_name, files::PARTIAL_FILE_SUFFIX))
    }
}
