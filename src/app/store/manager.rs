//! Core content store with atomic placement
//!
//! The store owns the data root: item directories, the course list, the
//! staging area and the settings file. Downloads never touch content directly;
//! they land in staging and are moved into place with a rename.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::app::diff::LocalInventory;
use crate::app::hash::{ContentDigest, HashVerifier};
use crate::app::models::{Category, ItemRef};
use crate::constants::layout;
use crate::errors::{HashResult, StoreError, StoreResult};

use super::config::StoreConfig;
use super::layout::StoreLayout;
use super::settings::Settings;
use super::stats::StoreStats;

/// On-disk content store
#[derive(Debug, Clone)]
pub struct ContentStore {
    config: StoreConfig,
    layout: StoreLayout,
    verifier: HashVerifier,
}

impl ContentStore {
    /// Open (and create if needed) the store
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the data root cannot be created or accessed
    pub async fn new(config: StoreConfig) -> StoreResult<Self> {
        let root = match &config.data_root {
            Some(path) => path.clone(),
            None => Self::get_default_data_dir()?,
        };

        Self::ensure_directory_exists(&root).await?;

        info!("Opened content store at {}", root.display());

        Ok(Self {
            verifier: HashVerifier::new(config.hash_algorithm),
            layout: StoreLayout::new(root),
            config,
        })
    }

    /// Default data directory for the current OS
    ///
    /// - macOS: ~/Library/Application Support/bpm-assets
    /// - Linux: ~/.local/share/bpm-assets
    /// - Windows: %APPDATA%/bpm-assets
    fn get_default_data_dir() -> StoreResult<PathBuf> {
        let dir = dirs::data_dir()
            .ok_or_else(|| StoreError::DirectoryNotAccessible {
                path: PathBuf::from("system data directory"),
            })?
            .join(layout::APP_DIR_NAME);
        Ok(dir)
    }

    async fn ensure_directory_exists(path: &Path) -> StoreResult<()> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            fs::create_dir_all(path).await.map_err(|e| {
                error!("Failed to create directory {}: {}", path.display(), e);
                StoreError::DirectoryNotAccessible {
                    path: path.to_path_buf(),
                }
            })?;
            debug!("Created directory: {}", path.display());
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn verifier(&self) -> &HashVerifier {
        &self.verifier
    }

    /// Final path of an item
    pub fn item_path(&self, item: &ItemRef) -> PathBuf {
        self.layout.item_path(item.category, &item.name)
    }

    async fn is_file(path: &Path) -> bool {
        matches!(fs::metadata(path).await, Ok(m) if m.is_file())
    }

    /// Read an item's bytes
    pub async fn read_item(&self, category: Category, name: &str) -> StoreResult<Vec<u8>> {
        let path = self.layout.item_path(category, name);
        fs::read(&path).await.map_err(|e| StoreError::io(path, e))
    }

    /// Write an item directly (temp file + rename)
    pub async fn write_item(&self, category: Category, name: &str, content: &[u8]) -> StoreResult<()> {
        let path = self.layout.item_path(category, name);
        if let Some(parent) = path.parent() {
            Self::ensure_directory_exists(parent).await?;
        }
        let temp = tempfile::NamedTempFile::new_in(path.parent().unwrap_or(self.root()))
            .map_err(|e| StoreError::io(&path, e))?
            .into_temp_path();
        fs::write(&temp, content)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        temp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;
        Ok(())
    }

    /// Delete an item; deleting an absent item is not an error
    pub async fn delete_item(&self, category: Category, name: &str) -> StoreResult<()> {
        let path = self.layout.item_path(category, name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}/{}", category, name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Enumerate the items of a category, sorted by name
    ///
    /// A missing category directory is an empty category. Files that do not
    /// carry the category's extension, hidden files and leftovers such as
    /// `.tmp` files are ignored.
    pub async fn list_items(&self, category: Category) -> StoreResult<Vec<String>> {
        if !category.is_enumerable() {
            return Err(StoreError::NotEnumerable {
                category: category.to_string(),
            });
        }

        let dir = self.layout.category_path(category);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|f| category.item_name_from_file(f))
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Digest of an item
    pub async fn item_digest(&self, category: Category, name: &str) -> HashResult<ContentDigest> {
        self.verifier
            .calculate_file_hash(&self.layout.item_path(category, name))
            .await
    }

    /// Move a staged download into its final location
    pub async fn place(&self, staged: &Path, item: &ItemRef) -> StoreResult<()> {
        let destination = self.item_path(item);
        if let Some(parent) = destination.parent() {
            Self::ensure_directory_exists(parent).await?;
        }
        fs::rename(staged, &destination).await.map_err(|e| {
            error!(
                "Failed to move {} into place: {}",
                staged.display(),
                e
            );
            StoreError::PlaceFailed {
                staged: staged.to_path_buf(),
                destination: destination.clone(),
            }
        })?;
        debug!("Placed {}", item);
        Ok(())
    }

    /// Replace a category wholesale with the contents of an archive
    ///
    /// The archive is unpacked into a scratch directory in staging first; only
    /// a complete extraction replaces the category directory. Items absent from
    /// the archive do not survive. On failure the category is left as it was.
    pub async fn replace_from_archive(&self, category: Category, archive: &Path) -> StoreResult<usize> {
        if !category.is_enumerable() {
            return Err(StoreError::NotEnumerable {
                category: category.to_string(),
            });
        }

        let destination = self.layout.category_path(category);
        let unpack_dir = self.layout.staging_unpack_dir(category);
        remove_dir_if_present(&unpack_dir).await?;
        Self::ensure_directory_exists(&unpack_dir).await?;

        let archive_path = archive.to_path_buf();
        let target = unpack_dir.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_zip(&archive_path, &target))
            .await
            .map_err(|e| StoreError::ExtractionFailure {
                archive: archive.to_path_buf(),
                destination: destination.clone(),
                reason: format!("extraction task failed: {}", e),
            })
            .and_then(|result| result);

        let extracted = match extracted {
            Ok(entries) => entries,
            Err(e) => {
                if let Err(cleanup) = remove_dir_if_present(&unpack_dir).await {
                    warn!("Could not remove {}: {}", unpack_dir.display(), cleanup);
                }
                return Err(e);
            }
        };

        remove_dir_if_present(&destination).await?;
        fs::rename(&unpack_dir, &destination)
            .await
            .map_err(|e| StoreError::io(destination.clone(), e))?;

        info!(
            "Replaced {} from {} ({} entries)",
            category,
            archive.display(),
            extracted
        );

        if !self.config.keep_archives {
            if let Err(e) = fs::remove_file(archive).await {
                warn!("Could not remove archive {}: {}", archive.display(), e);
            }
        }
        Ok(extracted)
    }

    /// Remove everything in the staging area
    pub async fn clear_staging(&self) -> StoreResult<()> {
        let staging = self.layout.staging_dir();
        match fs::remove_dir_all(&staging).await {
            Ok(()) => {
                debug!("Cleared staging area");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(staging, e)),
        }
    }

    pub async fn load_settings(&self) -> StoreResult<Settings> {
        Settings::load(&self.layout.settings_file()).await
    }

    pub async fn save_settings(&self, settings: &Settings) -> StoreResult<()> {
        settings.save(&self.layout.settings_file()).await
    }

    /// Whether the store holds no content at all
    pub async fn is_empty(&self) -> StoreResult<bool> {
        for category in Category::ENUMERABLE {
            if !self.list_items(category).await?.is_empty() {
                return Ok(false);
            }
        }
        Ok(!Self::is_file(&self.layout.courses_file()).await)
    }

    /// Populate the store from a bundled copy of the content
    ///
    /// The bundle uses the store layout (`songs/`, `jackets/`, `courses.json`).
    /// A non-empty store is only overwritten with `force`.
    pub async fn seed_from(&self, bundle: &Path, force: bool) -> StoreResult<usize> {
        if !force && !self.is_empty().await? {
            return Err(StoreError::AlreadySeeded {
                path: self.root().to_path_buf(),
            });
        }
        if !Self::is_dir(bundle).await {
            return Err(StoreError::DirectoryNotAccessible {
                path: bundle.to_path_buf(),
            });
        }

        let mut copied = 0;
        for category in Category::ENUMERABLE {
            let source = bundle.join(category.local_dir());
            if !Self::is_dir(&source).await {
                warn!("Bundle has no {} directory", category);
                continue;
            }
            let target = self.layout.category_path(category);
            match fs::remove_dir_all(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(target, e)),
            }
            Self::ensure_directory_exists(&target).await?;

            let mut entries = fs::read_dir(&source)
                .await
                .map_err(|e| StoreError::io(&source, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::io(&source, e))?
            {
                let file_name = entry.file_name();
                let Some(name) = file_name.to_str().and_then(|f| category.item_name_from_file(f))
                else {
                    continue;
                };
                let to = self.layout.item_path(category, &name);
                fs::copy(entry.path(), &to)
                    .await
                    .map_err(|e| StoreError::io(&to, e))?;
                copied += 1;
            }
        }

        let courses = bundle.join(layout::COURSES_FILE);
        if Self::is_file(&courses).await {
            let to = self.layout.courses_file();
            fs::copy(&courses, &to)
                .await
                .map_err(|e| StoreError::io(&to, e))?;
            copied += 1;
        }

        let mut settings = self.load_settings().await?;
        settings.initial_load = Some(Utc::now());
        self.save_settings(&settings).await?;

        info!("Seeded store from {} ({} files)", bundle.display(), copied);
        Ok(copied)
    }

    /// Delete all content, staging and settings
    pub async fn reset(&self) -> StoreResult<()> {
        for category in Category::ENUMERABLE {
            let dir = self.layout.category_path(category);
            match fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(dir, e)),
            }
        }
        for file in [self.layout.courses_file(), self.layout.settings_file()] {
            match fs::remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(file, e)),
            }
        }
        self.clear_staging().await?;
        info!("Reset content store at {}", self.root().display());
        Ok(())
    }

    async fn is_dir(path: &Path) -> bool {
        matches!(fs::metadata(path).await, Ok(m) if m.is_dir())
    }

    /// Item counts and disk usage
    pub async fn stats(&self) -> StoreResult<StoreStats> {
        let mut stats = StoreStats::new(self.root().to_path_buf());
        for category in Category::ENUMERABLE {
            let names = self.list_items(category).await?;
            let mut bytes = 0;
            for name in &names {
                if let Ok(meta) = fs::metadata(self.layout.item_path(category, name)).await {
                    bytes += meta.len();
                }
            }
            stats.add_category(category, names.len(), bytes);
        }
        if let Ok(meta) = fs::metadata(self.layout.courses_file()).await {
            stats.add_category(Category::CourseList, 1, meta.len());
        }
        stats.settings = self.load_settings().await.unwrap_or_default();
        Ok(stats)
    }
}

/// Unpack a zip archive into `destination`
///
/// Entries with unsafe paths are skipped by the zip crate's enclosed-name check.
async fn remove_dir_if_present(path: &Path) -> StoreResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn extract_zip(archive: &Path, destination: &Path) -> StoreResult<usize> {
    let failure = |reason: String| StoreError::ExtractionFailure {
        archive: archive.to_path_buf(),
        destination: destination.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(archive).map_err(|e| failure(e.to_string()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| failure(e.to_string()))?;
    let entries = zip.len();
    zip.extract(destination).map_err(|e| failure(e.to_string()))?;
    Ok(entries)
}

#[async_trait]
impl LocalInventory for ContentStore {
    async fn contains(&self, category: Category, name: &str) -> bool {
        Self::is_file(&self.layout.item_path(category, name)).await
    }

    async fn item_hash(&self, category: Category, name: &str) -> HashResult<String> {
        Ok(self.item_digest(category, name).await?.to_hex())
    }

    async fn list_items(&self, category: Category) -> StoreResult<Vec<String>> {
        ContentStore::list_items(self, category).await
    }

    async fn course_list_hash(&self) -> HashResult<String> {
        Ok(self
            .verifier
            .calculate_file_hash(&self.layout.courses_file())
            .await?
            .to_hex())
    }
}
