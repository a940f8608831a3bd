//! Core types for manifest processing

use std::collections::HashMap;

use crate::app::hash::ManifestHash;
use crate::app::models::{Category, ItemRef};

/// One `(name, hash)` record of a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub hash: ManifestHash,
}

/// Remote description of one enumerable category
///
/// Entries keep the order of the remote lists. Built fresh on every check and
/// never persisted.
#[derive(Debug, Clone)]
pub struct Manifest {
    category: Category,
    entries: Vec<ManifestEntry>,
    index: HashMap<String, usize>,
}

impl Manifest {
    /// Build a manifest from entries already known to be unique and valid
    pub(crate) fn from_entries(category: Category, entries: Vec<ManifestEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        Self {
            category,
            entries,
            index,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Hash the manifest declares for an item
    pub fn hash_of(&self, name: &str) -> Option<&ManifestHash> {
        self.index.get(name).map(|&i| &self.entries[i].hash)
    }

    /// Entries as item references, in manifest order
    pub fn items(&self) -> impl Iterator<Item = ItemRef> + '_ {
        self.entries.iter().map(move |e| ItemRef {
            category: self.category,
            name: e.name.clone(),
            expected_hash: Some(e.hash.clone()),
        })
    }
}

/// Statistics about manifest processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestStats {
    /// Records in the names list
    pub names: usize,
    /// Records in the hashes list
    pub hashes: usize,
    /// Trailing empty lines stripped
    pub trailing_blank_stripped: usize,
    /// Lines that carried a `\r` terminator
    pub crlf_lines: usize,
}

/// Everything a per-item check needs from the origin
#[derive(Debug, Clone)]
pub struct RemoteSnapshot {
    pub songs: Manifest,
    pub jackets: Manifest,
    pub course_hash: ManifestHash,
}

impl RemoteSnapshot {
    pub fn manifest(&self, category: Category) -> Option<&Manifest> {
        match category {
            Category::Songs => Some(&self.songs),
            Category::Jackets => Some(&self.jackets),
            Category::CourseList => None,
        }
    }
}
