//! Parsing of the newline-delimited manifest lists
//!
//! Each enumerable category is published as two parallel lists: item names
//! (`all_<category>.txt`) and their hashes (`hashed_<category>.txt`). The lists
//! must have the same number of records in the same order.

use std::collections::HashSet;

use tracing::debug;

use super::types::{Manifest, ManifestEntry, ManifestStats};
use crate::app::hash::ManifestHash;
use crate::app::models::{validate_item_name, Category};
use crate::errors::{ManifestError, ManifestResult};

/// Split manifest text into records
///
/// A single trailing empty line (left by a final newline) is dropped; `\r`
/// terminators are tolerated. Any other empty line is a format error.
pub fn parse_lines<'a>(
    text: &'a str,
    file: &str,
    stats: &mut ManifestStats,
) -> ManifestResult<Vec<&'a str>> {
    let mut lines: Vec<&str> = text
        .split('\n')
        .map(|line| match line.strip_suffix('\r') {
            Some(stripped) => {
                stats.crlf_lines += 1;
                stripped
            }
            None => line,
        })
        .collect();

    if lines.last().is_some_and(|last| last.trim().is_empty()) {
        lines.pop();
        stats.trailing_blank_stripped += 1;
    }

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            return Err(ManifestError::InvalidFormat {
                file: file.to_string(),
                line: i + 1,
                content: (*line).to_string(),
            });
        }
    }

    Ok(lines.into_iter().map(str::trim).collect())
}

/// Build a category manifest from the names and hashes lists
pub fn manifest_from_lists(
    category: Category,
    names_text: &str,
    hashes_text: &str,
) -> ManifestResult<(Manifest, ManifestStats)> {
    let mut stats = ManifestStats::default();
    let names = parse_lines(names_text, &category.names_manifest(), &mut stats)?;
    let hashes = parse_lines(hashes_text, &category.hashes_manifest(), &mut stats)?;
    stats.names = names.len();
    stats.hashes = hashes.len();

    if names.len() != hashes.len() {
        return Err(ManifestError::LengthMismatch {
            category: category.to_string(),
            names: names.len(),
            hashes: hashes.len(),
        });
    }

    let mut seen = HashSet::with_capacity(names.len());
    let mut entries = Vec::with_capacity(names.len());
    for (name, hash) in names.into_iter().zip(hashes) {
        validate_item_name(name)?;
        if !seen.insert(name) {
            return Err(ManifestError::DuplicateEntry {
                category: category.to_string(),
                name: name.to_string(),
            });
        }
        entries.push(ManifestEntry {
            name: name.to_string(),
            hash: ManifestHash::new(hash),
        });
    }

    debug!("Parsed {} manifest: {} entries", category, entries.len());
    Ok((Manifest::from_entries(category, entries), stats))
}

/// Parse the single-record course list hash manifest
pub fn parse_course_hash(text: &str, file: &str) -> ManifestResult<ManifestHash> {
    let mut stats = ManifestStats::default();
    let lines = parse_lines(text, file, &mut stats)?;
    match lines.as_slice() {
        [hash] => Ok(ManifestHash::new(hash)),
        _ => Err(ManifestError::InvalidFormat {
            file: file.to_string(),
            line: lines.len(),
            content: format!("expected exactly one hash record, found {}", lines.len()),
        }),
    }
}
