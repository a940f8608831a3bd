//! Sync plans produced by a check and consumed by an apply

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app::diff::CategoryPlan;
use crate::app::fetch::FetchUnit;
use crate::app::hash::ManifestHash;
use crate::app::models::{Category, ItemRef};

use super::status::Lane;

/// How changed categories are transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStrategy {
    /// One request per missing item
    #[default]
    PerItem,
    /// Whole-category archives, detected by entity tag
    Archive,
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStrategy::PerItem => f.write_str("per-item"),
            TransferStrategy::Archive => f.write_str("archive"),
        }
    }
}

/// Everything one apply has to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub lane: Lane,
    pub strategy: TransferStrategy,
    /// One plan per enumerable category, in apply order
    pub categories: Vec<CategoryPlan>,
    pub course_list_changed: bool,
    /// Remote course list hash, when it was fetched
    pub course_hash: Option<ManifestHash>,
}

impl SyncPlan {
    pub fn new(lane: Lane, strategy: TransferStrategy) -> Self {
        Self {
            lane,
            strategy,
            categories: Vec::new(),
            course_list_changed: false,
            course_hash: None,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.course_list_changed || self.categories.iter().any(CategoryPlan::has_changes)
    }

    pub fn category(&self, category: Category) -> Option<&CategoryPlan> {
        self.categories.iter().find(|p| p.category == category)
    }

    /// Fetch units of one category
    ///
    /// An archive refresh replaces the per-item list for its category.
    pub fn units_for(plan: &CategoryPlan) -> Vec<FetchUnit> {
        if plan.archive.is_some() {
            vec![FetchUnit::Archive(plan.category)]
        } else {
            plan.missing.iter().cloned().map(FetchUnit::Item).collect()
        }
    }

    /// The course list unit, if it has to be fetched
    pub fn course_unit(&self) -> Option<FetchUnit> {
        self.course_list_changed
            .then(|| FetchUnit::Item(ItemRef::course_list(self.course_hash.clone())))
    }

    /// Units counted by the progress total
    ///
    /// Obsolete deletions are included; items covered by an archive are not.
    pub fn total_units(&self) -> usize {
        let categories: usize = self
            .categories
            .iter()
            .map(|p| {
                let deletions = if p.archive.is_some() { 0 } else { p.obsolete.len() };
                Self::units_for(p).len() + deletions
            })
            .sum();
        categories + usize::from(self.course_list_changed)
    }

    /// One-line description for logs and the CLI
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .categories
            .iter()
            .filter(|p| p.has_changes())
            .map(|p| match &p.archive {
                Some(_) => format!("{}: archive refresh", p.category),
                None => format!(
                    "{}: {} missing, {} obsolete",
                    p.category,
                    p.missing.len(),
                    p.obsolete.len()
                ),
            })
            .collect();
        if self.course_list_changed {
            parts.push("courses: changed".to_string());
        }
        if parts.is_empty() {
            "up to date".to_string()
        } else {
            parts.join("; ")
        }
    }
}
