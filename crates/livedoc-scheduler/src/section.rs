//! Registry of documentation sections and the files they are built from

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A documentation section and its inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDependency {
    /// Section id
    pub id: String,
    /// Source files the section is rendered from
    pub dependent_files: BTreeSet<String>,
    /// Template the section is rendered with
    pub template_id: Option<String>,
    /// Last successful regeneration
    pub last_updated: Option<DateTime<Utc>>,
}

impl SectionDependency {
    /// Create section without inputs
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dependent_files: BTreeSet::new(),
            template_id: None,
            last_updated: None,
        }
    }

    /// With dependent files
    #[must_use]
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependent_files.extend(files.into_iter().map(Into::into));
        self
    }

    /// With template id
    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template_id = Some(template.into());
        self
    }

    /// Whether a change to `path` affects this section
    #[must_use]
    pub fn depends_on(&self, path: &str) -> bool {
        self.dependent_files.contains(path) || self.template_id.as_deref() == Some(path)
    }
}

/// Thread-safe section registry shared by the scheduler and its owner
#[derive(Debug, Default)]
pub struct SectionRegistry {
    sections: RwLock<BTreeMap<String, SectionDependency>>,
}

impl SectionRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a section
    pub fn register(&self, section: SectionDependency) {
        self.sections.write().insert(section.id.clone(), section);
    }

    /// Remove a section
    pub fn unregister(&self, id: &str) -> Option<SectionDependency> {
        self.sections.write().remove(id)
    }

    /// Look up a section
    #[must_use]
    pub fn get(&self, id: &str) -> Option<SectionDependency> {
        self.sections.read().get(id).cloned()
    }

    /// Every section, ordered by id
    #[must_use]
    pub fn all(&self) -> Vec<SectionDependency> {
        self.sections.read().values().cloned().collect()
    }

    /// Sections touched by any of `paths`, ordered by id
    #[must_use]
    pub fn sections_for<'a, I>(&self, paths: I) -> Vec<SectionDependency>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let paths: Vec<&String> = paths.into_iter().collect();
        self.sections
            .read()
            .values()
            .filter(|section| paths.iter().any(|path| section.depends_on(path)))
            .cloned()
            .collect()
    }

    /// Stamp a section as regenerated
    pub fn mark_updated(&self, id: &str, at: DateTime<Utc>) {
        if let Some(section) = self.sections.write().get_mut(id) {
            section.last_updated = Some(at);
        }
    }

    /// Number of registered sections
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.read().len()
    }

    /// Whether no section is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.read().is_empty()
    }
}
