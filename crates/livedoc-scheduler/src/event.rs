//! File change events emitted by a watcher

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use livedoc_cache::path_key;
use serde::{Deserialize, Serialize};

/// What happened to a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeKind {
    /// Content changed
    Modified,
    /// File appeared
    Added,
    /// File disappeared
    Deleted,
    /// File moved from `from`
    Renamed {
        /// Previous location
        from: PathBuf,
    },
}

/// One file change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Affected path (the new location for renames)
    pub path: PathBuf,
    /// Kind of change
    #[serde(flatten)]
    pub kind: ChangeKind,
    /// When the watcher observed it
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create event observed now
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Content change
    #[inline]
    #[must_use]
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Modified)
    }

    /// New file
    #[inline]
    #[must_use]
    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Added)
    }

    /// Removed file
    #[inline]
    #[must_use]
    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Deleted)
    }

    /// Move from `from` to `to`
    #[inline]
    #[must_use]
    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::new(to, ChangeKind::Renamed { from: from.into() })
    }

    /// Normalized key of the affected path
    #[must_use]
    pub fn key(&self) -> String {
        path_key(&self.path)
    }

    /// Previous location for renames
    #[must_use]
    pub fn previous_path(&self) -> Option<&Path> {
        match &self.kind {
            ChangeKind::Renamed { from } => Some(from),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_keeps_both_paths() {
        let event = ChangeEvent::renamed("old.ts", "new.ts");
        assert_eq!(event.key(), "new.ts");
        assert_eq!(event.previous_path(), Some(Path::new("old.ts")));
        assert_eq!(ChangeEvent::modified("a.ts").previous_path(), None);
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = ChangeEvent::deleted("a.ts");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "deleted");
        assert_eq!(json["path"], "a.ts");
    }
}
