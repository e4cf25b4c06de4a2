//! Whole-project snapshot cache
//!
//! A [`ProjectSnapshot`] is valid only while every `(file, hash)` pair in
//! its manifest still matches the live file. The first mismatch drops the
//! whole snapshot: a partially stale aggregate is never served.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CacheError;
use crate::hash::ContentHash;
use crate::metadata::{hash_file, path_key};
use crate::store::{CacheConfig, CacheStats, ContentAddressableCache};

/// File path -> content hash used to validate a snapshot
pub type FileManifest = BTreeMap<String, ContentHash>;

/// Aggregate analysis of a whole project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    /// Project root
    pub project_path: PathBuf,
    /// Aggregate analyzer output, opaque to the cache
    pub analysis: serde_json::Value,
    /// Hashes of every file the aggregate was computed from
    pub manifest: FileManifest,
    /// When the snapshot was stored
    pub updated_at: DateTime<Utc>,
}

/// Cache of [`ProjectSnapshot`]s keyed by project root
#[derive(Debug)]
pub struct ProjectSnapshotCache {
    snapshots: ContentAddressableCache<ProjectSnapshot>,
    hash_concurrency: usize,
}

impl ProjectSnapshotCache {
    /// Create empty cache
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            snapshots: ContentAddressableCache::new("snapshots", config),
            hash_concurrency: 16,
        }
    }

    /// Limit how many files [`ProjectSnapshotCache::build_manifest`] hashes at once
    #[must_use]
    pub fn with_hash_concurrency(mut self, concurrency: usize) -> Self {
        self.hash_concurrency = concurrency.max(1);
        self
    }

    /// Store the aggregate for `project_path` with the manifest it was built from
    ///
    /// # Errors
    /// Returns error if the snapshot cannot be serialized
    pub fn set_snapshot(
        &self,
        project_path: impl AsRef<Path>,
        analysis: serde_json::Value,
        manifest: FileManifest,
    ) -> Result<ProjectSnapshot, CacheError> {
        let project_path = project_path.as_ref();
        let manifest_hash = ContentHash::compute_serializable(&manifest)?;
        let snapshot = ProjectSnapshot {
            project_path: project_path.to_path_buf(),
            analysis,
            manifest,
            updated_at: Utc::now(),
        };
        self.snapshots
            .set(path_key(project_path), snapshot.clone(), Some(manifest_hash))?;
        info!(
            project = %project_path.display(),
            files = snapshot.manifest.len(),
            "project snapshot cached"
        );
        Ok(snapshot)
    }

    /// Fetch the snapshot if every manifest entry matches its live file
    ///
    /// # Errors
    /// Returns error on I/O failures other than not-found
    pub async fn get_snapshot(
        &self,
        project_path: impl AsRef<Path>,
    ) -> Result<Option<ProjectSnapshot>, CacheError> {
        let key = path_key(project_path.as_ref());
        let Some(snapshot) = self.snapshots.peek(&key) else {
            return Ok(self.snapshots.get(&key, None));
        };

        for (file, expected) in &snapshot.manifest {
            let live = hash_file(file).await?;
            if live.as_ref() != Some(expected) {
                debug!(project = %key, file = %file, "snapshot stale");
                self.snapshots.delete(&key);
                // counts the miss
                return Ok(self.snapshots.get(&key, None));
            }
        }

        let manifest_hash = ContentHash::compute_serializable(&snapshot.manifest)?;
        Ok(self.snapshots.get(&key, Some(&manifest_hash)))
    }

    /// Hash `files` concurrently into a manifest; missing files are skipped
    ///
    /// # Errors
    /// Returns the first I/O failure other than not-found
    pub async fn build_manifest<I, P>(&self, files: I) -> Result<FileManifest, CacheError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let keys: Vec<String> = files
            .into_iter()
            .map(|file| path_key(file.as_ref()))
            .collect();

        let hashed: Vec<(String, Result<Option<ContentHash>, CacheError>)> = stream::iter(keys)
            .map(|key| async move {
                let hash = hash_file(&key).await;
                (key, hash)
            })
            .buffer_unordered(self.hash_concurrency)
            .collect()
            .await;

        let mut manifest = FileManifest::new();
        for (key, hash) in hashed {
            match hash? {
                Some(hash) => {
                    manifest.insert(key, hash);
                }
                None => debug!(file = %key, "skipping missing file in manifest"),
            }
        }
        Ok(manifest)
    }

    /// Drop the snapshot for a project
    pub fn invalidate_snapshot(&self, project_path: impl AsRef<Path>) -> bool {
        self.snapshots.delete(&path_key(project_path.as_ref()))
    }

    /// Drop snapshots whose project contains one of `paths` but whose
    /// manifest does not list it
    ///
    /// Manifest validation only sees files that existed when the snapshot
    /// was built, so added or renamed files must be caught here. Returns the
    /// number of snapshots dropped.
    pub fn invalidate_uncovered<'a, I>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let paths: Vec<&str> = paths.into_iter().collect();
        let mut dropped = 0;
        for key in self.snapshots.keys() {
            let Some(snapshot) = self.snapshots.peek(&key) else {
                continue;
            };
            let uncovered = paths.iter().find(|path| {
                Path::new(path).starts_with(&key) && !snapshot.manifest.contains_key(**path)
            });
            if let Some(path) = uncovered {
                debug!(project = %key, file = %path, "snapshot does not cover changed file");
                if self.snapshots.delete(&key) {
                    dropped += 1;
                }
            }
        }
        dropped
    }

    /// Drop every snapshot
    pub fn clear(&self) {
        self.snapshots.clear();
    }

    /// Sweep expired snapshots
    pub fn cleanup(&self) -> usize {
        self.snapshots.cleanup()
    }

    /// Number of stored snapshots
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.snapshots.stats()
    }
}

impl Default for ProjectSnapshotCache {
    fn default() -> Self {
        Self::new(
            CacheConfig::default()
                .with_max_size(32 * 1024 * 1024)
                .with_max_entries(50),
        )
    }
}
