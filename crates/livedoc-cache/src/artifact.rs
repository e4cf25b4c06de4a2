//! Per-file analysis and compiled-template cache
//!
//! [`ArtifactCache`] layers three things over [`ContentAddressableCache`]:
//! - live validation: every read re-hashes the file and compares it with
//!   the metadata snapshot the artifact was produced from
//! - a [`DependencyGraph`] so invalidating a file also invalidates every
//!   artifact that (transitively) depends on it
//! - a separate template store consumed by the renderer
//!
//! Analyses and templates are keyed by the path string exactly as given.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::graph::DependencyGraph;
use crate::hash::ContentHash;
use crate::metadata::{path_key, FileMetadata};
use crate::store::{CacheConfig, CacheStats, ContentAddressableCache};

/// Result of analyzing one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    /// Analyzed file
    pub path: PathBuf,
    /// Analyzer output, opaque to the cache
    pub analysis: serde_json::Value,
    /// File identity at the time of analysis
    pub metadata: FileMetadata,
    /// Files and templates this analysis relies on
    pub dependencies: Vec<String>,
}

impl AnalysisArtifact {
    /// Create artifact from an already captured metadata snapshot
    #[inline]
    #[must_use]
    pub fn new(metadata: FileMetadata, analysis: serde_json::Value) -> Self {
        Self {
            path: metadata.path.clone(),
            analysis,
            metadata,
            dependencies: Vec::new(),
        }
    }

    /// Snapshot the current metadata of `path` and attach `analysis`
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    /// Returns error on I/O failures other than not-found
    pub async fn capture(
        path: impl AsRef<Path>,
        analysis: serde_json::Value,
    ) -> Result<Option<Self>, CacheError> {
        Ok(FileMetadata::read(path)
            .await?
            .map(|metadata| Self::new(metadata, analysis)))
    }

    /// With dependency paths
    #[inline]
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// Template in the form the renderer consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledTemplate {
    /// Template file
    pub path: PathBuf,
    /// Hash of the template source this was compiled from
    pub source_hash: ContentHash,
    /// Compiled representation, opaque to the cache
    pub compiled: String,
}

impl CompiledTemplate {
    /// Create compiled template
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, source_hash: ContentHash, compiled: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source_hash,
            compiled: compiled.into(),
        }
    }
}

/// Why an artifact was dropped; carried into log lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Source content changed
    ContentChanged,
    /// Source file removed
    Deleted,
    /// A dependency was invalidated
    DependencyChanged(String),
    /// Requested by a caller
    Manual,
    /// Everything is being regenerated
    FullRegeneration,
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentChanged => f.write_str("content changed"),
            Self::Deleted => f.write_str("deleted"),
            Self::DependencyChanged(dep) => write!(f, "dependency {dep} changed"),
            Self::Manual => f.write_str("manual"),
            Self::FullRegeneration => f.write_str("full regeneration"),
        }
    }
}

/// Limits for the two stores inside an [`ArtifactCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactCacheConfig {
    /// Analysis store limits
    pub analyses: CacheConfig,
    /// Template store limits
    pub templates: CacheConfig,
}

impl Default for ArtifactCacheConfig {
    fn default() -> Self {
        Self {
            analyses: CacheConfig::default(),
            templates: CacheConfig::default()
                .with_max_size(8 * 1024 * 1024)
                .with_max_entries(500),
        }
    }
}

/// Statistics for an [`ArtifactCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactCacheStats {
    /// Analysis store
    pub analyses: CacheStats,
    /// Template store
    pub templates: CacheStats,
    /// Paths with recorded dependencies
    pub tracked_files: usize,
    /// Recorded dependency edges
    pub dependency_edges: usize,
}

/// Cache of per-file analyses and compiled templates
#[derive(Debug)]
pub struct ArtifactCache {
    analyses: ContentAddressableCache<AnalysisArtifact>,
    templates: ContentAddressableCache<CompiledTemplate>,
    graph: Mutex<DependencyGraph>,
}

impl ArtifactCache {
    /// Create empty cache
    #[must_use]
    pub fn new(config: ArtifactCacheConfig) -> Self {
        Self {
            analyses: ContentAddressableCache::new("analyses", config.analyses),
            templates: ContentAddressableCache::new("templates", config.templates),
            graph: Mutex::new(DependencyGraph::new()),
        }
    }

    /// Store `artifact` for `path` and record its dependencies
    ///
    /// Returns `Ok(false)` without storing when the file no longer exists or
    /// has already changed since the artifact's snapshot was taken.
    ///
    /// # Errors
    /// Returns error on I/O or serialization failures
    pub async fn set<I, S>(
        &self,
        path: impl AsRef<Path>,
        mut artifact: AnalysisArtifact,
        dependencies: I,
    ) -> Result<bool, CacheError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.as_ref();
        let Some(current) = FileMetadata::read(path).await? else {
            warn!(path = %path.display(), "not caching analysis of missing file");
            return Ok(false);
        };
        if current.hash != artifact.metadata.hash {
            debug!(path = %path.display(), "analysis already stale, not caching");
            return Ok(false);
        }

        let key = path_key(path);
        artifact.dependencies = dependencies.into_iter().map(Into::into).collect();
        let dependencies = artifact.dependencies.clone();
        let hash = artifact.metadata.hash;

        self.analyses.set(key.clone(), artifact, Some(hash))?;
        self.graph.lock().record(&key, dependencies);
        debug!(path = %key, hash = %hash.short(), "analysis cached");
        Ok(true)
    }

    /// Fetch the analysis for `path` if it still matches the live file
    ///
    /// A changed or vanished file invalidates the entry (cascading to its
    /// dependents) and yields `None`. An entry that merely expired, or whose
    /// file was touched without a content change, is dropped on its own.
    ///
    /// # Errors
    /// Returns error on I/O failures other than not-found
    pub async fn get(&self, path: impl AsRef<Path>) -> Result<Option<AnalysisArtifact>, CacheError> {
        let path = path.as_ref();
        let key = path_key(path);
        let stored = self.analyses.content_hash(&key);

        let Some(current) = FileMetadata::read(path).await? else {
            if stored.is_some() {
                self.invalidate(path, InvalidationReason::Deleted);
            }
            // counts the miss
            return Ok(self.analyses.get(&key, None));
        };

        match self.analyses.get(&key, Some(&current.hash)) {
            Some(artifact) if artifact.metadata.matches(&current) => Ok(Some(artifact)),
            Some(_) => {
                debug!(path = %key, "file touched without content change");
                self.analyses.delete(&key);
                Ok(None)
            }
            None => {
                if stored.is_some_and(|hash| hash != current.hash) {
                    self.invalidate(path, InvalidationReason::ContentChanged);
                }
                Ok(None)
            }
        }
    }

    /// Drop the analysis for `path` and every analysis depending on it
    ///
    /// Returns the paths whose analyses were actually removed.
    pub fn invalidate(&self, path: impl AsRef<Path>, reason: InvalidationReason) -> Vec<String> {
        let key = path_key(path.as_ref());
        let graph = self.graph.lock();
        let affected = graph.cascade(&key);

        let mut removed = Vec::new();
        for (depth, target) in affected.iter().enumerate() {
            if self.analyses.delete(target) {
                if depth == 0 {
                    debug!(path = %target, %reason, "invalidated");
                } else {
                    debug!(path = %target, reason = %InvalidationReason::DependencyChanged(key.clone()), "invalidated");
                }
                removed.push(target.clone());
            }
        }
        if affected.len() > 1 {
            info!(path = %key, %reason, cascaded = affected.len() - 1, removed = removed.len(), "cascade invalidation");
        }
        removed
    }

    /// Batch form of [`ArtifactCache::invalidate`]
    pub fn invalidate_files<I, P>(&self, paths: I, reason: &InvalidationReason) -> Vec<String>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut removed = Vec::new();
        for path in paths {
            removed.extend(self.invalidate(path, reason.clone()));
        }
        removed
    }

    /// Forget everything about a deleted file
    pub fn remove(&self, path: impl AsRef<Path>) -> Vec<String> {
        let path = path.as_ref();
        let removed = self.invalidate(path, InvalidationReason::Deleted);
        let key = path_key(path);
        self.templates.delete(&key);
        self.graph.lock().forget(&key);
        removed
    }

    /// Store a compiled template
    ///
    /// Returns `Ok(false)` without storing when the template file is gone.
    ///
    /// # Errors
    /// Returns error on I/O or serialization failures
    pub async fn set_template(
        &self,
        path: impl AsRef<Path>,
        template: CompiledTemplate,
    ) -> Result<bool, CacheError> {
        let path = path.as_ref();
        if FileMetadata::read(path).await?.is_none() {
            warn!(path = %path.display(), "not caching missing template");
            return Ok(false);
        }
        let hash = template.source_hash;
        self.templates.set(path_key(path), template, Some(hash))?;
        Ok(true)
    }

    /// Fetch a compiled template if its source is unchanged
    ///
    /// # Errors
    /// Returns error on I/O failures other than not-found
    pub async fn get_template(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Option<CompiledTemplate>, CacheError> {
        let path = path.as_ref();
        let key = path_key(path);
        match FileMetadata::read(path).await? {
            Some(current) => Ok(self.templates.get(&key, Some(&current.hash))),
            None => {
                self.templates.delete(&key);
                Ok(self.templates.get(&key, None))
            }
        }
    }

    /// Drop one compiled template; analyses are untouched
    pub fn invalidate_template(&self, path: impl AsRef<Path>) -> bool {
        let removed = self.templates.delete(&path_key(path.as_ref()));
        if removed {
            debug!(path = %path.as_ref().display(), "template invalidated");
        }
        removed
    }

    /// Batch form of [`ArtifactCache::invalidate_template`]
    pub fn invalidate_templates<I, P>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths
            .into_iter()
            .filter(|path| self.invalidate_template(path))
            .count()
    }

    /// Paths that depend on `path` directly
    #[must_use]
    pub fn dependents_of(&self, path: impl AsRef<Path>) -> Vec<String> {
        self.graph.lock().dependents(&path_key(path.as_ref()))
    }

    /// Paths `path` depends on directly
    #[must_use]
    pub fn dependencies_of(&self, path: impl AsRef<Path>) -> Vec<String> {
        self.graph.lock().dependencies(&path_key(path.as_ref()))
    }

    /// Whether an analysis is stored for `path` (no live validation)
    #[must_use]
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.analyses.has(&path_key(path.as_ref()))
    }

    /// Paths with a stored analysis, least recently used first
    #[must_use]
    pub fn cached_paths(&self) -> Vec<String> {
        self.analyses.keys()
    }

    /// Number of stored analyses
    #[must_use]
    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    /// Whether no analysis is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }

    /// Sweep expired analyses and templates
    pub fn cleanup(&self) -> usize {
        self.analyses.cleanup() + self.templates.cleanup()
    }

    /// Drop all analyses, templates and dependency edges
    pub fn clear(&self) {
        self.graph.lock().clear();
        self.analyses.clear();
        self.templates.clear();
        info!("artifact cache cleared");
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> ArtifactCacheStats {
        let graph = self.graph.lock();
        ArtifactCacheStats {
            analyses: self.analyses.stats(),
            templates: self.templates.stats(),
            tracked_files: graph.node_count(),
            dependency_edges: graph.edge_count(),
        }
    }
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new(ArtifactCacheConfig::default())
    }
}
