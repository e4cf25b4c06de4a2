//! Cache-backed access to analyses, templates and rendered output
//!
//! Every read goes through the caches first; a miss runs the collaborator
//! and stores the result. Metadata is captured before the analyzer runs so
//! a file changing mid-analysis is never cached under its new hash.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use livedoc_cache::{
    normalize_path, path_key, AnalysisArtifact, ArtifactCache, CompiledTemplate, ContentHash,
    FileManifest, FileMetadata, ProjectSnapshot, ProjectSnapshotCache,
};
use livedoc_scheduler::SectionDependency;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::analyzer::Analyzer;
use crate::error::LivedocError;
use crate::renderer::{RenderedDocument, Renderer};

const ANALYSIS_CONCURRENCY: usize = 8;

/// Analyses, templates and documents for one project root
pub struct AnalysisService {
    root: PathBuf,
    ignore: Vec<String>,
    artifacts: Arc<ArtifactCache>,
    snapshots: Arc<ProjectSnapshotCache>,
    analyzer: Arc<dyn Analyzer>,
    renderer: Arc<dyn Renderer>,
}

impl std::fmt::Debug for AnalysisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisService")
            .field("root", &self.root)
            .field("ignore", &self.ignore)
            .finish_non_exhaustive()
    }
}

impl AnalysisService {
    /// Create service
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        artifacts: Arc<ArtifactCache>,
        snapshots: Arc<ProjectSnapshotCache>,
        analyzer: Arc<dyn Analyzer>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            root: root.into(),
            ignore: Vec::new(),
            artifacts,
            snapshots,
            analyzer,
            renderer,
        }
    }

    /// Directory names skipped while walking
    #[must_use]
    pub fn with_ignore(mut self, ignore: Vec<String>) -> Self {
        self.ignore = ignore;
        self
    }

    /// Project root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cached analysis of `path`, analyzing on a miss
    ///
    /// Returns `None` for missing or unsupported files.
    ///
    /// # Errors
    /// Returns error if the analyzer fails or the file cannot be read
    pub async fn analysis(&self, path: &Path) -> Result<Option<AnalysisArtifact>, LivedocError> {
        if let Some(hit) = self.artifacts.get(path).await? {
            return Ok(Some(hit));
        }
        if !self.analyzer.supports(path) {
            return Ok(None);
        }

        let Some(metadata) = FileMetadata::read(path).await? else {
            return Ok(None);
        };
        let result = match self.analyzer.analyze(path).await {
            Ok(result) => result,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let artifact = AnalysisArtifact::new(metadata, result.analysis)
            .with_dependencies(result.dependencies.clone());
        if !self
            .artifacts
            .set(path, artifact.clone(), result.dependencies)
            .await?
        {
            debug!(path = %path.display(), "file changed during analysis, result not cached");
        }
        Ok(Some(artifact))
    }

    /// Supported files under `dir`, sorted
    ///
    /// # Errors
    /// Returns error if a directory cannot be read
    pub async fn source_files(&self, dir: &Path) -> Result<Vec<PathBuf>, LivedocError> {
        let dir = dir.to_path_buf();
        let ignore = self.ignore.clone();
        let analyzer = Arc::clone(&self.analyzer);

        let files = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>, walkdir::Error> {
            let keep = |entry: &DirEntry| {
                entry.depth() == 0
                    || !entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| ignore.iter().any(|skip| skip == name))
            };
            let mut files = Vec::new();
            for entry in WalkDir::new(&dir).into_iter().filter_entry(keep) {
                let entry = entry?;
                if entry.file_type().is_file() && analyzer.supports(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            files.sort();
            Ok(files)
        })
        .await??;

        debug!(files = files.len(), "project walked");
        Ok(files)
    }

    /// Aggregate analysis of the project under `dir`
    ///
    /// Served from the snapshot cache while every manifest file is unchanged;
    /// otherwise every supported file is (re)analyzed and a new snapshot is
    /// stored.
    ///
    /// # Errors
    /// Returns error if walking, analysis or aggregation fails
    pub async fn project(&self, dir: &Path) -> Result<ProjectSnapshot, LivedocError> {
        if let Some(snapshot) = self.snapshots.get_snapshot(dir).await? {
            return Ok(snapshot);
        }

        let files = self.source_files(dir).await?;
        let artifacts: Vec<AnalysisArtifact> = stream::iter(files)
            .map(|file| async move { self.analysis(&file).await })
            .buffered(ANALYSIS_CONCURRENCY)
            .try_filter_map(|artifact| async move { Ok(artifact) })
            .try_collect()
            .await?;

        let manifest: FileManifest = artifacts
            .iter()
            .map(|artifact| (path_key(&artifact.path), artifact.metadata.hash))
            .collect();
        let aggregate = self.analyzer.analyze_project(dir, &artifacts).await?;
        let snapshot = self.snapshots.set_snapshot(dir, aggregate, manifest)?;
        info!(project = %dir.display(), files = artifacts.len(), "project analysis rebuilt");
        Ok(snapshot)
    }

    /// Compiled template for `path`, compiling on a miss
    ///
    /// # Errors
    /// Returns error if the template cannot be read or compiled
    pub async fn template(&self, path: &Path) -> Result<Option<CompiledTemplate>, LivedocError> {
        if let Some(hit) = self.artifacts.get_template(path).await? {
            return Ok(Some(hit));
        }
        let source = match tokio::fs::read_to_string(path).await {
            Ok(source) => source,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(livedoc_cache::CacheError::io(path, err).into()),
        };
        let compiled = self.renderer.compile_template(path, &source)?;
        let template = CompiledTemplate::new(path, ContentHash::of_str(&source), compiled);
        self.artifacts.set_template(path, template.clone()).await?;
        debug!(path = %path.display(), "template compiled");
        Ok(Some(template))
    }

    /// Render one section from its files and template
    ///
    /// # Errors
    /// Returns error if analysis or rendering fails
    pub async fn render_section(&self, section: &SectionDependency) -> Result<RenderedDocument, LivedocError> {
        let mut artifacts = Vec::with_capacity(section.dependent_files.len());
        for file in &section.dependent_files {
            if let Some(artifact) = self.analysis(&self.resolve(file)).await? {
                artifacts.push(artifact);
            }
        }
        let template = match &section.template_id {
            Some(template) => self.template(&self.resolve(template)).await?,
            None => None,
        };
        Ok(self
            .renderer
            .render_section(section, &artifacts, template.as_ref())
            .await?)
    }

    /// Render the project overview
    ///
    /// # Errors
    /// Returns error if analysis or rendering fails
    pub async fn render_project(&self) -> Result<RenderedDocument, LivedocError> {
        let snapshot = self.project(&self.root).await?;
        Ok(self.renderer.render_project(&snapshot).await?)
    }

    /// Section paths are relative to the root unless absolute
    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.root.join(path))
        }
    }
}
