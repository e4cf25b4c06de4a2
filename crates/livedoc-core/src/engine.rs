//! The livedoc engine
//!
//! [`Livedoc`] owns one instance of every component for a project root and
//! wires them together:
//!
//! - change events flow into the [`UpdateScheduler`], which invalidates the
//!   caches and drives the [`RegenerationPipeline`]
//! - regenerated documents are queued with the [`SyncCoordinator`], flushed
//!   to clients by a [`SyncWorker`]
//! - completed operations are relayed to clients as `status` messages
//! - a [`CacheHealthMonitor`] samples everything periodically
//!
//! Nothing is global: two engines in one process share no state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use livedoc_cache::{
    normalize_path, path_key, AnalysisArtifact, ArtifactCache, ArtifactCacheStats, CacheStats,
    ProjectSnapshot, ProjectSnapshotCache,
};
use livedoc_scheduler::{
    ChangeEvent, ChangeKind, SchedulerEvent, SchedulerHandle, SchedulerState, SectionDependency,
    SectionRegistry, UpdateScheduler, UpdateStats,
};
use livedoc_sync::{
    ClientTransport, DocumentUpdate, QueueOutcome, Resolution, SyncCoordinator, SyncStats,
    SyncWorker,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analyzer::{Analyzer, SourceStatsAnalyzer};
use crate::config::LivedocConfig;
use crate::error::LivedocError;
use crate::health::{CacheHealthMonitor, HealthInputs, HealthReport, HealthSource};
use crate::pipeline::RegenerationPipeline;
use crate::renderer::{MarkdownRenderer, Renderer};
use crate::service::AnalysisService;

/// Point-in-time statistics of every component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivedocStats {
    /// Analyses, templates and dependency graph
    pub artifacts: ArtifactCacheStats,
    /// Project snapshots
    pub snapshots: CacheStats,
    /// Scheduler history summary
    pub updates: UpdateStats,
    /// Client sync
    pub sync: SyncStats,
    /// Current batching state
    pub scheduler: SchedulerState,
    /// Registered sections
    pub sections: usize,
}

/// Result of [`Livedoc::scan`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Scanned root
    pub root: PathBuf,
    /// Files in the project manifest
    pub files: usize,
    /// Wall time of the scan
    pub elapsed_ms: u64,
    /// Aggregate analysis
    pub snapshot: ProjectSnapshot,
}

/// Reads component statistics for the health monitor
struct EngineMetrics {
    artifacts: Arc<ArtifactCache>,
    snapshots: Arc<ProjectSnapshotCache>,
    scheduler: SchedulerHandle,
    sync: Arc<SyncCoordinator>,
}

impl HealthSource for EngineMetrics {
    fn health_inputs(&self) -> HealthInputs {
        let artifacts = self.artifacts.stats();
        HealthInputs {
            analyses: artifacts.analyses,
            templates: artifacts.templates,
            snapshots: self.snapshots.stats(),
            updates: Some(self.scheduler.stats()),
            sync: Some(self.sync.stats()),
        }
    }
}

#[derive(Default)]
struct Background {
    sync_worker: Option<SyncWorker>,
    monitor: Option<JoinHandle<()>>,
    relay: Option<JoinHandle<()>>,
}

/// Builder for [`Livedoc`]
pub struct LivedocBuilder {
    root: PathBuf,
    config: LivedocConfig,
    analyzer: Option<Arc<dyn Analyzer>>,
    renderer: Option<Arc<dyn Renderer>>,
    background: bool,
}

impl LivedocBuilder {
    /// Start building an engine for `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: LivedocConfig::default(),
            analyzer: None,
            renderer: None,
            background: true,
        }
    }

    /// With configuration
    #[must_use]
    pub fn config(mut self, config: LivedocConfig) -> Self {
        self.config = config;
        self
    }

    /// With analyzer (default: [`SourceStatsAnalyzer`])
    #[must_use]
    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// With renderer (default: [`MarkdownRenderer`] under `project.output_dir`)
    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Whether periodic sync flushing and health sampling run
    ///
    /// With `false` the caller drives [`Livedoc::flush_sync`] and
    /// [`Livedoc::get_health_report`] itself.
    #[must_use]
    pub fn background(mut self, enabled: bool) -> Self {
        self.background = enabled;
        self
    }

    /// Construct and start the engine on the current runtime
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the default analyzer
    /// cannot be built
    pub fn build(self) -> Result<Livedoc, LivedocError> {
        let Self {
            root,
            config,
            analyzer,
            renderer,
            background,
        } = self;
        config.validate()?;

        let analyzer: Arc<dyn Analyzer> = match analyzer {
            Some(analyzer) => analyzer,
            None => Arc::new(SourceStatsAnalyzer::new()?),
        };
        let renderer: Arc<dyn Renderer> = match renderer {
            Some(renderer) => renderer,
            None => Arc::new(MarkdownRenderer::new(config.project.output_dir.clone())),
        };

        let artifacts = Arc::new(ArtifactCache::new(config.cache.artifacts()));
        let snapshots = Arc::new(
            ProjectSnapshotCache::new(config.cache.snapshots)
                .with_hash_concurrency(config.project.hash_concurrency),
        );
        let sections = Arc::new(SectionRegistry::new());
        let sync = Arc::new(SyncCoordinator::new(config.sync.clone()));

        let service = Arc::new(
            AnalysisService::new(
                root.clone(),
                Arc::clone(&artifacts),
                Arc::clone(&snapshots),
                analyzer,
                renderer,
            )
            .with_ignore(config.project.ignore.clone()),
        );
        let pipeline = RegenerationPipeline::new(
            Arc::clone(&service),
            Arc::clone(&sections),
            Arc::clone(&sync),
        );
        let scheduler = UpdateScheduler::new(
            config.scheduler.clone(),
            Arc::clone(&artifacts),
            Arc::clone(&snapshots),
        )
        .with_regenerator(Arc::new(pipeline))
        .with_sections(Arc::clone(&sections))
        .spawn();

        let monitor = Arc::new(CacheHealthMonitor::new(
            config.health.clone(),
            Arc::new(EngineMetrics {
                artifacts: Arc::clone(&artifacts),
                snapshots: Arc::clone(&snapshots),
                scheduler: scheduler.clone(),
                sync: Arc::clone(&sync),
            }),
        ));

        let mut tasks = Background {
            relay: Some(spawn_status_relay(&scheduler, Arc::clone(&sync))),
            ..Background::default()
        };
        if background {
            tasks.sync_worker = Some(SyncWorker::spawn(Arc::clone(&sync)));
            tasks.monitor = Some(monitor.spawn());
        }

        info!(root = %root.display(), background, "livedoc engine started");
        Ok(Livedoc {
            root,
            config,
            artifacts,
            snapshots,
            sections,
            service,
            scheduler,
            sync,
            monitor,
            background: Mutex::new(Some(tasks)),
        })
    }
}

/// Forward completed operations to clients as `status` messages
fn spawn_status_relay(scheduler: &SchedulerHandle, sync: Arc<SyncCoordinator>) -> JoinHandle<()> {
    let mut events = scheduler.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SchedulerEvent::OperationCompleted(operation)) => {
                    match serde_json::to_value(&operation) {
                        Ok(data) => {
                            sync.broadcast_status(data);
                        }
                        Err(err) => warn!(error = %err, "cannot encode operation status"),
                    }
                }
                Ok(SchedulerEvent::BatchStarted { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "status relay lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Live documentation engine for one project root
pub struct Livedoc {
    root: PathBuf,
    config: LivedocConfig,
    artifacts: Arc<ArtifactCache>,
    snapshots: Arc<ProjectSnapshotCache>,
    sections: Arc<SectionRegistry>,
    service: Arc<AnalysisService>,
    scheduler: SchedulerHandle,
    sync: Arc<SyncCoordinator>,
    monitor: Arc<CacheHealthMonitor>,
    background: Mutex<Option<Background>>,
}

impl std::fmt::Debug for Livedoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Livedoc")
            .field("root", &self.root)
            .field("scheduler", &self.scheduler.state())
            .field("sections", &self.sections.len())
            .finish_non_exhaustive()
    }
}

impl Livedoc {
    /// Start building an engine for `root`
    #[must_use]
    pub fn builder(root: impl Into<PathBuf>) -> LivedocBuilder {
        LivedocBuilder::new(root)
    }

    /// Project root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &LivedocConfig {
        &self.config
    }

    /// Artifact cache
    #[inline]
    #[must_use]
    pub fn artifacts(&self) -> &Arc<ArtifactCache> {
        &self.artifacts
    }

    /// Snapshot cache
    #[inline]
    #[must_use]
    pub fn snapshots(&self) -> &Arc<ProjectSnapshotCache> {
        &self.snapshots
    }

    /// Scheduler handle
    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Sync coordinator
    #[inline]
    #[must_use]
    pub fn sync(&self) -> &Arc<SyncCoordinator> {
        &self.sync
    }

    /// Health monitor
    #[inline]
    #[must_use]
    pub fn monitor(&self) -> &Arc<CacheHealthMonitor> {
        &self.monitor
    }

    /// Paths are taken relative to the root unless absolute
    #[must_use]
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.root.join(path))
        }
    }

    /// Analysis of `path`, re-analyzing lazily on a miss
    ///
    /// # Errors
    /// Returns error if the analyzer fails or the file cannot be read
    pub async fn get_analysis(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Option<AnalysisArtifact>, LivedocError> {
        self.service.analysis(&self.resolve(path)).await
    }

    /// Cached analysis of `path` without analyzing on a miss
    ///
    /// # Errors
    /// Returns error on I/O failures other than not-found
    pub async fn cached_analysis(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Option<AnalysisArtifact>, LivedocError> {
        Ok(self.artifacts.get(self.resolve(path)).await?)
    }

    /// Aggregate analysis of the project at `path`
    ///
    /// # Errors
    /// Returns error if walking or analysis fails
    pub async fn get_project_analysis(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ProjectSnapshot, LivedocError> {
        self.service.project(&self.resolve(path)).await
    }

    /// Statistics of every component
    #[must_use]
    pub fn get_stats(&self) -> LivedocStats {
        LivedocStats {
            artifacts: self.artifacts.stats(),
            snapshots: self.snapshots.stats(),
            updates: self.scheduler.stats(),
            sync: self.sync.stats(),
            scheduler: self.scheduler.state(),
            sections: self.sections.len(),
        }
    }

    /// Fresh health sample folded into a report
    #[must_use]
    pub fn get_health_report(&self) -> HealthReport {
        self.monitor.sample();
        self.monitor.report()
    }

    /// Analyze the whole project, warming every cache
    ///
    /// # Errors
    /// Returns error if walking or analysis fails
    pub async fn scan(&self) -> Result<ScanSummary, LivedocError> {
        let started = Instant::now();
        let snapshot = self.service.project(&self.root).await?;
        let summary = ScanSummary {
            root: self.root.clone(),
            files: snapshot.manifest.len(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            snapshot,
        };
        info!(files = summary.files, elapsed_ms = summary.elapsed_ms, "project scanned");
        Ok(summary)
    }

    /// Register a section, resolving its paths against the root
    pub fn register_section(&self, mut section: SectionDependency) {
        section.dependent_files = section
            .dependent_files
            .iter()
            .map(|file| path_key(&self.resolve(file)))
            .collect();
        section.template_id = section
            .template_id
            .map(|template| path_key(&self.resolve(template)));
        debug!(section = %section.id, files = section.dependent_files.len(), "section registered");
        self.sections.register(section);
    }

    /// Remove a section
    pub fn unregister_section(&self, id: &str) -> bool {
        self.sections.unregister(id).is_some()
    }

    /// Feed watcher events to the scheduler
    ///
    /// # Errors
    /// Returns error after shutdown
    pub fn submit_changes(&self, events: Vec<ChangeEvent>) -> Result<(), LivedocError> {
        let events = events
            .into_iter()
            .map(|mut event| {
                event.path = self.resolve(&event.path);
                if let ChangeKind::Renamed { from } = &mut event.kind {
                    *from = self.resolve(&*from);
                }
                event
            })
            .collect();
        Ok(self.scheduler.submit(events)?)
    }

    /// Execute the pending batch now and wait for it
    ///
    /// # Errors
    /// Returns error after shutdown
    pub async fn flush_changes(&self) -> Result<(), LivedocError> {
        Ok(self.scheduler.flush().await?)
    }

    /// Queue a user edit of a published document
    #[must_use]
    pub fn publish_manual_edit(
        &self,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> QueueOutcome {
        self.sync.queue_update(DocumentUpdate::manual(path, content))
    }

    /// Resolve a pending conflict
    ///
    /// # Errors
    /// Returns error if the conflict is unknown or already resolved
    pub fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        resolution: Resolution,
    ) -> Result<DocumentUpdate, LivedocError> {
        Ok(self.sync.resolve(conflict_id, resolution)?)
    }

    /// Broadcast queued documents now
    ///
    /// # Errors
    /// Returns error if a document cannot be encoded
    pub fn flush_sync(&self) -> Result<usize, LivedocError> {
        Ok(self.sync.flush()?.broadcast)
    }

    /// Attach a client
    pub fn register_client(&self, transport: Arc<dyn ClientTransport>) -> Uuid {
        self.sync.register_client(transport)
    }

    /// Drain pending work and stop every background task
    ///
    /// # Errors
    /// Returns error if the scheduler already stopped
    pub async fn shutdown(&self) -> Result<(), LivedocError> {
        let result = self.scheduler.shutdown().await;
        let tasks = self.background.lock().take();
        if let Some(tasks) = tasks {
            if let Some(relay) = tasks.relay {
                relay.abort();
            }
            if let Some(monitor) = tasks.monitor {
                monitor.abort();
            }
            if let Some(worker) = tasks.sync_worker {
                worker.shutdown().await;
            }
        }
        info!(root = %self.root.display(), "livedoc engine stopped");
        Ok(result?)
    }
}

impl Drop for Livedoc {
    fn drop(&mut self) {
        if let Some(tasks) = self.background.get_mut().take() {
            if let Some(relay) = tasks.relay {
                relay.abort();
            }
            if let Some(monitor) = tasks.monitor {
                monitor.abort();
            }
        }
    }
}
