//! Scheduler-driven regeneration
//!
//! [`RegenerationPipeline`] is the [`Regenerator`] the engine hands to the
//! scheduler: it re-renders what a batch touched and queues the output with
//! the sync coordinator as automatic updates.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use livedoc_cache::path_key;
use livedoc_scheduler::{RegenerationError, Regenerator, SectionDependency, SectionRegistry};
use livedoc_sync::{DocumentUpdate, QueueOutcome, SyncCoordinator, UpdateScope};
use tracing::{debug, info, warn};

use crate::renderer::RenderedDocument;
use crate::service::AnalysisService;

/// Renders sections and publishes them as automatic updates
#[derive(Debug, Clone)]
pub struct RegenerationPipeline {
    service: Arc<AnalysisService>,
    sections: Arc<SectionRegistry>,
    sync: Arc<SyncCoordinator>,
}

impl RegenerationPipeline {
    /// Create pipeline
    #[must_use]
    pub fn new(
        service: Arc<AnalysisService>,
        sections: Arc<SectionRegistry>,
        sync: Arc<SyncCoordinator>,
    ) -> Self {
        Self {
            service,
            sections,
            sync,
        }
    }

    fn publish(&self, document: RenderedDocument, scope: UpdateScope) -> QueueOutcome {
        let path = document.path.clone();
        let outcome = self
            .sync
            .queue_update(DocumentUpdate::auto(document.path, document.content).with_scope(scope));
        match outcome {
            QueueOutcome::Queued { .. } => debug!(%path, "document queued"),
            QueueOutcome::Conflict(id) | QueueOutcome::ConflictUpdated(id) => {
                warn!(%path, conflict = %id, "generated document conflicts with a manual edit");
            }
        }
        outcome
    }

    async fn render_and_publish(&self, section: &SectionDependency) -> Result<(), RegenerationError> {
        let document = self.service.render_section(section).await?;
        self.publish(document, UpdateScope::File);
        Ok(())
    }

    fn uses_template(&self, section: &SectionDependency, template: &str) -> bool {
        section
            .template_id
            .as_deref()
            .is_some_and(|id| id == template || path_key(&self.service.root().join(id)) == template)
    }
}

#[async_trait]
impl Regenerator for RegenerationPipeline {
    async fn regenerate_all(&self) -> Result<(), RegenerationError> {
        let overview = self.service.render_project().await?;
        self.publish(overview, UpdateScope::Project);

        let sections = self.sections.all();
        for section in &sections {
            self.render_and_publish(section).await?;
        }
        info!(sections = sections.len(), "full regeneration published");
        Ok(())
    }

    async fn regenerate_section(&self, section: &SectionDependency) -> Result<(), RegenerationError> {
        self.render_and_publish(section).await
    }

    async fn refresh_templates(&self, templates: &[String]) -> Result<(), RegenerationError> {
        for template in templates {
            if self.service.template(Path::new(template)).await?.is_none() {
                debug!(%template, "template removed, nothing to recompile");
            }
        }

        let affected: Vec<SectionDependency> = self
            .sections
            .all()
            .into_iter()
            .filter(|section| templates.iter().any(|t| self.uses_template(section, t)))
            .collect();
        for section in &affected {
            self.render_and_publish(section).await?;
            self.sections.mark_updated(&section.id, chrono::Utc::now());
        }
        info!(
            templates = templates.len(),
            sections = affected.len(),
            "templates refreshed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{FileAnalysis, MockAnalyzer};
    use crate::renderer::MarkdownRenderer;
    use livedoc_cache::{ArtifactCache, ProjectSnapshotCache};
    use livedoc_sync::{SyncConfig, SyncEvent};
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: std::path::PathBuf,
        pipeline: RegenerationPipeline,
        sections: Arc<SectionRegistry>,
        sync: Arc<SyncCoordinator>,
        artifacts: Arc<ArtifactCache>,
    }

    fn fixture(mut analyzer: MockAnalyzer) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(root.join("a.ts"), "export const a = 1;\n").unwrap();
        std::fs::write(root.join("base.hbs"), "# {{title}}\n\n{{content}}\n").unwrap();

        analyzer.expect_supports().returning(|path| {
            path.extension().is_some_and(|ext| ext == "ts")
        });
        let artifacts = Arc::new(ArtifactCache::default());
        let service = Arc::new(AnalysisService::new(
            &root,
            Arc::clone(&artifacts),
            Arc::new(ProjectSnapshotCache::default()),
            Arc::new(analyzer),
            Arc::new(MarkdownRenderer::default()),
        ));
        let sections = Arc::new(SectionRegistry::new());
        let sync = Arc::new(SyncCoordinator::new(SyncConfig::default()));
        let pipeline =
            RegenerationPipeline::new(service, Arc::clone(&sections), Arc::clone(&sync));
        Fixture {
            _dir: dir,
            root,
            pipeline,
            sections,
            sync,
            artifacts,
        }
    }

    #[tokio::test]
    async fn section_regeneration_queues_auto_update() {
        let mut analyzer = MockAnalyzer::new();
        analyzer
            .expect_analyze()
            .times(1)
            .returning(|_| Ok(FileAnalysis::new(json!({ "exports": 1 }))));
        let fx = fixture(analyzer);
        let section = SectionDependency::new("a").with_files([path_key(&fx.root.join("a.ts"))]);
        fx.sections.register(section.clone());

        fx.pipeline.regenerate_section(&section).await.unwrap();

        let queued = fx.sync.queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].path, "docs/a.md");
        assert!(queued[0].content.contains("exports"));
        assert!(fx.artifacts.contains(fx.root.join("a.ts")));
    }

    #[tokio::test]
    async fn analyzer_failure_fails_regeneration() {
        let mut analyzer = MockAnalyzer::new();
        analyzer.expect_analyze().returning(|path| {
            Err(crate::error::AnalysisError::Failed {
                path: path.to_path_buf(),
                message: "parser crashed".into(),
            })
        });
        let fx = fixture(analyzer);
        let section = SectionDependency::new("a").with_files([path_key(&fx.root.join("a.ts"))]);

        let err = fx.pipeline.regenerate_section(&section).await.unwrap_err();
        assert!(err.message.contains("parser crashed"));
        assert_eq!(fx.sync.queue_depth(), 0);
    }

    #[tokio::test]
    async fn template_refresh_rerenders_only_its_sections() {
        let mut analyzer = MockAnalyzer::new();
        analyzer
            .expect_analyze()
            .returning(|_| Ok(FileAnalysis::new(json!({}))));
        let fx = fixture(analyzer);
        let template = path_key(&fx.root.join("base.hbs"));
        fx.sections.register(
            SectionDependency::new("a")
                .with_files([path_key(&fx.root.join("a.ts"))])
                .with_template("base.hbs"),
        );
        fx.sections.register(SectionDependency::new("plain"));
        let mut events = fx.sync.subscribe();

        fx.pipeline.refresh_templates(&[template]).await.unwrap();

        let queued = fx.sync.queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].path, "docs/a.md");
        assert!(fx.sections.get("a").unwrap().last_updated.is_some());
        assert!(fx.sections.get("plain").unwrap().last_updated.is_none());
        assert!(matches!(events.try_recv(), Ok(SyncEvent::Queued { .. })));
    }

    #[tokio::test]
    async fn full_regeneration_publishes_overview_and_sections() {
        let mut analyzer = MockAnalyzer::new();
        analyzer
            .expect_analyze()
            .returning(|_| Ok(FileAnalysis::new(json!({ "lines": 1 }))));
        analyzer
            .expect_analyze_project()
            .times(1)
            .returning(|_, files| Ok(json!({ "files": files.len() })));
        let fx = fixture(analyzer);
        fx.sections
            .register(SectionDependency::new("a").with_files([path_key(&fx.root.join("a.ts"))]));

        fx.pipeline.regenerate_all().await.unwrap();

        let queued = fx.sync.queued();
        let paths: Vec<&str> = queued.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/index.md", "docs/a.md"]);
        assert_eq!(queued[0].scope, UpdateScope::Project);
    }
}
