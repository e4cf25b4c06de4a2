use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use livedoc_core::cache::InvalidationReason;
use livedoc_core::scheduler::{ChangeEvent, SchedulerConfig, SchedulerEvent, SectionDependency, UpdateType};
use livedoc_core::sync::{DocumentUpdate, MessageType, QueueOutcome, Resolution, UpdateSource};
use livedoc_core::{Livedoc, LivedocConfig};
use livedoc_test_utils::{CannedAnalyzer, RecordingTransport, TempProject};
use pretty_assertions::assert_eq;

const A: &str = "src/a.ts";
const BASE: &str = "templates/base.hbs";

/// 49 modules plus `src/a.ts`, which depends on `templates/base.hbs`
fn fixture() -> (TempProject, Arc<CannedAnalyzer>) {
    let project = TempProject::with_modules(49);
    project.write(A, "export const a = 1;\n");
    project.write(BASE, "# {{title}}\n\n{{content}}\n");

    let analyzer = Arc::new(CannedAnalyzer::new(["ts"]));
    analyzer.depends(project.key(A), vec![project.key(BASE)]);
    (project, analyzer)
}

fn config() -> LivedocConfig {
    LivedocConfig::default()
        .with_scheduler(SchedulerConfig::default().with_batch_window(Duration::from_millis(20)))
}

fn engine(project: &TempProject, analyzer: &Arc<CannedAnalyzer>) -> Livedoc {
    Livedoc::builder(project.root())
        .config(config())
        .analyzer(analyzer.clone())
        .background(false)
        .build()
        .unwrap()
}

fn last_update_type(livedoc: &Livedoc) -> UpdateType {
    livedoc.scheduler().recent(1)[0].update_type
}

#[tokio::test]
async fn test_example_scenario_end_to_end() {
    let (project, analyzer) = fixture();
    let livedoc = engine(&project, &analyzer);

    // cold cache
    assert!(livedoc.cached_analysis(A).await.unwrap().is_none());
    let summary = livedoc.scan().await.unwrap();
    assert_eq!(summary.files, 50);
    assert_eq!(livedoc.get_stats().artifacts.analyses.entry_count, 50);
    assert_eq!(livedoc.artifacts().dependencies_of(project.path(A)), vec![project.key(BASE)]);

    // a.ts changes among 50 cached files
    project.write(A, "export const a = 2;\n");
    livedoc.submit_changes(vec![ChangeEvent::modified(A)]).unwrap();
    livedoc.flush_changes().await.unwrap();
    assert_eq!(last_update_type(&livedoc), UpdateType::IncrementalUpdate);
    assert!(livedoc.cached_analysis(A).await.unwrap().is_none());
    assert_eq!(analyzer.calls(&project.path(A)), 1);

    let reanalyzed = livedoc.get_analysis(A).await.unwrap().unwrap();
    assert_eq!(reanalyzed.analysis["content"], "export const a = 2;\n");
    assert_eq!(analyzer.calls(&project.path(A)), 2);

    // the template changes
    project.write(BASE, "## {{title}}\n\n{{content}}\n");
    livedoc.submit_changes(vec![ChangeEvent::modified(BASE)]).unwrap();
    livedoc.flush_changes().await.unwrap();
    assert_eq!(last_update_type(&livedoc), UpdateType::TemplateRefresh);
    assert!(livedoc.artifacts().contains(project.path(A)));
    assert_eq!(livedoc.cached_analysis(A).await.unwrap(), Some(reanalyzed));
    assert_eq!(analyzer.calls(&project.path(A)), 2);

    // an auto write followed 500ms later by a manual edit
    let client = Arc::new(RecordingTransport::new());
    livedoc.register_client(client.clone());
    let written_at = Utc::now();
    let auto = DocumentUpdate::auto("docs/a.md", "generated").with_timestamp(written_at);
    let manual = DocumentUpdate::manual("docs/a.md", "hand edit")
        .with_timestamp(written_at + chrono::Duration::milliseconds(500));

    assert!(matches!(livedoc.sync().queue_update(auto), QueueOutcome::Queued { dropped: None }));
    let QueueOutcome::Conflict(conflict_id) = livedoc.sync().queue_update(manual) else {
        panic!("manual edit inside the window must conflict");
    };
    assert_eq!(livedoc.sync().conflicts().len(), 1);
    assert_eq!(client.of_kind(MessageType::Conflict).len(), 1);

    let resolved = livedoc.resolve_conflict(conflict_id, Resolution::Auto).unwrap();
    assert_eq!(resolved.content, "generated");
    assert_eq!(livedoc.flush_sync().unwrap(), 1);

    let updates = client.of_kind(MessageType::Update);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].data["content"], "generated");
    assert!(livedoc.sync().conflicts().is_empty());

    livedoc.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_manual_resolution_broadcasts_manual_content_once() {
    let (project, analyzer) = fixture();
    let livedoc = engine(&project, &analyzer);
    let client = Arc::new(RecordingTransport::new());
    livedoc.register_client(client.clone());

    let generated = DocumentUpdate::auto("docs/a.md", "generated");
    let edited = DocumentUpdate::manual("docs/a.md", "hand edit")
        .with_timestamp(generated.timestamp + chrono::Duration::milliseconds(300));
    let _ = livedoc.sync().queue_update(generated);
    let QueueOutcome::Conflict(conflict_id) = livedoc.sync().queue_update(edited) else {
        panic!("expected conflict");
    };

    let resolved = livedoc.resolve_conflict(conflict_id, Resolution::Manual).unwrap();
    assert_eq!(resolved.source, UpdateSource::Manual);
    livedoc.flush_sync().unwrap();

    let updates = client.of_kind(MessageType::Update);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].data["content"], "hand edit");
    assert_eq!(livedoc.get_stats().sync.pending_conflicts, 0);
    assert!(livedoc.resolve_conflict(conflict_id, Resolution::Manual).is_err());

    livedoc.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_manual_edit_outside_window_does_not_conflict() {
    let (project, analyzer) = fixture();
    let livedoc = engine(&project, &analyzer);

    let generated = DocumentUpdate::auto("docs/a.md", "generated");
    let edited = DocumentUpdate::manual("docs/a.md", "hand edit")
        .with_timestamp(generated.timestamp + chrono::Duration::seconds(5));
    let _ = livedoc.sync().queue_update(generated);

    assert!(matches!(livedoc.sync().queue_update(edited), QueueOutcome::Queued { .. }));
    assert!(livedoc.sync().conflicts().is_empty());

    livedoc.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rapid_changes_execute_as_one_operation() {
    let (project, analyzer) = fixture();
    let livedoc = Livedoc::builder(project.root())
        .config(config().with_scheduler(
            SchedulerConfig::default().with_batch_window(Duration::from_millis(200)),
        ))
        .analyzer(analyzer.clone())
        .background(false)
        .build()
        .unwrap();
    livedoc.scan().await.unwrap();
    let mut events = livedoc.scheduler().subscribe();

    for i in 0..5 {
        project.write(A, &format!("export const a = {i};\n"));
        livedoc.submit_changes(vec![ChangeEvent::modified(A)]).unwrap();
    }

    let operation = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SchedulerEvent::OperationCompleted(operation)) = events.recv().await {
                return operation;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(operation.affected_files, vec![project.key(A)]);
    assert_eq!(livedoc.scheduler().history().len(), 1);

    livedoc.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_template_invalidation_cascades_to_dependents() {
    let (project, analyzer) = fixture();
    let livedoc = engine(&project, &analyzer);
    livedoc.scan().await.unwrap();

    let removed = livedoc
        .artifacts()
        .invalidate(project.path(BASE), InvalidationReason::ContentChanged);

    assert!(removed.contains(&project.key(A)));
    assert!(!livedoc.artifacts().contains(project.path(A)));
    assert_eq!(livedoc.get_stats().artifacts.analyses.entry_count, 49);

    livedoc.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_section_regeneration_publishes_document() {
    let (project, analyzer) = fixture();
    let livedoc = engine(&project, &analyzer);
    livedoc.scan().await.unwrap();
    livedoc.register_section(SectionDependency::new("a").with_files([A]).with_template(BASE));
    let client = Arc::new(RecordingTransport::new());
    livedoc.register_client(client.clone());

    project.write(A, "export const a = 42;\n");
    livedoc.submit_changes(vec![ChangeEvent::modified(A)]).unwrap();
    livedoc.flush_changes().await.unwrap();

    assert_eq!(last_update_type(&livedoc), UpdateType::SectionUpdate);
    assert_eq!(livedoc.flush_sync().unwrap(), 1);
    let updates = client.of_kind(MessageType::Update);
    assert_eq!(updates[0].data["path"], "docs/a.md");
    assert!(updates[0].data["content"].as_str().unwrap().starts_with("# a"));

    livedoc.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_deleted_file_leaves_project_analysis() {
    let (project, analyzer) = fixture();
    let livedoc = engine(&project, &analyzer);
    livedoc.scan().await.unwrap();

    project.remove("src/mod_0.ts");
    livedoc
        .submit_changes(vec![ChangeEvent::deleted("src/mod_0.ts")])
        .unwrap();
    livedoc.flush_changes().await.unwrap();

    assert!(!livedoc.artifacts().contains(project.path("src/mod_0.ts")));
    let snapshot = livedoc.get_project_analysis(".").await.unwrap();
    assert_eq!(snapshot.manifest.len(), 49);

    livedoc.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_added_file_rebuilds_project_analysis() {
    let project = TempProject::with_modules(10);
    let analyzer = Arc::new(CannedAnalyzer::new(["ts"]));
    let livedoc = engine(&project, &analyzer);
    assert_eq!(livedoc.scan().await.unwrap().files, 10);

    project.write("src/new.ts", "export const fresh = true;\n");
    livedoc
        .submit_changes(vec![ChangeEvent::added("src/new.ts")])
        .unwrap();
    livedoc.flush_changes().await.unwrap();

    let snapshot = livedoc.get_project_analysis(project.root()).await.unwrap();
    assert_eq!(snapshot.manifest.len(), 11);
    assert!(snapshot.manifest.contains_key(&project.key("src/new.ts")));

    livedoc.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_renamed_file_rebuilds_project_analysis() {
    let project = TempProject::with_modules(10);
    let analyzer = Arc::new(CannedAnalyzer::new(["ts"]));
    let livedoc = engine(&project, &analyzer);
    livedoc.scan().await.unwrap();

    let content = std::fs::read_to_string(project.path("src/mod_0.ts")).unwrap();
    project.remove("src/mod_0.ts");
    project.write("src/renamed.ts", &content);
    livedoc
        .submit_changes(vec![ChangeEvent::renamed("src/mod_0.ts", "src/renamed.ts")])
        .unwrap();
    livedoc.flush_changes().await.unwrap();

    let snapshot = livedoc.get_project_analysis(".").await.unwrap();
    assert_eq!(snapshot.manifest.len(), 10);
    assert!(snapshot.manifest.contains_key(&project.key("src/renamed.ts")));
    assert!(!snapshot.manifest.contains_key(&project.key("src/mod_0.ts")));

    livedoc.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_health_report_after_warm_reads() {
    let (project, analyzer) = fixture();
    let livedoc = engine(&project, &analyzer);
    livedoc.scan().await.unwrap();
    for _ in 0..3 {
        livedoc.get_analysis(A).await.unwrap();
    }

    let report = livedoc.get_health_report();
    let latest = report.latest.unwrap();
    assert_eq!(report.sample_count, 1);
    assert!(latest.hit_rate.is_some());
    assert!(!livedoc.monitor().export_csv().unwrap().is_empty());

    livedoc.shutdown().await.unwrap();
}
