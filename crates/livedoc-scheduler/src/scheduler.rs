//! Batching update scheduler
//!
//! Runs as a single task that owns the batching state machine:
//!
//! ```text
//! Idle --event--> Batching --window elapsed / flush--> Executing --> Idle
//! ```
//!
//! - Every event resets the batch window, bounded by `max_batch_wait`
//! - Only one batch executes at a time; events arriving meanwhile queue up
//!   in the command channel and form the next batch
//! - A failed or panicking batch is recorded as a failed operation and the
//!   scheduler keeps running

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use livedoc_cache::{path_key, ArtifactCache, InvalidationReason, ProjectSnapshotCache};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{RegenerationError, SchedulerError};
use crate::event::{ChangeEvent, ChangeKind};
use crate::history::{OperationHistory, UpdateOperation, UpdateStats};
use crate::section::{SectionDependency, SectionRegistry};
use crate::strategy::{select_strategy, UpdateType};

/// Seam to the analyzer/renderer collaborators
///
/// Invalidation is done by the scheduler itself; implementations only
/// produce fresh output. Every method defaults to doing nothing.
#[async_trait]
pub trait Regenerator: Send + Sync {
    /// Rebuild all documentation after the caches were cleared
    async fn regenerate_all(&self) -> Result<(), RegenerationError> {
        Ok(())
    }

    /// Rebuild one section
    async fn regenerate_section(&self, _section: &SectionDependency) -> Result<(), RegenerationError> {
        Ok(())
    }

    /// Recompile the given templates
    async fn refresh_templates(&self, _templates: &[String]) -> Result<(), RegenerationError> {
        Ok(())
    }
}

/// Regenerator that only invalidates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegenerator;

#[async_trait]
impl Regenerator for NoopRegenerator {}

/// Batching state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Nothing pending
    Idle,
    /// Collecting events until the window closes
    Batching,
    /// Applying a batch
    Executing,
}

/// Notification published by the scheduler
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A batch closed and is being applied
    BatchStarted {
        /// Operation id
        id: Uuid,
        /// Chosen strategy
        update_type: UpdateType,
        /// Unique changed paths
        files: usize,
    },
    /// A batch finished, successfully or not
    OperationCompleted(UpdateOperation),
}

#[derive(Debug)]
enum Command {
    Submit(Vec<ChangeEvent>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

enum Wake {
    Command(Option<Command>),
    WindowClosed,
}

#[derive(Debug, Clone, PartialEq)]
struct BatchPlan {
    update_type: UpdateType,
    changed: BTreeSet<String>,
    removed: BTreeSet<String>,
    templates: Vec<String>,
    sections: Vec<SectionDependency>,
}

/// Update scheduler, consumed by [`UpdateScheduler::spawn`]
pub struct UpdateScheduler {
    config: SchedulerConfig,
    artifacts: Arc<ArtifactCache>,
    snapshots: Arc<ProjectSnapshotCache>,
    sections: Arc<SectionRegistry>,
    regenerator: Arc<dyn Regenerator>,
    history: Arc<Mutex<OperationHistory>>,
    state: watch::Sender<SchedulerState>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateScheduler")
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl UpdateScheduler {
    /// Create scheduler over the given caches
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        artifacts: Arc<ArtifactCache>,
        snapshots: Arc<ProjectSnapshotCache>,
    ) -> Self {
        let history = Arc::new(Mutex::new(OperationHistory::new(config.history_limit)));
        let (state, _) = watch::channel(SchedulerState::Idle);
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            artifacts,
            snapshots,
            sections: Arc::new(SectionRegistry::new()),
            regenerator: Arc::new(NoopRegenerator),
            history,
            state,
            events,
        }
    }

    /// With regeneration collaborator
    #[must_use]
    pub fn with_regenerator(mut self, regenerator: Arc<dyn Regenerator>) -> Self {
        self.regenerator = regenerator;
        self
    }

    /// With a shared section registry
    #[must_use]
    pub fn with_sections(mut self, sections: Arc<SectionRegistry>) -> Self {
        self.sections = sections;
        self
    }

    /// Start the scheduler task on the current runtime
    #[must_use]
    pub fn spawn(self) -> SchedulerHandle {
        let (commands, receiver) = mpsc::unbounded_channel();
        let handle = SchedulerHandle {
            commands,
            state: self.state.subscribe(),
            history: Arc::clone(&self.history),
            events: self.events.clone(),
            sections: Arc::clone(&self.sections),
        };
        tokio::spawn(self.run(receiver));
        handle
    }

    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(
            window_ms = self.config.batch_window_ms,
            max_incremental = self.config.max_incremental_files,
            "update scheduler started"
        );
        let mut pending: Vec<ChangeEvent> = Vec::new();
        let mut opened_at: Option<Instant> = None;
        let mut deadline: Option<Instant> = None;
        let mut shutdown_ack = None;

        loop {
            let wake = match deadline {
                Some(at) => tokio::select! {
                    command = commands.recv() => Wake::Command(command),
                    () = time::sleep_until(at) => Wake::WindowClosed,
                },
                None => Wake::Command(commands.recv().await),
            };

            match wake {
                Wake::WindowClosed => {
                    self.execute_pending(&mut pending).await;
                    opened_at = None;
                    deadline = None;
                }
                Wake::Command(Some(Command::Submit(events))) => {
                    if events.is_empty() {
                        continue;
                    }
                    let now = Instant::now();
                    let opened = *opened_at.get_or_insert(now);
                    pending.extend(events);
                    deadline = Some(
                        (now + self.config.batch_window()).min(opened + self.config.max_batch_wait()),
                    );
                    self.state.send_replace(SchedulerState::Batching);
                    debug!(pending = pending.len(), "batch window extended");
                }
                Wake::Command(Some(Command::Flush(ack))) => {
                    self.execute_pending(&mut pending).await;
                    opened_at = None;
                    deadline = None;
                    let _ = ack.send(());
                }
                Wake::Command(Some(Command::Shutdown(ack))) => {
                    self.execute_pending(&mut pending).await;
                    shutdown_ack = Some(ack);
                    break;
                }
                Wake::Command(None) => {
                    self.execute_pending(&mut pending).await;
                    break;
                }
            }
        }

        drop(commands);
        self.state.send_replace(SchedulerState::Idle);
        info!("update scheduler stopped");
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    async fn execute_pending(&self, pending: &mut Vec<ChangeEvent>) {
        if pending.is_empty() {
            self.state.send_replace(SchedulerState::Idle);
            return;
        }
        let batch = std::mem::take(pending);
        self.state.send_replace(SchedulerState::Executing);
        let operation = self.execute(&batch).await;
        self.history.lock().push(operation.clone());
        let _ = self.events.send(SchedulerEvent::OperationCompleted(operation));
        self.state.send_replace(SchedulerState::Idle);
    }

    fn plan(&self, events: &[ChangeEvent]) -> BatchPlan {
        // last event per path decides whether it still exists
        let mut gone: BTreeMap<String, bool> = BTreeMap::new();
        for event in events {
            if let Some(from) = event.previous_path() {
                gone.insert(path_key(from), true);
            }
            gone.insert(event.key(), matches!(event.kind, ChangeKind::Deleted));
        }

        let changed: BTreeSet<String> = gone.keys().cloned().collect();
        let removed: BTreeSet<String> = gone
            .into_iter()
            .filter_map(|(path, deleted)| deleted.then_some(path))
            .collect();
        let templates: Vec<String> = changed
            .iter()
            .filter(|path| self.config.is_template(path))
            .cloned()
            .collect();
        let sections = self.sections.sections_for(&changed);
        let update_type =
            select_strategy(&changed, self.artifacts.len(), sections.len(), &self.config);

        BatchPlan {
            update_type,
            changed,
            removed,
            templates,
            sections,
        }
    }

    async fn execute(&self, events: &[ChangeEvent]) -> UpdateOperation {
        let plan = self.plan(events);
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            %id,
            update_type = %plan.update_type,
            files = plan.changed.len(),
            deleted = plan.removed.len(),
            sections = plan.sections.len(),
            "executing update batch"
        );
        let _ = self.events.send(SchedulerEvent::BatchStarted {
            id,
            update_type: plan.update_type,
            files: plan.changed.len(),
        });

        let error = match AssertUnwindSafe(self.apply(&plan)).catch_unwind().await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.message),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &error {
            None => info!(%id, update_type = %plan.update_type, duration_ms, "update batch completed"),
            Some(message) => error!(%id, update_type = %plan.update_type, duration_ms, error = %message, "update batch failed"),
        }

        UpdateOperation {
            id,
            update_type: plan.update_type,
            affected_files: plan.changed.into_iter().collect(),
            affected_sections: plan.sections.into_iter().map(|s| s.id).collect(),
            started_at,
            completed_at: Utc::now(),
            duration_ms,
            success: error.is_none(),
            error,
        }
    }

    async fn apply(&self, plan: &BatchPlan) -> Result<(), RegenerationError> {
        for path in &plan.removed {
            self.artifacts.remove(path);
        }
        let live: Vec<&String> = plan.changed.difference(&plan.removed).collect();
        let dropped = self
            .snapshots
            .invalidate_uncovered(plan.changed.iter().map(String::as_str));
        if dropped > 0 {
            debug!(dropped, "project snapshots invalidated");
        }

        match plan.update_type {
            UpdateType::FullRegeneration => {
                self.artifacts.clear();
                self.snapshots.clear();
                self.regenerator.regenerate_all().await?;
            }
            UpdateType::TemplateRefresh => {
                let refreshed = self.artifacts.invalidate_templates(&plan.templates);
                debug!(templates = plan.templates.len(), refreshed, "templates invalidated");
                let sources = live.iter().copied().filter(|path| !self.config.is_template(path));
                self.artifacts
                    .invalidate_files(sources, &InvalidationReason::ContentChanged);
                self.regenerator.refresh_templates(&plan.templates).await?;
            }
            UpdateType::SectionUpdate => {
                self.artifacts
                    .invalidate_files(live.iter().copied(), &InvalidationReason::ContentChanged);
                for (index, section) in plan.sections.iter().enumerate() {
                    if index > 0 {
                        time::sleep(self.config.section_delay()).await;
                    }
                    self.regenerator.regenerate_section(section).await?;
                    self.sections.mark_updated(&section.id, Utc::now());
                }
            }
            UpdateType::IncrementalUpdate => {
                self.artifacts
                    .invalidate_files(live.iter().copied(), &InvalidationReason::ContentChanged);
            }
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("regeneration panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("regeneration panicked: {message}")
    } else {
        "regeneration panicked".to_string()
    }
}

/// Cloneable handle to a running [`UpdateScheduler`]
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SchedulerState>,
    history: Arc<Mutex<OperationHistory>>,
    events: broadcast::Sender<SchedulerEvent>,
    sections: Arc<SectionRegistry>,
}

impl SchedulerHandle {
    /// Queue a batch of change events
    ///
    /// # Errors
    /// Returns [`SchedulerError::Closed`] after shutdown
    pub fn submit(&self, events: Vec<ChangeEvent>) -> Result<(), SchedulerError> {
        self.commands
            .send(Command::Submit(events))
            .map_err(|_| SchedulerError::Closed)
    }

    /// Queue one change event
    ///
    /// # Errors
    /// Returns [`SchedulerError::Closed`] after shutdown
    pub fn notify(&self, event: ChangeEvent) -> Result<(), SchedulerError> {
        self.submit(vec![event])
    }

    /// Execute the pending batch now and wait for it to complete
    ///
    /// # Errors
    /// Returns [`SchedulerError::Closed`] after shutdown
    pub async fn flush(&self) -> Result<(), SchedulerError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Flush(ack))
            .map_err(|_| SchedulerError::Closed)?;
        done.await.map_err(|_| SchedulerError::Closed)
    }

    /// Execute the pending batch and stop the scheduler
    ///
    /// # Errors
    /// Returns [`SchedulerError::Closed`] if it already stopped
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(ack))
            .map_err(|_| SchedulerError::Closed)?;
        done.await.map_err(|_| SchedulerError::Closed)
    }

    /// Whether the scheduler task is still accepting events
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Receiver for state transitions
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Subscribe to scheduler notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Retained operations, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<UpdateOperation> {
        self.history.lock().all()
    }

    /// Up to `n` newest operations, newest first
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<UpdateOperation> {
        self.history.lock().recent(n)
    }

    /// Statistics over the retained history
    #[must_use]
    pub fn stats(&self) -> UpdateStats {
        self.history.lock().stats()
    }

    /// Section registry used for strategy selection
    #[must_use]
    pub fn sections(&self) -> &Arc<SectionRegistry> {
        &self.sections
    }
}
