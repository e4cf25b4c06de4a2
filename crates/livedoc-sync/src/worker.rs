//! Background flush and heartbeat driver

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error};

use crate::coordinator::SyncCoordinator;

/// Periodically flushes the queue and sends heartbeats
///
/// Stops on [`SyncWorker::shutdown`], which drains the queue one last time.
/// Dropping the worker aborts it without draining.
#[derive(Debug)]
pub struct SyncWorker {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SyncWorker {
    /// Start on the current runtime using the coordinator's intervals
    #[must_use]
    pub fn spawn(coordinator: Arc<SyncCoordinator>) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let flush_every = coordinator.config().flush_interval().max(Duration::from_millis(1));
        let heartbeat_every = coordinator
            .config()
            .heartbeat_interval()
            .max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut flush = time::interval_at(Instant::now() + flush_every, flush_every);
            flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut heartbeat = time::interval_at(Instant::now() + heartbeat_every, heartbeat_every);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = flush.tick() => {
                        if let Err(err) = coordinator.flush() {
                            error!(error = %err, "periodic flush failed");
                        }
                    }
                    _ = heartbeat.tick() => {
                        coordinator.heartbeat();
                    }
                }
            }

            if let Err(err) = coordinator.flush() {
                error!(error = %err, "final flush failed");
            }
            debug!("sync worker stopped");
        });

        Self {
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Stop after a final flush
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!(error = %err, "sync worker task failed");
            }
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
