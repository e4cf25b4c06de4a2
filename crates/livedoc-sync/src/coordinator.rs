//! Sync coordinator
//!
//! Owns the client registry, the bounded outgoing queue and the conflict
//! table. Queue, conflicts and recent broadcasts share one mutex; clients
//! live in a `DashMap` so delivery never holds the queue lock.
//!
//! Rules:
//! - An update meeting a queued or recently broadcast update for the same
//!   path from the other source within the conflict window raises a
//!   conflict instead of being queued
//! - While a conflict is pending, new updates for its path replace the
//!   matching side and are not broadcast
//! - Overflow drops the oldest queued update and reports it as a `queue`
//!   message
//! - A flush broadcasts FIFO, keeping only the latest update per path
//! - Flushes are serialized from drain through delivery, so a client never
//!   receives an older update for a path after a newer one

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::conflict::{ConflictStatus, Resolution, SyncConflict};
use crate::error::{SyncError, TransportError};
use crate::message::{DocumentUpdate, MessageType, SyncMessage};
use crate::transport::{ClientSession, ClientTransport};

/// What happened to a queued update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Waiting for the next flush; `dropped` is the update evicted to make room
    Queued {
        /// Evicted update id
        dropped: Option<Uuid>,
    },
    /// A new conflict was raised
    Conflict(Uuid),
    /// Folded into the pending conflict for its path
    ConflictUpdated(Uuid),
}

/// Typed notifications for in-process consumers
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Client registered
    ClientRegistered(Uuid),
    /// Client removed, explicitly or after a transport error
    ClientDisconnected {
        /// Session id
        id: Uuid,
        /// Why it was removed
        reason: String,
    },
    /// Update accepted into the queue
    Queued {
        /// Update id
        id: Uuid,
        /// Document path
        path: String,
    },
    /// Oldest update evicted on overflow
    Dropped(DocumentUpdate),
    /// Conflict raised
    ConflictDetected(SyncConflict),
    /// Pending conflict received a newer side
    ConflictUpdated {
        /// Conflict id
        conflict_id: Uuid,
        /// Absorbed update id
        update_id: Uuid,
    },
    /// Conflict settled; `update` is queued for broadcast
    ConflictResolved {
        /// The settled conflict
        conflict: SyncConflict,
        /// Update produced by the resolution
        update: DocumentUpdate,
    },
    /// Update delivered to `delivered` clients
    Broadcast {
        /// Update id
        id: Uuid,
        /// Document path
        path: String,
        /// Clients reached
        delivered: usize,
    },
}

/// Result of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Updates broadcast
    pub broadcast: usize,
    /// Superseded updates skipped by compaction
    pub compacted: usize,
    /// Individual deliveries across all clients
    pub delivered: usize,
}

/// Coordinator counters and gauges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Registered clients
    pub clients: usize,
    /// Updates waiting for flush
    pub queue_depth: usize,
    /// Configured queue capacity
    pub queue_capacity: usize,
    /// Conflicts awaiting resolution
    pub pending_conflicts: usize,
    /// Updates broadcast so far
    pub broadcasts: u64,
    /// Messages delivered so far
    pub deliveries: u64,
    /// Updates dropped on overflow
    pub dropped: u64,
    /// Conflicts raised
    pub conflicts_raised: u64,
    /// Conflicts resolved
    pub conflicts_resolved: u64,
    /// Clients removed after transport errors
    pub disconnects: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    broadcasts: u64,
    deliveries: u64,
    dropped: u64,
    conflicts_raised: u64,
    conflicts_resolved: u64,
    disconnects: u64,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<DocumentUpdate>,
    conflicts: HashMap<Uuid, SyncConflict>,
    conflict_by_path: HashMap<String, Uuid>,
    recent: HashMap<String, DocumentUpdate>,
    counters: Counters,
}

impl State {
    fn competing(&self, update: &DocumentUpdate, window_ms: u64) -> Option<DocumentUpdate> {
        let other = update.source.other();
        let within = |candidate: &&DocumentUpdate| {
            candidate.path == update.path
                && candidate.source == other
                && gap_ms(candidate.timestamp, update.timestamp) <= window_ms
        };
        self.queue
            .iter()
            .rev()
            .find(|candidate| within(candidate))
            .or_else(|| self.recent.get(&update.path).filter(|candidate| within(candidate)))
            .cloned()
    }

    fn enqueue(&mut self, update: DocumentUpdate, capacity: usize) -> Option<DocumentUpdate> {
        self.queue.push_back(update);
        if self.queue.len() > capacity.max(1) {
            self.counters.dropped += 1;
            self.queue.pop_front()
        } else {
            None
        }
    }

    fn prune_recent(&mut self, now: DateTime<Utc>, window_ms: u64) {
        self.recent
            .retain(|_, update| gap_ms(update.timestamp, now) <= window_ms);
    }
}

fn gap_ms(a: DateTime<Utc>, b: DateTime<Utc>) -> u64 {
    (a - b).num_milliseconds().unsigned_abs()
}

/// Keep the latest update per path, at the position of that latest update
fn compact(updates: Vec<DocumentUpdate>) -> Vec<DocumentUpdate> {
    let mut seen = HashSet::new();
    let mut kept: Vec<DocumentUpdate> = updates
        .into_iter()
        .rev()
        .filter(|update| seen.insert(update.path.clone()))
        .collect();
    kept.reverse();
    kept
}

/// Client registry, outgoing queue and conflict table
#[derive(Debug)]
pub struct SyncCoordinator {
    config: SyncConfig,
    clients: DashMap<Uuid, ClientSession>,
    state: Mutex<State>,
    flushing: Mutex<()>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    /// Create coordinator
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            clients: DashMap::new(),
            state: Mutex::new(State::default()),
            flushing: Mutex::new(()),
            events,
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to coordinator events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    /// Register a subscriber
    pub fn register_client(&self, transport: Arc<dyn ClientTransport>) -> Uuid {
        let session = ClientSession::new(transport);
        let id = session.id;
        self.clients.insert(id, session);
        info!(client = %id, clients = self.clients.len(), "client registered");
        self.emit(SyncEvent::ClientRegistered(id));
        id
    }

    /// Remove a subscriber
    pub fn deregister_client(&self, id: Uuid) -> bool {
        let removed = self.clients.remove(&id).is_some();
        if removed {
            info!(client = %id, "client deregistered");
            self.emit(SyncEvent::ClientDisconnected {
                id,
                reason: "deregistered".into(),
            });
        }
        removed
    }

    /// Number of registered clients
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Queue an update for broadcast, or raise/extend a conflict
    pub fn queue_update(&self, update: DocumentUpdate) -> QueueOutcome {
        let window_ms = self.config.conflict_window_ms;
        let mut state = self.state.lock();

        if let Some(conflict_id) = state.conflict_by_path.get(&update.path).copied() {
            if let Some(conflict) = state.conflicts.get_mut(&conflict_id) {
                conflict.absorb(&update);
            }
            drop(state);
            debug!(path = %update.path, conflict = %conflict_id, source = %update.source, "update folded into pending conflict");
            self.emit(SyncEvent::ConflictUpdated {
                conflict_id,
                update_id: update.id,
            });
            return QueueOutcome::ConflictUpdated(conflict_id);
        }

        state.prune_recent(Utc::now(), window_ms);
        if let Some(conflict) = state
            .competing(&update, window_ms)
            .and_then(|other| SyncConflict::between(&other, &update))
        {
            let conflict_id = conflict.id;
            state.queue.retain(|queued| queued.path != update.path);
            state.recent.remove(&update.path);
            state.conflict_by_path.insert(update.path.clone(), conflict_id);
            state.conflicts.insert(conflict_id, conflict.clone());
            state.counters.conflicts_raised += 1;
            drop(state);

            warn!(path = %conflict.path, conflict = %conflict_id, "auto and manual updates conflict");
            match serde_json::to_value(&conflict) {
                Ok(data) => {
                    self.broadcast(&SyncMessage::new(MessageType::Conflict, data));
                }
                Err(err) => warn!(conflict = %conflict_id, error = %err, "cannot encode conflict"),
            }
            self.emit(SyncEvent::ConflictDetected(conflict));
            return QueueOutcome::Conflict(conflict_id);
        }

        let (id, path) = (update.id, update.path.clone());
        let dropped = state.enqueue(update, self.config.queue_capacity);
        let depth = state.queue.len();
        drop(state);

        debug!(update = %id, path = %path, depth, "update queued");
        self.emit(SyncEvent::Queued { id, path });
        let dropped_id = dropped.map(|old| self.report_drop(old, depth));
        QueueOutcome::Queued {
            dropped: dropped_id,
        }
    }

    fn report_drop(&self, dropped: DocumentUpdate, depth: usize) -> Uuid {
        warn!(update = %dropped.id, path = %dropped.path, capacity = self.config.queue_capacity, "queue full, dropped oldest update");
        self.broadcast(&SyncMessage::queue(json!({
            "event": "overflow",
            "dropped": dropped.id,
            "path": dropped.path,
            "depth": depth,
            "capacity": self.config.queue_capacity,
        })));
        let id = dropped.id;
        self.emit(SyncEvent::Dropped(dropped));
        id
    }

    /// Settle a conflict and queue the single resulting update
    ///
    /// # Errors
    /// Returns [`SyncError::UnknownConflict`] if no such conflict is pending
    pub fn resolve(&self, conflict_id: Uuid, resolution: Resolution) -> Result<DocumentUpdate, SyncError> {
        let mut state = self.state.lock();
        let mut conflict = state
            .conflicts
            .remove(&conflict_id)
            .ok_or(SyncError::UnknownConflict(conflict_id))?;
        state.conflict_by_path.remove(&conflict.path);

        let update = conflict.resolved_update(&resolution);
        conflict.status = ConflictStatus::Resolved(resolution);
        state.counters.conflicts_resolved += 1;
        let dropped = state.enqueue(update.clone(), self.config.queue_capacity);
        let depth = state.queue.len();
        drop(state);

        info!(conflict = %conflict_id, path = %conflict.path, source = %update.source, "conflict resolved");
        if let Some(old) = dropped {
            self.report_drop(old, depth);
        }
        self.emit(SyncEvent::ConflictResolved {
            conflict,
            update: update.clone(),
        });
        Ok(update)
    }

    /// Broadcast every queued update, latest per path, in FIFO order
    ///
    /// # Errors
    /// Returns error if an update cannot be serialized
    pub fn flush(&self) -> Result<FlushReport, SyncError> {
        let _flushing = self.flushing.lock();
        let (batch, compacted) = {
            let mut state = self.state.lock();
            if state.queue.is_empty() {
                return Ok(FlushReport::default());
            }
            let drained: Vec<DocumentUpdate> = state.queue.drain(..).collect();
            let total = drained.len();
            let batch = compact(drained);
            for update in &batch {
                state.recent.insert(update.path.clone(), update.clone());
            }
            state.counters.broadcasts += batch.len() as u64;
            let compacted = total - batch.len();
            (batch, compacted)
        };

        let mut report = FlushReport {
            compacted,
            ..FlushReport::default()
        };
        for update in &batch {
            let delivered = self.broadcast(&SyncMessage::update(update)?);
            report.broadcast += 1;
            report.delivered += delivered;
            self.emit(SyncEvent::Broadcast {
                id: update.id,
                path: update.path.clone(),
                delivered,
            });
        }
        debug!(broadcast = report.broadcast, compacted, delivered = report.delivered, "queue flushed");
        Ok(report)
    }

    /// Deliver `message` to every client; failing clients are deregistered
    ///
    /// Returns the number of successful deliveries.
    pub fn broadcast(&self, message: &SyncMessage) -> usize {
        let mut delivered = 0;
        let mut failed: Vec<(Uuid, TransportError)> = Vec::new();
        for client in &self.clients {
            match client.transport.send(message) {
                Ok(()) => delivered += 1,
                Err(err) => failed.push((client.id, err)),
            }
        }

        let mut disconnects = 0;
        for (id, err) in failed {
            if self.clients.remove(&id).is_some() {
                warn!(client = %id, error = %err, "client transport failed, deregistered");
                disconnects += 1;
                self.emit(SyncEvent::ClientDisconnected {
                    id,
                    reason: err.to_string(),
                });
            }
        }

        let mut state = self.state.lock();
        state.counters.deliveries += delivered as u64;
        state.counters.disconnects += disconnects;
        delivered
    }

    /// Send a heartbeat to every client
    pub fn heartbeat(&self) -> usize {
        self.broadcast(&SyncMessage::heartbeat(self.clients.len()))
    }

    /// Send a status payload to every client
    pub fn broadcast_status(&self, data: Value) -> usize {
        self.broadcast(&SyncMessage::status(data))
    }

    /// Pending conflicts, oldest first
    #[must_use]
    pub fn conflicts(&self) -> Vec<SyncConflict> {
        let mut conflicts: Vec<SyncConflict> = self.state.lock().conflicts.values().cloned().collect();
        conflicts.sort_by_key(|c| c.detected_at);
        conflicts
    }

    /// Pending conflict by id
    #[must_use]
    pub fn conflict(&self, id: Uuid) -> Option<SyncConflict> {
        self.state.lock().conflicts.get(&id).cloned()
    }

    /// Pending conflict for a path
    #[must_use]
    pub fn conflict_for_path(&self, path: &str) -> Option<SyncConflict> {
        let state = self.state.lock();
        state
            .conflict_by_path
            .get(path)
            .and_then(|id| state.conflicts.get(id))
            .cloned()
    }

    /// Queued updates in FIFO order
    #[must_use]
    pub fn queued(&self) -> Vec<DocumentUpdate> {
        self.state.lock().queue.iter().cloned().collect()
    }

    /// Number of queued updates
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        let state = self.state.lock();
        let counters = state.counters;
        SyncStats {
            clients: self.clients.len(),
            queue_depth: state.queue.len(),
            queue_capacity: self.config.queue_capacity,
            pending_conflicts: state.conflicts.len(),
            broadcasts: counters.broadcasts,
            deliveries: counters.deliveries,
            dropped: counters.dropped,
            conflicts_raised: counters.conflicts_raised,
            conflicts_resolved: counters.conflicts_resolved,
            disconnects: counters.disconnects,
        }
    }
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::UpdateSource;
    use crate::transport::ChannelTransport;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    struct Broken;

    impl ClientTransport for Broken {
        fn send(&self, _message: &SyncMessage) -> Result<(), TransportError> {
            Err(TransportError::Failed("socket reset".into()))
        }
    }

    fn client(sync: &SyncCoordinator) -> mpsc::UnboundedReceiver<SyncMessage> {
        let (transport, receiver) = ChannelTransport::pair();
        sync.register_client(Arc::new(transport));
        receiver
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<SyncMessage>) -> Vec<SyncMessage> {
        std::iter::from_fn(|| receiver.try_recv().ok()).collect()
    }

    fn updates(messages: &[SyncMessage]) -> Vec<DocumentUpdate> {
        messages
            .iter()
            .filter(|m| m.kind == MessageType::Update)
            .map(|m| serde_json::from_value(m.data.clone()).unwrap())
            .collect()
    }

    /// Blocks inside the first update delivery until released
    #[derive(Debug)]
    struct Gated {
        entered: Mutex<Option<std::sync::mpsc::Sender<()>>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
        seen: Mutex<Vec<String>>,
    }

    impl ClientTransport for Gated {
        fn send(&self, message: &SyncMessage) -> Result<(), TransportError> {
            if message.kind != MessageType::Update {
                return Ok(());
            }
            if let Some(entered) = self.entered.lock().take() {
                let _ = entered.send(());
                let _ = self.release.lock().recv();
            }
            let content = message.data["content"].as_str().unwrap_or_default();
            self.seen.lock().push(content.to_string());
            Ok(())
        }
    }

    #[test]
    fn queued_conflict_resolves_to_one_manual_broadcast() {
        let sync = SyncCoordinator::default();
        let mut rx = client(&sync);
        let t0 = Utc::now();

        let auto = DocumentUpdate::auto("docs/a.md", "generated").with_timestamp(t0);
        let manual = DocumentUpdate::manual("docs/a.md", "edited")
            .with_timestamp(t0 + Duration::milliseconds(500));

        assert_eq!(sync.queue_update(auto), QueueOutcome::Queued { dropped: None });
        let QueueOutcome::Conflict(id) = sync.queue_update(manual) else {
            panic!("expected conflict");
        };
        assert_eq!(sync.conflicts().len(), 1);
        assert_eq!(sync.queue_depth(), 0);
        let raised = drain(&mut rx);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].kind, MessageType::Conflict);
        assert_eq!(raised[0].data["id"], json!(id));
        assert_eq!(raised[0].data["path"], "docs/a.md");

        let resolved = sync.resolve(id, Resolution::Manual).unwrap();
        assert_eq!(resolved.content, "edited");
        assert!(sync.conflicts().is_empty());

        let report = sync.flush().unwrap();
        assert_eq!(report.broadcast, 1);
        let sent = updates(&drain(&mut rx));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "edited");
        assert_eq!(sent[0].source, UpdateSource::Manual);
    }

    #[test]
    fn manual_edit_after_auto_broadcast_conflicts() {
        let sync = SyncCoordinator::default();
        let mut rx = client(&sync);

        sync.queue_update(DocumentUpdate::auto("docs/a.md", "generated"));
        sync.flush().unwrap();
        drain(&mut rx);

        let manual = DocumentUpdate::manual("docs/a.md", "edited")
            .with_timestamp(Utc::now() + Duration::milliseconds(500));
        let QueueOutcome::Conflict(id) = sync.queue_update(manual) else {
            panic!("expected conflict");
        };

        sync.resolve(id, Resolution::Auto).unwrap();
        sync.flush().unwrap();
        let sent = updates(&drain(&mut rx));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "generated");
    }

    #[test]
    fn outside_window_is_not_a_conflict() {
        let sync = SyncCoordinator::new(SyncConfig::default().with_conflict_window(std::time::Duration::from_secs(2)));
        let t0 = Utc::now();
        sync.queue_update(DocumentUpdate::auto("docs/a.md", "generated").with_timestamp(t0));
        let outcome = sync.queue_update(
            DocumentUpdate::manual("docs/a.md", "edited").with_timestamp(t0 + Duration::seconds(3)),
        );
        assert_eq!(outcome, QueueOutcome::Queued { dropped: None });
        assert!(sync.conflicts().is_empty());
    }

    #[test]
    fn same_source_updates_are_compacted() {
        let sync = SyncCoordinator::default();
        let mut rx = client(&sync);

        sync.queue_update(DocumentUpdate::auto("docs/a.md", "a1"));
        sync.queue_update(DocumentUpdate::auto("docs/b.md", "b1"));
        sync.queue_update(DocumentUpdate::auto("docs/a.md", "a2"));

        let report = sync.flush().unwrap();
        assert_eq!(report.broadcast, 2);
        assert_eq!(report.compacted, 1);

        let contents: Vec<String> = updates(&drain(&mut rx)).into_iter().map(|u| u.content).collect();
        assert_eq!(contents, ["b1", "a2"]);
        assert_eq!(sync.flush().unwrap(), FlushReport::default());
    }

    #[test]
    fn overflow_drops_oldest_and_reports_it() {
        let sync = SyncCoordinator::new(SyncConfig::default().with_queue_capacity(2));
        let mut rx = client(&sync);

        let first = DocumentUpdate::auto("docs/a.md", "a");
        let first_id = first.id;
        sync.queue_update(first);
        sync.queue_update(DocumentUpdate::auto("docs/b.md", "b"));
        let outcome = sync.queue_update(DocumentUpdate::auto("docs/c.md", "c"));

        assert_eq!(outcome, QueueOutcome::Queued { dropped: Some(first_id) });
        let paths: Vec<String> = sync.queued().into_iter().map(|u| u.path).collect();
        assert_eq!(paths, ["docs/b.md", "docs/c.md"]);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageType::Queue);
        assert_eq!(messages[0].data["path"], "docs/a.md");
        assert_eq!(sync.stats().dropped, 1);
    }

    #[test]
    fn failing_transport_only_removes_that_client() {
        let sync = SyncCoordinator::default();
        let mut healthy = client(&sync);
        sync.register_client(Arc::new(Broken));
        assert_eq!(sync.client_count(), 2);

        assert_eq!(sync.heartbeat(), 1);
        assert_eq!(sync.client_count(), 1);
        assert_eq!(drain(&mut healthy)[0].kind, MessageType::Heartbeat);

        assert_eq!(sync.broadcast_status(json!({"phase": "idle"})), 1);
        assert_eq!(sync.stats().disconnects, 1);
    }

    #[test]
    fn conflict_blocks_only_its_own_path() {
        let sync = SyncCoordinator::default();
        let mut rx = client(&sync);

        sync.queue_update(DocumentUpdate::auto("docs/a.md", "generated"));
        let QueueOutcome::Conflict(id) = sync.queue_update(DocumentUpdate::manual("docs/a.md", "edited")) else {
            panic!("expected conflict");
        };
        drain(&mut rx);

        sync.queue_update(DocumentUpdate::auto("docs/b.md", "other"));
        assert_eq!(
            sync.queue_update(DocumentUpdate::auto("docs/a.md", "regenerated")),
            QueueOutcome::ConflictUpdated(id)
        );

        sync.flush().unwrap();
        let sent = updates(&drain(&mut rx));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, "docs/b.md");
        assert_eq!(sync.conflict_for_path("docs/a.md").unwrap().auto.content, "regenerated");
    }

    #[test]
    fn resolving_unknown_conflict_fails() {
        let sync = SyncCoordinator::default();
        let err = sync.resolve(Uuid::new_v4(), Resolution::Auto).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn merge_resolution_publishes_merged_content() {
        let sync = SyncCoordinator::default();
        sync.queue_update(DocumentUpdate::auto("docs/a.md", "generated"));
        let QueueOutcome::Conflict(id) = sync.queue_update(DocumentUpdate::manual("docs/a.md", "edited")) else {
            panic!("expected conflict");
        };
        let update = sync.resolve(id, Resolution::Merge("generated + edited".into())).unwrap();
        assert_eq!(sync.queued(), vec![update]);
        assert!(sync.resolve(id, Resolution::Auto).is_err());
    }

    #[test]
    fn events_describe_conflict_lifecycle() {
        let sync = SyncCoordinator::default();
        let mut events = sync.subscribe();

        sync.queue_update(DocumentUpdate::auto("docs/a.md", "generated"));
        let QueueOutcome::Conflict(id) = sync.queue_update(DocumentUpdate::manual("docs/a.md", "edited")) else {
            panic!("expected conflict");
        };
        sync.resolve(id, Resolution::Auto).unwrap();

        assert!(matches!(events.try_recv().unwrap(), SyncEvent::Queued { .. }));
        assert!(matches!(events.try_recv().unwrap(), SyncEvent::ConflictDetected(c) if c.id == id));
        match events.try_recv().unwrap() {
            SyncEvent::ConflictResolved { conflict, update } => {
                assert_eq!(conflict.status, ConflictStatus::Resolved(Resolution::Auto));
                assert_eq!(update.content, "generated");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn overlapping_flushes_deliver_in_queue_order() {
        let sync = Arc::new(SyncCoordinator::default());
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let gate = Arc::new(Gated {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
            seen: Mutex::new(Vec::new()),
        });
        sync.register_client(gate.clone());

        sync.queue_update(DocumentUpdate::auto("docs/a.md", "v1"));
        let first = {
            let sync = Arc::clone(&sync);
            std::thread::spawn(move || sync.flush().unwrap())
        };
        entered_rx.recv().unwrap();

        let second = {
            let sync = Arc::clone(&sync);
            std::thread::spawn(move || {
                sync.queue_update(DocumentUpdate::auto("docs/a.md", "v2"));
                sync.flush().unwrap()
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        release_tx.send(()).unwrap();

        assert_eq!(first.join().unwrap().broadcast, 1);
        assert_eq!(second.join().unwrap().broadcast, 1);
        assert_eq!(*gate.seen.lock(), ["v1", "v2"]);
    }
}
