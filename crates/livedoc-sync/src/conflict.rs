//! Conflicts between automatic and manual writes to one document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{DocumentUpdate, UpdateScope, UpdateSource};

/// One side of a conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSide {
    /// Update that produced this side
    pub update_id: Uuid,
    /// Content of that update
    pub content: String,
    /// When it was produced
    pub timestamp: DateTime<Utc>,
}

impl From<&DocumentUpdate> for ConflictSide {
    fn from(update: &DocumentUpdate) -> Self {
        Self {
            update_id: update.id,
            content: update.content.clone(),
            timestamp: update.timestamp,
        }
    }
}

/// How a conflict is settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "content", rename_all = "lowercase")]
pub enum Resolution {
    /// Keep the regenerated content
    Auto,
    /// Keep the hand edit
    Manual,
    /// Publish caller-supplied merged content
    Merge(String),
}

/// Lifecycle of a conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "resolution", rename_all = "lowercase")]
pub enum ConflictStatus {
    /// Waiting for [`SyncCoordinator::resolve`](crate::SyncCoordinator::resolve)
    Pending,
    /// Settled
    Resolved(Resolution),
}

/// Competing auto and manual content for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict id
    pub id: Uuid,
    /// Contested document
    pub path: String,
    /// Scope of the competing updates
    pub scope: UpdateScope,
    /// Regenerated side
    pub auto: ConflictSide,
    /// Hand-edited side
    pub manual: ConflictSide,
    /// When the conflict was raised
    pub detected_at: DateTime<Utc>,
    /// Lifecycle state
    pub status: ConflictStatus,
}

impl SyncConflict {
    /// Build a conflict from two updates with different sources
    ///
    /// Returns `None` when both come from the same source.
    #[must_use]
    pub fn between(a: &DocumentUpdate, b: &DocumentUpdate) -> Option<Self> {
        let (auto, manual) = match (a.source, b.source) {
            (UpdateSource::Auto, UpdateSource::Manual) => (a, b),
            (UpdateSource::Manual, UpdateSource::Auto) => (b, a),
            _ => return None,
        };
        Some(Self {
            id: Uuid::new_v4(),
            path: a.path.clone(),
            scope: a.scope,
            auto: auto.into(),
            manual: manual.into(),
            detected_at: Utc::now(),
            status: ConflictStatus::Pending,
        })
    }

    /// Replace the side matching `update.source`
    pub fn absorb(&mut self, update: &DocumentUpdate) {
        let side = match update.source {
            UpdateSource::Auto => &mut self.auto,
            UpdateSource::Manual => &mut self.manual,
        };
        *side = update.into();
    }

    /// The single update that settles this conflict
    #[must_use]
    pub fn resolved_update(&self, resolution: &Resolution) -> DocumentUpdate {
        let (content, source) = match resolution {
            Resolution::Auto => (self.auto.content.clone(), UpdateSource::Auto),
            Resolution::Manual => (self.manual.content.clone(), UpdateSource::Manual),
            Resolution::Merge(merged) => (merged.clone(), UpdateSource::Manual),
        };
        DocumentUpdate::new(self.scope, self.path.clone(), content, source)
    }
}
