//! Document updates and the wire messages carrying them

use std::fmt;

use chrono::{DateTime, Utc};
use livedoc_cache::ContentHash;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::SyncError;

/// What a document update covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateScope {
    /// One rendered file
    File,
    /// Whole-project output
    Project,
}

/// Who produced a document update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    /// Regeneration pipeline
    Auto,
    /// Direct edit of published output
    Manual,
}

impl UpdateSource {
    /// The competing source
    #[inline]
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Auto => Self::Manual,
            Self::Manual => Self::Auto,
        }
    }
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        })
    }
}

/// New content for one published document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    /// Update id
    pub id: Uuid,
    /// File or project
    pub scope: UpdateScope,
    /// Published document path
    pub path: String,
    /// Full new content
    pub content: String,
    /// When the update was produced
    pub timestamp: DateTime<Utc>,
    /// Producer
    pub source: UpdateSource,
    /// Hash of `content`
    pub checksum: ContentHash,
}

impl DocumentUpdate {
    /// Create update stamped now
    #[must_use]
    pub fn new(
        scope: UpdateScope,
        path: impl Into<String>,
        content: impl Into<String>,
        source: UpdateSource,
    ) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4(),
            scope,
            path: path.into(),
            checksum: ContentHash::of_str(&content),
            content,
            timestamp: Utc::now(),
            source,
        }
    }

    /// Regenerated file content
    #[inline]
    #[must_use]
    pub fn auto(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(UpdateScope::File, path, content, UpdateSource::Auto)
    }

    /// Hand-edited file content
    #[inline]
    #[must_use]
    pub fn manual(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(UpdateScope::File, path, content, UpdateSource::Manual)
    }

    /// With explicit timestamp
    #[inline]
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// With scope
    #[inline]
    #[must_use]
    pub fn with_scope(mut self, scope: UpdateScope) -> Self {
        self.scope = scope;
        self
    }

    /// Whether `checksum` still matches `content`
    #[must_use]
    pub fn verify(&self) -> bool {
        ContentHash::of_str(&self.content) == self.checksum
    }
}

/// Kind of wire message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// A document update
    Update,
    /// Scheduler or coordinator status
    Status,
    /// A conflict needing resolution
    Conflict,
    /// Liveness signal
    Heartbeat,
    /// Queue status, e.g. an overflow drop
    Queue,
}

/// Message relayed to every subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Payload
    pub data: Value,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

impl SyncMessage {
    /// Create message stamped now
    #[must_use]
    pub fn new(kind: MessageType, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Wrap a document update
    ///
    /// # Errors
    /// Returns error if the update cannot be serialized
    pub fn update(update: &DocumentUpdate) -> Result<Self, SyncError> {
        Ok(Self::new(MessageType::Update, serde_json::to_value(update)?))
    }

    /// Status payload
    #[inline]
    #[must_use]
    pub fn status(data: Value) -> Self {
        Self::new(MessageType::Status, data)
    }

    /// Queue status payload
    #[inline]
    #[must_use]
    pub fn queue(data: Value) -> Self {
        Self::new(MessageType::Queue, data)
    }

    /// Heartbeat with the current client count
    #[must_use]
    pub fn heartbeat(clients: usize) -> Self {
        Self::new(MessageType::Heartbeat, json!({ "clients": clients }))
    }

    /// Serialize to a JSON string for text transports
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized
    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }
}
