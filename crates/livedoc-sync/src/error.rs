//! Error types for the sync coordinator

use uuid::Uuid;

/// Sync error
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No pending conflict with this id
    #[error("unknown conflict: {0}")]
    UnknownConflict(Uuid),

    /// Message could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the error refers to something that does not exist
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownConflict(_))
    }
}

/// Failure delivering to one client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Client went away
    #[error("transport closed")]
    Closed,

    /// Delivery failed
    #[error("transport failed: {0}")]
    Failed(String),
}
