//! Error types for the cache layer
//!
//! Stale or missing entries are never errors: they surface as `None`.
//! Only genuine I/O faults and serialization failures end up here.

use std::path::PathBuf;

use crate::hash::HashError;

/// Cache layer error
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Reading a resource failed for a reason other than "not found"
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Resource being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Hash computation or parsing failed
    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    /// Value could not be serialized for sizing or hashing
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Wrap an I/O error with the path it occurred on
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if the error is transient and the read may be retried
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { source, .. } if matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            )
        )
    }
}
