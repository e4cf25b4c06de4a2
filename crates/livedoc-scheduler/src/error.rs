//! Error types for the update scheduler

use livedoc_cache::CacheError;

/// Scheduler error
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler task has stopped
    #[error("scheduler is not running")]
    Closed,

    /// Cache access failed while executing a batch
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Failure reported by a [`Regenerator`](crate::Regenerator)
///
/// Carried onto the failed [`UpdateOperation`](crate::UpdateOperation) as its
/// error message; never fatal to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RegenerationError {
    /// Human-readable cause
    pub message: String,
}

impl RegenerationError {
    /// Create regeneration error
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<CacheError> for RegenerationError {
    fn from(err: CacheError) -> Self {
        Self::new(err.to_string())
    }
}
