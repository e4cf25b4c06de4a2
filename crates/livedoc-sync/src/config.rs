//! Sync coordinator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Queue and timing parameters for [`SyncCoordinator`](crate::SyncCoordinator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pending updates kept before the oldest is dropped
    pub queue_capacity: usize,
    /// Period of the background flush
    pub flush_interval_ms: u64,
    /// Period of heartbeat messages
    pub heartbeat_interval_ms: u64,
    /// Auto and manual updates to one path closer than this conflict
    pub conflict_window_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            flush_interval_ms: 1_000,
            heartbeat_interval_ms: 30_000,
            conflict_window_ms: 2_000,
        }
    }
}

impl SyncConfig {
    /// With queue capacity
    #[inline]
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// With conflict window
    #[inline]
    #[must_use]
    pub fn with_conflict_window(mut self, window: Duration) -> Self {
        self.conflict_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Flush period
    #[inline]
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Heartbeat period
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Conflict window
    #[inline]
    #[must_use]
    pub fn conflict_window(&self) -> Duration {
        Duration::from_millis(self.conflict_window_ms)
    }
}
