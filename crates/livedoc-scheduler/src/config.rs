//! Scheduler configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for [`UpdateScheduler`](crate::UpdateScheduler)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Quiet period that closes a batch, reset by every new event
    pub batch_window_ms: u64,

    /// Upper bound on how long a batch may stay open under a constant stream
    /// of events
    pub max_batch_wait_ms: u64,

    /// More unique changed files than this forces a full regeneration
    pub max_incremental_files: usize,

    /// Changed/cached ratio above which a full regeneration is cheaper
    pub full_update_threshold: f64,

    /// Section updates are chosen only below this many matched sections
    pub max_section_updates: usize,

    /// Pause between consecutive section regenerations
    pub section_delay_ms: u64,

    /// Operations kept in history
    pub history_limit: usize,

    /// Extensions (without dot) treated as template/markup files
    pub template_extensions: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: 500,
            max_batch_wait_ms: 5_000,
            max_incremental_files: 10,
            full_update_threshold: 0.5,
            max_section_updates: 5,
            section_delay_ms: 100,
            history_limit: 100,
            template_extensions: ["hbs", "handlebars", "mustache", "html", "ejs", "njk", "liquid"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SchedulerConfig {
    /// With batch window
    #[inline]
    #[must_use]
    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batch_window_ms = duration_ms(window);
        self
    }

    /// With incremental file limit
    #[inline]
    #[must_use]
    pub fn with_max_incremental_files(mut self, files: usize) -> Self {
        self.max_incremental_files = files;
        self
    }

    /// With full-update ratio threshold
    #[inline]
    #[must_use]
    pub fn with_full_update_threshold(mut self, threshold: f64) -> Self {
        self.full_update_threshold = threshold;
        self
    }

    /// With inter-section delay
    #[inline]
    #[must_use]
    pub fn with_section_delay(mut self, delay: Duration) -> Self {
        self.section_delay_ms = duration_ms(delay);
        self
    }

    /// With history limit
    #[inline]
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Batch window
    #[inline]
    #[must_use]
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    /// Longest time a batch may stay open
    #[inline]
    #[must_use]
    pub fn max_batch_wait(&self) -> Duration {
        Duration::from_millis(self.max_batch_wait_ms.max(self.batch_window_ms))
    }

    /// Inter-section delay
    #[inline]
    #[must_use]
    pub fn section_delay(&self) -> Duration {
        Duration::from_millis(self.section_delay_ms)
    }

    /// Whether `path` has one of the template extensions
    #[must_use]
    pub fn is_template(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.template_extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
