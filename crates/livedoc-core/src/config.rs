//! Engine configuration
//!
//! One TOML document with a table per component. Every table and field is
//! optional; missing values take their defaults.
//!
//! ```toml
//! [cache.analyses]
//! max_entries = 10000
//!
//! [scheduler]
//! batch_window_ms = 250
//!
//! [sync]
//! conflict_window_ms = 1500
//!
//! [project]
//! output_dir = "site/docs"
//! ```

use std::path::Path;

use livedoc_cache::{ArtifactCacheConfig, CacheConfig};
use livedoc_scheduler::SchedulerConfig;
use livedoc_sync::SyncConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::health::{HealthConfig, HealthThresholds};

/// Limits of the three engine caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Per-file analyses
    pub analyses: CacheConfig,
    /// Compiled templates
    pub templates: CacheConfig,
    /// Project snapshots
    pub snapshots: CacheConfig,
}

impl Default for CacheSettings {
    /// Analyses 64 MiB / 5 000, templates 8 MiB / 500, snapshots 32 MiB / 50
    fn default() -> Self {
        let artifacts = ArtifactCacheConfig::default();
        Self {
            analyses: artifacts.analyses,
            templates: artifacts.templates,
            snapshots: CacheConfig::default()
                .with_max_size(32 * 1024 * 1024)
                .with_max_entries(50),
        }
    }
}

impl CacheSettings {
    /// Artifact cache part
    #[inline]
    #[must_use]
    pub fn artifacts(&self) -> ArtifactCacheConfig {
        ArtifactCacheConfig {
            analyses: self.analyses,
            templates: self.templates,
        }
    }
}

/// Project walking and publishing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Directory published documents are addressed under
    pub output_dir: String,
    /// Directory names never descended into
    pub ignore: Vec<String>,
    /// Files hashed concurrently when building a manifest
    pub hash_concurrency: usize,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            output_dir: "docs".to_string(),
            ignore: [".git", "target", "node_modules"]
                .into_iter()
                .map(String::from)
                .collect(),
            hash_concurrency: 16,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivedocConfig {
    /// Cache limits
    pub cache: CacheSettings,
    /// Batching and strategy
    pub scheduler: SchedulerConfig,
    /// Queue and timing of client sync
    pub sync: SyncConfig,
    /// Health sampling
    pub health: HealthConfig,
    /// Walking and publishing
    pub project: ProjectSettings,
}

impl LivedocConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// Returns error if the document is malformed or a value is out of range
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// With cache limits
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    /// With scheduler config
    #[inline]
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// With sync config
    #[inline]
    #[must_use]
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// With health config
    #[inline]
    #[must_use]
    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    /// With project settings
    #[inline]
    #[must_use]
    pub fn with_project(mut self, project: ProjectSettings) -> Self {
        self.project = project;
        self
    }

    /// Check every value is usable
    ///
    /// # Errors
    /// Returns the first out-of-range value found
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, cache) in [
            ("cache.analyses", &self.cache.analyses),
            ("cache.templates", &self.cache.templates),
            ("cache.snapshots", &self.cache.snapshots),
        ] {
            if cache.max_entries == 0 || cache.max_size_bytes == 0 {
                return Err(ConfigError::invalid(field, "capacity must be non-zero"));
            }
            if cache.ttl_ms == 0 {
                return Err(ConfigError::invalid(field, "ttl_ms must be non-zero"));
            }
        }

        let scheduler = &self.scheduler;
        non_zero("scheduler.batch_window_ms", scheduler.batch_window_ms)?;
        non_zero("scheduler.history_limit", scheduler.history_limit as u64)?;
        unit_interval("scheduler.full_update_threshold", scheduler.full_update_threshold)?;

        let sync = &self.sync;
        non_zero("sync.queue_capacity", sync.queue_capacity as u64)?;
        non_zero("sync.flush_interval_ms", sync.flush_interval_ms)?;
        non_zero("sync.heartbeat_interval_ms", sync.heartbeat_interval_ms)?;

        non_zero("health.interval_ms", self.health.interval_ms)?;
        non_zero("health.retained_samples", self.health.retained_samples as u64)?;
        validate_thresholds(&self.health.thresholds)?;

        non_zero("project.hash_concurrency", self.project.hash_concurrency as u64)?;
        Ok(())
    }
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be non-zero"));
    }
    Ok(())
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")));
    }
    Ok(())
}

fn validate_thresholds(t: &HealthThresholds) -> Result<(), ConfigError> {
    for (field, value) in [
        ("health.thresholds.hit_rate_warning", t.hit_rate_warning),
        ("health.thresholds.hit_rate_critical", t.hit_rate_critical),
        ("health.thresholds.memory_warning", t.memory_warning),
        ("health.thresholds.memory_critical", t.memory_critical),
        ("health.thresholds.success_rate_warning", t.success_rate_warning),
        ("health.thresholds.success_rate_critical", t.success_rate_critical),
        ("health.thresholds.queue_warning", t.queue_warning),
        ("health.thresholds.queue_critical", t.queue_critical),
    ] {
        unit_interval(field, value)?;
    }

    // lower-is-worse metrics need critical below warning, the rest above
    let inverted = [
        ("health.thresholds.hit_rate_critical", t.hit_rate_critical > t.hit_rate_warning),
        ("health.thresholds.success_rate_critical", t.success_rate_critical > t.success_rate_warning),
        ("health.thresholds.memory_critical", t.memory_critical < t.memory_warning),
        ("health.thresholds.queue_critical", t.queue_critical < t.queue_warning),
        ("health.thresholds.latency_critical_ms", t.latency_critical_ms < t.latency_warning_ms),
    ];
    if let Some((field, _)) = inverted.into_iter().find(|(_, inverted)| *inverted) {
        return Err(ConfigError::invalid(field, "inverted relative to its warning level"));
    }
    Ok(())
}
