//! Cache health monitoring
//!
//! Periodically samples cache, scheduler and sync statistics, classifies the
//! result against [`HealthThresholds`] and keeps a bounded time series.
//! Purely observational: nothing here mutates the observed components.
//!
//! Classification:
//! - any critical finding -> [`HealthStatus::Critical`]
//! - two or more warnings -> [`HealthStatus::Warning`]
//! - exactly one warning -> [`HealthStatus::Good`]
//! - no findings -> [`HealthStatus::Excellent`]

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use livedoc_cache::CacheStats;
use livedoc_scheduler::UpdateStats;
use livedoc_sync::SyncStats;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::ExportError;

/// Warning and critical levels per metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Hit rate below this warns
    pub hit_rate_warning: f64,
    /// Hit rate below this is critical
    pub hit_rate_critical: f64,
    /// Lookups required before the hit rate is judged
    pub min_lookups: u64,
    /// Memory utilization at or above this warns
    pub memory_warning: f64,
    /// Memory utilization at or above this is critical
    pub memory_critical: f64,
    /// Update success rate below this warns
    pub success_rate_warning: f64,
    /// Update success rate below this is critical
    pub success_rate_critical: f64,
    /// Average update duration at or above this warns
    pub latency_warning_ms: f64,
    /// Average update duration at or above this is critical
    pub latency_critical_ms: f64,
    /// Queue fill ratio at or above this warns
    pub queue_warning: f64,
    /// Queue fill ratio at or above this is critical
    pub queue_critical: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            hit_rate_warning: 0.7,
            hit_rate_critical: 0.4,
            min_lookups: 20,
            memory_warning: 0.8,
            memory_critical: 0.95,
            success_rate_warning: 0.95,
            success_rate_critical: 0.8,
            latency_warning_ms: 1_000.0,
            latency_critical_ms: 5_000.0,
            queue_warning: 0.5,
            queue_critical: 0.9,
        }
    }
}

/// Sampling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Sampling period
    pub interval_ms: u64,
    /// Samples kept in the series
    pub retained_samples: usize,
    /// Classification thresholds
    pub thresholds: HealthThresholds,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            retained_samples: 1_440,
            thresholds: HealthThresholds::default(),
        }
    }
}

impl HealthConfig {
    /// Sampling period
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Overall health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No findings
    Excellent,
    /// A single warning
    Good,
    /// Several warnings
    Warning,
    /// At least one critical finding
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Critical => "critical",
        })
    }
}

/// Severity of one finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Outside the warning level
    Warning,
    /// Outside the critical level
    Critical,
}

/// Metric a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthMetric {
    /// Combined cache hit rate
    HitRate,
    /// Cache memory utilization
    Memory,
    /// Update operation success rate
    UpdateSuccess,
    /// Average update duration
    UpdateLatency,
    /// Sync queue fill ratio
    QueueDepth,
}

impl HealthMetric {
    /// Suggested remedy
    #[must_use]
    pub fn recommendation(self) -> &'static str {
        match self {
            Self::HitRate => "Cache hit rate is low: raise max_entries or ttl_ms, or check for files invalidated on every batch",
            Self::Memory => "Cache memory is near its limit: raise max_size_bytes or lower ttl_ms",
            Self::UpdateSuccess => "Update operations are failing: inspect the error recorded on recent operations",
            Self::UpdateLatency => "Updates are slow: lower max_incremental_files or register sections for targeted regeneration",
            Self::QueueDepth => "Sync queue is filling up: shorten flush_interval_ms or raise queue_capacity",
        }
    }
}

/// One threshold violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Metric
    pub metric: HealthMetric,
    /// Severity
    pub severity: Severity,
    /// Observed value
    pub value: f64,
    /// Human-readable description
    pub message: String,
}

/// Raw statistics a sample is computed from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthInputs {
    /// Analysis store
    pub analyses: CacheStats,
    /// Template store
    pub templates: CacheStats,
    /// Snapshot store
    pub snapshots: CacheStats,
    /// Scheduler history, if a scheduler runs
    pub updates: Option<UpdateStats>,
    /// Sync coordinator, if one runs
    pub sync: Option<SyncStats>,
}

/// Where a monitor reads its inputs from
pub trait HealthSource: Send + Sync {
    /// Current statistics of every observed component
    fn health_inputs(&self) -> HealthInputs;
}

/// Classified point-in-time health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// Overall status
    pub status: HealthStatus,
    /// Summed cache size estimates
    pub memory_bytes: usize,
    /// Summed cache byte limits
    pub memory_limit_bytes: usize,
    /// `memory_bytes / memory_limit_bytes`
    pub memory_utilization: f64,
    /// Combined hit rate, `None` before the first lookup
    pub hit_rate: Option<f64>,
    /// Analysis store hit rate
    pub analysis_hit_rate: f64,
    /// Template store hit rate
    pub template_hit_rate: f64,
    /// Snapshot store hit rate
    pub snapshot_hit_rate: f64,
    /// Cached analyses
    pub cached_analyses: usize,
    /// Cached templates
    pub cached_templates: usize,
    /// Cached snapshots
    pub cached_snapshots: usize,
    /// Evictions across all stores
    pub evictions: u64,
    /// Retained update operations
    pub operations: usize,
    /// Update success rate
    pub update_success_rate: f64,
    /// Average update duration
    pub average_update_ms: f64,
    /// Sync queue depth
    pub queue_depth: usize,
    /// Sync queue capacity
    pub queue_capacity: usize,
    /// Pending sync conflicts
    pub pending_conflicts: usize,
    /// Connected clients
    pub clients: usize,
    /// Threshold violations
    pub findings: Vec<Finding>,
}

/// Direction of the hit rate over the retained window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTrend {
    /// Later samples hit more often
    Improving,
    /// No significant change
    Stable,
    /// Later samples hit less often
    Degrading,
    /// Too few samples to tell
    Insufficient,
}

/// Summary for tooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Status of the latest sample
    pub status: HealthStatus,
    /// Latest sample
    pub latest: Option<HealthSample>,
    /// Samples retained
    pub sample_count: usize,
    /// Hit rate direction
    pub hit_rate_trend: HealthTrend,
    /// Suggested remedies for current findings
    pub recommendations: Vec<String>,
    /// When the report was built
    pub generated_at: DateTime<Utc>,
}

/// Overall status from a set of findings
#[must_use]
pub fn classify(findings: &[Finding]) -> HealthStatus {
    if findings.iter().any(|f| f.severity == Severity::Critical) {
        return HealthStatus::Critical;
    }
    match findings.len() {
        0 => HealthStatus::Excellent,
        1 => HealthStatus::Good,
        _ => HealthStatus::Warning,
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        part / whole
    }
}

fn below(metric: HealthMetric, value: f64, warning: f64, critical: f64, what: &str) -> Option<Finding> {
    let severity = if value < critical {
        Severity::Critical
    } else if value < warning {
        Severity::Warning
    } else {
        return None;
    };
    Some(Finding {
        metric,
        severity,
        value,
        message: format!("{what} {value:.2} below {:.2}", if severity == Severity::Critical { critical } else { warning }),
    })
}

fn above(metric: HealthMetric, value: f64, warning: f64, critical: f64, what: &str) -> Option<Finding> {
    let severity = if value >= critical {
        Severity::Critical
    } else if value >= warning {
        Severity::Warning
    } else {
        return None;
    };
    Some(Finding {
        metric,
        severity,
        value,
        message: format!("{what} {value:.2} at or above {:.2}", if severity == Severity::Critical { critical } else { warning }),
    })
}

/// Compute and classify a sample from raw statistics
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(inputs: &HealthInputs, thresholds: &HealthThresholds) -> HealthSample {
    let stores = [&inputs.analyses, &inputs.templates, &inputs.snapshots];
    let memory_bytes: usize = stores.iter().map(|s| s.total_size).sum();
    let memory_limit_bytes: usize = stores.iter().map(|s| s.max_size).sum();
    let hits: u64 = stores.iter().map(|s| s.hits).sum();
    let lookups: u64 = stores.iter().map(|s| s.hits + s.misses).sum();
    let memory_utilization = ratio(memory_bytes as f64, memory_limit_bytes as f64);
    let hit_rate = (lookups > 0).then(|| hits as f64 / lookups as f64);

    let mut findings = Vec::new();
    if let Some(rate) = hit_rate.filter(|_| lookups >= thresholds.min_lookups) {
        findings.extend(below(
            HealthMetric::HitRate,
            rate,
            thresholds.hit_rate_warning,
            thresholds.hit_rate_critical,
            "hit rate",
        ));
    }
    findings.extend(above(
        HealthMetric::Memory,
        memory_utilization,
        thresholds.memory_warning,
        thresholds.memory_critical,
        "memory utilization",
    ));

    let updates = inputs.updates.clone().unwrap_or_else(|| UpdateStats {
        total: 0,
        successful: 0,
        failed: 0,
        success_rate: 1.0,
        average_duration_ms: 0.0,
        by_type: Default::default(),
        last_completed_at: None,
    });
    if updates.total > 0 {
        findings.extend(below(
            HealthMetric::UpdateSuccess,
            updates.success_rate,
            thresholds.success_rate_warning,
            thresholds.success_rate_critical,
            "update success rate",
        ));
        findings.extend(above(
            HealthMetric::UpdateLatency,
            updates.average_duration_ms,
            thresholds.latency_warning_ms,
            thresholds.latency_critical_ms,
            "average update ms",
        ));
    }

    let sync = inputs.sync.clone().unwrap_or_default();
    if sync.queue_capacity > 0 {
        findings.extend(above(
            HealthMetric::QueueDepth,
            ratio(sync.queue_depth as f64, sync.queue_capacity as f64),
            thresholds.queue_warning,
            thresholds.queue_critical,
            "queue fill",
        ));
    }

    HealthSample {
        timestamp: Utc::now(),
        status: classify(&findings),
        memory_bytes,
        memory_limit_bytes,
        memory_utilization,
        hit_rate,
        analysis_hit_rate: inputs.analyses.hit_rate,
        template_hit_rate: inputs.templates.hit_rate,
        snapshot_hit_rate: inputs.snapshots.hit_rate,
        cached_analyses: inputs.analyses.entry_count,
        cached_templates: inputs.templates.entry_count,
        cached_snapshots: inputs.snapshots.entry_count,
        evictions: stores.iter().map(|s| s.evictions).sum(),
        operations: updates.total,
        update_success_rate: updates.success_rate,
        average_update_ms: updates.average_duration_ms,
        queue_depth: sync.queue_depth,
        queue_capacity: sync.queue_capacity,
        pending_conflicts: sync.pending_conflicts,
        clients: sync.clients,
        findings,
    }
}

fn trend(samples: &VecDeque<HealthSample>) -> HealthTrend {
    let rates: Vec<f64> = samples.iter().filter_map(|s| s.hit_rate).collect();
    if rates.len() < 4 {
        return HealthTrend::Insufficient;
    }
    let (early, late) = rates.split_at(rates.len() / 2);
    #[allow(clippy::cast_precision_loss)]
    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let delta = mean(late) - mean(early);
    if delta > 0.05 {
        HealthTrend::Improving
    } else if delta < -0.05 {
        HealthTrend::Degrading
    } else {
        HealthTrend::Stable
    }
}

#[derive(Serialize)]
struct CsvRow {
    timestamp: String,
    status: HealthStatus,
    memory_bytes: usize,
    memory_limit_bytes: usize,
    memory_utilization: f64,
    hit_rate: Option<f64>,
    analysis_hit_rate: f64,
    template_hit_rate: f64,
    snapshot_hit_rate: f64,
    cached_analyses: usize,
    evictions: u64,
    operations: usize,
    update_success_rate: f64,
    average_update_ms: f64,
    queue_depth: usize,
    pending_conflicts: usize,
    clients: usize,
    findings: String,
}

impl From<&HealthSample> for CsvRow {
    fn from(sample: &HealthSample) -> Self {
        Self {
            timestamp: sample.timestamp.to_rfc3339(),
            status: sample.status,
            memory_bytes: sample.memory_bytes,
            memory_limit_bytes: sample.memory_limit_bytes,
            memory_utilization: sample.memory_utilization,
            hit_rate: sample.hit_rate,
            analysis_hit_rate: sample.analysis_hit_rate,
            template_hit_rate: sample.template_hit_rate,
            snapshot_hit_rate: sample.snapshot_hit_rate,
            cached_analyses: sample.cached_analyses,
            evictions: sample.evictions,
            operations: sample.operations,
            update_success_rate: sample.update_success_rate,
            average_update_ms: sample.average_update_ms,
            queue_depth: sample.queue_depth,
            pending_conflicts: sample.pending_conflicts,
            clients: sample.clients,
            findings: sample
                .findings
                .iter()
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// Samples health on demand or periodically
pub struct CacheHealthMonitor {
    config: HealthConfig,
    source: Arc<dyn HealthSource>,
    samples: Mutex<VecDeque<HealthSample>>,
}

impl fmt::Debug for CacheHealthMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHealthMonitor")
            .field("config", &self.config)
            .field("samples", &self.samples.lock().len())
            .finish_non_exhaustive()
    }
}

impl CacheHealthMonitor {
    /// Create monitor reading from `source`
    #[must_use]
    pub fn new(config: HealthConfig, source: Arc<dyn HealthSource>) -> Self {
        Self {
            config,
            source,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Take, classify and retain one sample
    pub fn sample(&self) -> HealthSample {
        let sample = evaluate(&self.source.health_inputs(), &self.config.thresholds);
        let mut samples = self.samples.lock();
        let previous = samples.back().map(|s| s.status);
        while samples.len() >= self.config.retained_samples.max(1) {
            samples.pop_front();
        }
        samples.push_back(sample.clone());
        drop(samples);

        if previous != Some(sample.status) && sample.status >= HealthStatus::Warning {
            warn!(status = %sample.status, findings = sample.findings.len(), "cache health degraded");
        } else {
            debug!(status = %sample.status, hit_rate = ?sample.hit_rate, "health sampled");
        }
        sample
    }

    /// Newest sample
    #[must_use]
    pub fn latest(&self) -> Option<HealthSample> {
        self.samples.lock().back().cloned()
    }

    /// Retained series, oldest first
    #[must_use]
    pub fn samples(&self) -> Vec<HealthSample> {
        self.samples.lock().iter().cloned().collect()
    }

    /// Summary of the retained series
    #[must_use]
    pub fn report(&self) -> HealthReport {
        let samples = self.samples.lock();
        let latest = samples.back().cloned();
        let hit_rate_trend = trend(&samples);
        let mut recommendations: Vec<String> = Vec::new();
        for finding in latest.iter().flat_map(|s| s.findings.iter()) {
            let advice = finding.metric.recommendation().to_string();
            if !recommendations.contains(&advice) {
                recommendations.push(advice);
            }
        }
        if hit_rate_trend == HealthTrend::Degrading {
            recommendations.push("Hit rate is trending down: check whether recent batches trigger full regenerations".into());
        }

        HealthReport {
            status: latest.as_ref().map_or(HealthStatus::Excellent, |s| s.status),
            latest,
            sample_count: samples.len(),
            hit_rate_trend,
            recommendations,
            generated_at: Utc::now(),
        }
    }

    /// Retained series as a JSON array
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn export_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(&*self.samples.lock())?)
    }

    /// Retained series as CSV with a header row
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn export_csv(&self) -> Result<String, ExportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for sample in self.samples.lock().iter() {
            writer.serialize(CsvRow::from(sample))?;
        }
        let bytes = writer.into_inner().map_err(|err| err.into_error())?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Sample every `interval_ms` on the current runtime until aborted
    #[must_use]
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let period = monitor.config.interval().max(Duration::from_millis(1));
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                monitor.sample();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Mutex<HealthInputs>);

    impl HealthSource for Fixed {
        fn health_inputs(&self) -> HealthInputs {
            self.0.lock().clone()
        }
    }

    fn stats(hits: u64, misses: u64, total_size: usize, max_size: usize) -> CacheStats {
        CacheStats {
            hits,
            misses,
            total_size,
            max_size,
            ..CacheStats::default()
        }
    }

    fn finding(severity: Severity) -> Finding {
        Finding {
            metric: HealthMetric::Memory,
            severity,
            value: 0.0,
            message: String::new(),
        }
    }

    fn monitor(inputs: HealthInputs, retained: usize) -> (Arc<Fixed>, CacheHealthMonitor) {
        let source = Arc::new(Fixed(Mutex::new(inputs)));
        let config = HealthConfig {
            retained_samples: retained,
            ..HealthConfig::default()
        };
        (Arc::clone(&source), CacheHealthMonitor::new(config, source))
    }

    #[test]
    fn classification_rules() {
        assert_eq!(classify(&[]), HealthStatus::Excellent);
        assert_eq!(classify(&[finding(Severity::Warning)]), HealthStatus::Good);
        assert_eq!(
            classify(&[finding(Severity::Warning), finding(Severity::Warning)]),
            HealthStatus::Warning
        );
        assert_eq!(classify(&[finding(Severity::Critical)]), HealthStatus::Critical);
    }

    #[test]
    fn healthy_caches_are_excellent() {
        let inputs = HealthInputs {
            analyses: stats(90, 10, 1_000, 100_000),
            ..HealthInputs::default()
        };
        let sample = evaluate(&inputs, &HealthThresholds::default());
        assert_eq!(sample.status, HealthStatus::Excellent);
        assert!((sample.hit_rate.unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn few_lookups_do_not_judge_hit_rate() {
        let inputs = HealthInputs {
            analyses: stats(0, 5, 0, 100),
            ..HealthInputs::default()
        };
        let sample = evaluate(&inputs, &HealthThresholds::default());
        assert!(sample.findings.is_empty());
        assert_eq!(sample.hit_rate, Some(0.0));
    }

    #[test]
    fn low_hit_rate_and_full_memory_is_critical() {
        let inputs = HealthInputs {
            analyses: stats(10, 90, 99, 100),
            ..HealthInputs::default()
        };
        let sample = evaluate(&inputs, &HealthThresholds::default());
        assert_eq!(sample.status, HealthStatus::Critical);
        assert_eq!(sample.findings.len(), 2);
    }

    #[test]
    fn queue_and_updates_are_judged() {
        let inputs = HealthInputs {
            updates: Some(UpdateStats {
                total: 10,
                successful: 9,
                failed: 1,
                success_rate: 0.9,
                average_duration_ms: 10.0,
                by_type: Default::default(),
                last_completed_at: None,
            }),
            sync: Some(SyncStats {
                queue_depth: 60,
                queue_capacity: 100,
                ..SyncStats::default()
            }),
            ..HealthInputs::default()
        };
        let sample = evaluate(&inputs, &HealthThresholds::default());
        let metrics: Vec<HealthMetric> = sample.findings.iter().map(|f| f.metric).collect();
        assert_eq!(metrics, [HealthMetric::UpdateSuccess, HealthMetric::QueueDepth]);
        assert_eq!(sample.status, HealthStatus::Warning);
    }

    #[test]
    fn series_is_bounded() {
        let (_, monitor) = monitor(HealthInputs::default(), 3);
        for _ in 0..5 {
            monitor.sample();
        }
        assert_eq!(monitor.samples().len(), 3);
        assert_eq!(monitor.report().sample_count, 3);
    }

    #[test]
    fn report_detects_degrading_hit_rate() {
        let (source, monitor) = monitor(HealthInputs::default(), 10);
        for (hits, misses) in [(95, 5), (90, 10), (50, 50), (40, 60)] {
            source.0.lock().analyses = stats(hits, misses, 0, 100);
            monitor.sample();
        }
        let report = monitor.report();
        assert_eq!(report.hit_rate_trend, HealthTrend::Degrading);
        assert!(report.recommendations.iter().any(|r| r.contains("trending down")));
        assert!(report.recommendations.iter().any(|r| r.contains("hit rate is low")));
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let (_, monitor) = monitor(HealthInputs::default(), 10);
        monitor.sample();
        monitor.sample();

        let csv = monitor.export_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,status,memory_bytes"));
        assert!(lines[1].contains(",excellent,"));
    }

    #[test]
    fn json_export_round_trips_series() {
        let (_, monitor) = monitor(HealthInputs::default(), 10);
        monitor.sample();
        let parsed: Vec<HealthSample> = serde_json::from_str(&monitor.export_json().unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].status, HealthStatus::Excellent);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sampling() {
        let (_, monitor) = monitor(HealthInputs::default(), 10);
        let monitor = Arc::new(monitor);
        let task = monitor.spawn();

        time::sleep(Duration::from_millis(120_500)).await;
        task.abort();
        // ticks at 0s, 60s and 120s
        assert_eq!(monitor.samples().len(), 3);
    }
}
