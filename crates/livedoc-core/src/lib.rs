//! livedoc engine
//!
//! Keeps generated documentation in step with a changing source tree.
//!
//! # Core Concepts
//!
//! - [`Livedoc`]: one engine per project root, built with [`LivedocBuilder`]
//! - [`Analyzer`] / [`Renderer`]: the pluggable collaborators that turn
//!   source files into analyses and analyses into documents
//! - [`RegenerationPipeline`]: what the scheduler runs after a batch
//! - [`CacheHealthMonitor`]: periodic classification of cache and update
//!   health with JSON/CSV export
//! - [`LivedocConfig`]: TOML configuration for every component
//!
//! The component crates are re-exported as [`cache`], [`scheduler`] and
//! [`sync`].
//!
//! # Example
//!
//! ```rust,ignore
//! use livedoc_core::{Livedoc, scheduler::ChangeEvent};
//!
//! let livedoc = Livedoc::builder("./my-project").build()?;
//! livedoc.scan().await?;
//! livedoc.submit_changes(vec![ChangeEvent::modified("src/a.ts")])?;
//! let analysis = livedoc.get_analysis("src/a.ts").await?;
//! ```

#![warn(unreachable_pub)]

mod analyzer;
mod config;
mod engine;
mod error;
mod health;
mod pipeline;
mod renderer;
mod service;

pub use livedoc_cache as cache;
pub use livedoc_scheduler as scheduler;
pub use livedoc_sync as sync;

pub use analyzer::{Analyzer, FileAnalysis, SourceStatsAnalyzer};
pub use config::{CacheSettings, LivedocConfig, ProjectSettings};
pub use engine::{Livedoc, LivedocBuilder, LivedocStats, ScanSummary};
pub use error::{AnalysisError, ConfigError, ExportError, LivedocError, RenderError};
pub use health::{
    classify, evaluate, CacheHealthMonitor, Finding, HealthConfig, HealthInputs, HealthMetric,
    HealthReport, HealthSample, HealthSource, HealthStatus, HealthThresholds, HealthTrend,
    Severity,
};
pub use pipeline::RegenerationPipeline;
pub use renderer::{MarkdownRenderer, RenderedDocument, Renderer};
pub use service::AnalysisService;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
