//! livedoc update scheduler
//!
//! Turns bursts of file change events into one update decision per batch.
//!
//! # Core Concepts
//!
//! - [`ChangeEvent`]: what a watcher reports
//! - [`select_strategy`]: pure rule chain choosing an [`UpdateType`]
//! - [`UpdateScheduler`]: the Idle/Batching/Executing task applying batches
//!   to the caches, driven through a [`SchedulerHandle`]
//! - [`Regenerator`]: hook for re-analysis and re-rendering
//! - [`OperationHistory`]: bounded record of executed batches and their
//!   [`UpdateStats`]

#![warn(unreachable_pub)]

mod config;
mod error;
mod event;
mod history;
mod scheduler;
mod section;
mod strategy;

pub use config::SchedulerConfig;
pub use error::{RegenerationError, SchedulerError};
pub use event::{ChangeEvent, ChangeKind};
pub use history::{OperationHistory, UpdateOperation, UpdateStats};
pub use scheduler::{
    NoopRegenerator, Regenerator, SchedulerEvent, SchedulerHandle, SchedulerState, UpdateScheduler,
};
pub use section::{SectionDependency, SectionRegistry};
pub use strategy::{select_strategy, UpdateType};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
