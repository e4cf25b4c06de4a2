//! livedoc subscriber sync
//!
//! Delivers regenerated documentation to connected clients and reconciles
//! it with direct manual edits of the same documents.
//!
//! # Core Concepts
//!
//! - [`DocumentUpdate`]: new content for one published document
//! - [`SyncCoordinator`]: client registry, bounded drop-oldest queue,
//!   conflict table and broadcast
//! - [`SyncConflict`] / [`Resolution`]: competing auto and manual content
//!   and how it is settled
//! - [`ClientTransport`]: delivery seam for a hub (e.g. websockets)
//! - [`SyncWorker`]: periodic flush and heartbeat
//!
//! Delivery is best effort. Nothing is persisted.

#![warn(unreachable_pub)]

mod config;
mod conflict;
mod coordinator;
mod error;
mod message;
mod transport;
mod worker;

pub use config::SyncConfig;
pub use conflict::{ConflictSide, ConflictStatus, Resolution, SyncConflict};
pub use coordinator::{FlushReport, QueueOutcome, SyncCoordinator, SyncEvent, SyncStats};
pub use error::{SyncError, TransportError};
pub use message::{DocumentUpdate, MessageType, SyncMessage, UpdateScope, UpdateSource};
pub use transport::{ChannelTransport, ClientSession, ClientTransport};
pub use worker::SyncWorker;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
