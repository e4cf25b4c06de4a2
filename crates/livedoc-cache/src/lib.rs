//! livedoc cache layer
//!
//! Content-addressed caches that keep derived documentation artifacts
//! consistent with rapidly changing source files.
//!
//! # Core Concepts
//!
//! - [`ContentAddressableCache<T>`]: generic hash/TTL/LRU store
//! - [`ArtifactCache`]: per-file analyses and compiled templates plus the
//!   dependency graph used for cascade invalidation
//! - [`ProjectSnapshotCache`]: whole-project aggregates validated by a
//!   file-hash manifest, all or nothing
//! - [`ContentHash`] / [`FileMetadata`]: identity of a live resource
//!
//! Nothing here is persisted. Every cache can be rebuilt from source content
//! after a cold start.
//!
//! # Example
//!
//! ```rust,ignore
//! use livedoc_cache::{AnalysisArtifact, ArtifactCache, InvalidationReason};
//!
//! let cache = ArtifactCache::default();
//! let artifact = AnalysisArtifact::capture("src/a.ts", analysis).await?.unwrap();
//! cache.set("src/a.ts", artifact, ["templates/base.hbs"]).await?;
//!
//! // later: base.hbs changed, so a.ts is stale too
//! cache.invalidate("templates/base.hbs", InvalidationReason::ContentChanged);
//! assert!(cache.get("src/a.ts").await?.is_none());
//! ```

#![warn(unreachable_pub)]

mod artifact;
mod error;
mod graph;
mod hash;
mod metadata;
mod snapshot;
mod store;

pub use artifact::{
    AnalysisArtifact, ArtifactCache, ArtifactCacheConfig, ArtifactCacheStats, CompiledTemplate,
    InvalidationReason,
};
pub use error::CacheError;
pub use graph::DependencyGraph;
pub use hash::{ContentHash, HashError};
pub use metadata::{hash_file, normalize_path, path_key, FileMetadata};
pub use snapshot::{FileManifest, ProjectSnapshot, ProjectSnapshotCache};
pub use store::{CacheConfig, CacheStats, ContentAddressableCache};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
