//! Error types for the livedoc engine
//!
//! - [`LivedocError`]: everything the engine surfaces, wrapping the cache,
//!   scheduler and sync errors
//! - [`ConfigError`]: loading and validating [`LivedocConfig`](crate::LivedocConfig)
//! - [`AnalysisError`] / [`RenderError`]: failures of the collaborators
//! - [`ExportError`]: health series export

use std::io;
use std::path::PathBuf;

use livedoc_cache::CacheError;
use livedoc_scheduler::{RegenerationError, SchedulerError};
use livedoc_sync::SyncError;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum LivedocError {
    /// Cache access failed
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Scheduler unavailable
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Sync coordinator error
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Analyzer failed
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    /// Renderer failed
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// Health export failed
    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    /// Project tree could not be walked
    #[error("project walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// Background task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl LivedocError {
    /// Check if retrying the same call may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cache(err) => err.is_retryable(),
            Self::Analysis(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// Config file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// File is not valid TOML for the config schema
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted field path
        field: &'static str,
        /// What is wrong
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Analyzer failure
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// No analyzer handles this file type
    #[error("unsupported file: {}", path.display())]
    Unsupported {
        /// Rejected file
        path: PathBuf,
    },

    /// File could not be read
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File being analyzed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Analyzer rejected the content
    #[error("analysis of {} failed: {message}", path.display())]
    Failed {
        /// File being analyzed
        path: PathBuf,
        /// Cause
        message: String,
    },

    /// Built-in pattern failed to compile
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl AnalysisError {
    /// Create I/O error for `path`
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the file vanished before it could be read
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Check if retrying may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { source, .. } if matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            )
        )
    }
}

/// Renderer failure
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Section references a template that does not exist
    #[error("missing template: {0}")]
    MissingTemplate(String),

    /// Rendering failed
    #[error("{0}")]
    Failed(String),
}

/// Health export failure
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// JSON encoding failed
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encoding failed
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    /// Writer could not be flushed
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// Output was not UTF-8
    #[error("encoding: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

impl From<AnalysisError> for RegenerationError {
    fn from(err: AnalysisError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<RenderError> for RegenerationError {
    fn from(err: RenderError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<LivedocError> for RegenerationError {
    fn from(err: LivedocError) -> Self {
        Self::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_analysis_is_detected() {
        let err = AnalysisError::io("a.ts", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn interrupted_analysis_is_retryable() {
        let err: LivedocError =
            AnalysisError::io("a.ts", io::Error::from(io::ErrorKind::Interrupted)).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn collaborator_errors_become_regeneration_errors() {
        let err: RegenerationError = RenderError::MissingTemplate("base.hbs".into()).into();
        assert_eq!(err.message, "missing template: base.hbs");
    }

    #[test]
    fn invalid_config_display() {
        let err = ConfigError::invalid("sync.queue_capacity", "must be positive");
        assert_eq!(err.to_string(), "invalid sync.queue_capacity: must be positive");
    }
}
