//! Live file metadata
//!
//! [`FileMetadata`] is recomputed on demand for each validation check and is
//! never treated as authoritative beyond that check.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::hash::ContentHash;

/// Identity of a file at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File path as given by the caller
    pub path: PathBuf,
    /// Blake3 hash of the file content
    pub hash: ContentHash,
    /// Size in bytes
    pub size: u64,
    /// Last modification time reported by the filesystem
    pub modified: DateTime<Utc>,
}

impl FileMetadata {
    /// Read the current metadata of `path`
    ///
    /// Returns `Ok(None)` when the file does not exist (or is not a regular
    /// file), including the case where it vanishes mid-read.
    ///
    /// # Errors
    /// Returns error for I/O failures other than not-found
    pub async fn read(path: impl AsRef<Path>) -> Result<Option<Self>, CacheError> {
        let path = path.as_ref();

        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        if !meta.is_file() {
            return Ok(None);
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH));

        Ok(Some(Self {
            path: path.to_path_buf(),
            hash: ContentHash::compute(&bytes),
            size: bytes.len() as u64,
            modified,
        }))
    }

    /// Check whether `current` still describes the same content
    ///
    /// Hash, size and modification time must all agree.
    #[inline]
    #[must_use]
    pub fn matches(&self, current: &FileMetadata) -> bool {
        self.hash == current.hash && self.size == current.size && self.modified == current.modified
    }
}

/// Hash the current content of `path`, `None` if it does not exist
///
/// # Errors
/// Returns error for I/O failures other than not-found
pub async fn hash_file(path: impl AsRef<Path>) -> Result<Option<ContentHash>, CacheError> {
    Ok(FileMetadata::read(path).await?.map(|meta| meta.hash))
}

/// Lexically drop `.` components and fold `..` into their parent
///
/// Does not touch the filesystem, so symlinks are not resolved. A `..` that
/// has no parent to fold into is kept on relative paths and dropped at the
/// root.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Normalized cache key for a path
#[inline]
#[must_use]
pub fn path_key(path: &Path) -> String {
    normalize_path(path).to_string_lossy().into_owned()
}
