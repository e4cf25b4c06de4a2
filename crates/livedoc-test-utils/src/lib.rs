//! Testing utilities for the livedoc workspace
//!
//! Shared fixtures: temporary project trees, in-memory transports and an
//! analyzer with canned results.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use livedoc_core::cache::path_key;
use livedoc_core::sync::{ClientTransport, MessageType, SyncMessage, TransportError};
use livedoc_core::{AnalysisError, Analyzer, FileAnalysis};
use parking_lot::Mutex;
use serde_json::json;

/// Project tree in a temporary directory, removed on drop
#[derive(Debug)]
pub struct TempProject {
    dir: tempfile::TempDir,
}

impl TempProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Project with `count` small TypeScript modules `src/mod_<i>.ts`
    pub fn with_modules(count: usize) -> Self {
        let project = Self::new();
        for i in 0..count {
            project.write(
                format!("src/mod_{i}.ts"),
                &format!("export const value{i} = {i};\n"),
            );
        }
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Normalized cache key of a project file
    pub fn key(&self, relative: impl AsRef<Path>) -> String {
        path_key(&self.path(relative))
    }

    /// Write a file, creating parent directories
    pub fn write(&self, relative: impl AsRef<Path>, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn remove(&self, relative: impl AsRef<Path>) {
        std::fs::remove_file(self.path(relative)).unwrap();
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport keeping every delivered message
#[derive(Debug, Default)]
pub struct RecordingTransport {
    messages: Mutex<Vec<SyncMessage>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<SyncMessage> {
        self.messages.lock().clone()
    }

    pub fn of_kind(&self, kind: MessageType) -> Vec<SyncMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|message| message.kind == kind)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl ClientTransport for RecordingTransport {
    fn send(&self, message: &SyncMessage) -> Result<(), TransportError> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

/// Transport whose client is gone
#[derive(Debug, Default)]
pub struct FailingTransport {
    attempts: AtomicUsize,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ClientTransport for FailingTransport {
    fn send(&self, _message: &SyncMessage) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Closed)
    }
}

/// Analyzer returning fixed dependencies and counting calls per file
///
/// Reads the file so content changes show up in the result, and reports
/// missing files as not found.
#[derive(Debug, Default)]
pub struct CannedAnalyzer {
    extensions: Vec<String>,
    dependencies: Mutex<BTreeMap<String, Vec<String>>>,
    calls: Mutex<BTreeMap<String, usize>>,
}

impl CannedAnalyzer {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Declare `path` as depending on `dependencies` (all absolute keys)
    pub fn depends(&self, path: impl Into<String>, dependencies: Vec<String>) {
        self.dependencies.lock().insert(path.into(), dependencies);
    }

    pub fn calls(&self, path: &Path) -> usize {
        self.calls.lock().get(&path_key(path)).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Analyzer for CannedAnalyzer {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    async fn analyze(&self, path: &Path) -> Result<FileAnalysis, AnalysisError> {
        let key = path_key(path);
        *self.calls.lock().entry(key.clone()).or_default() += 1;
        let content = std::fs::read_to_string(path).map_err(|err| AnalysisError::io(path, err))?;
        let dependencies = self.dependencies.lock().get(&key).cloned().unwrap_or_default();
        Ok(FileAnalysis::new(json!({
            "path": key,
            "bytes": content.len(),
            "content": content,
        }))
        .with_dependencies(dependencies))
    }
}
