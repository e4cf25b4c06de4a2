//! Analyzer collaborator
//!
//! An [`Analyzer`] turns one source file into opaque JSON plus the paths the
//! result depends on, and folds per-file artifacts into a project aggregate.
//! [`SourceStatsAnalyzer`] is the built-in line/comment/marker counter used by
//! the CLI when no language tooling is plugged in.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use livedoc_cache::{normalize_path, path_key, AnalysisArtifact};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AnalysisError;

/// Output of analyzing one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Analyzer-specific result
    pub analysis: Value,
    /// Files and templates the result relies on
    pub dependencies: Vec<String>,
}

impl FileAnalysis {
    /// Create analysis without dependencies
    #[inline]
    #[must_use]
    pub fn new(analysis: Value) -> Self {
        Self {
            analysis,
            dependencies: Vec::new(),
        }
    }

    /// With dependencies
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// Produces per-file and project-wide analyses
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Whether this analyzer handles `path`
    fn supports(&self, path: &Path) -> bool;

    /// Analyze one file
    async fn analyze(&self, path: &Path) -> Result<FileAnalysis, AnalysisError>;

    /// Fold per-file artifacts into a project aggregate
    async fn analyze_project(
        &self,
        root: &Path,
        files: &[AnalysisArtifact],
    ) -> Result<Value, AnalysisError> {
        Ok(json!({
            "root": path_key(root),
            "files": files.len(),
        }))
    }
}

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "java", "kt", "rb", "c", "h", "cc",
    "cpp", "hpp", "cs", "swift", "php", "scala", "sh", "md",
];

/// Line, comment, marker and import counter
#[derive(Debug, Clone)]
pub struct SourceStatsAnalyzer {
    marker: Regex,
    import: Regex,
}

impl SourceStatsAnalyzer {
    /// Create analyzer
    ///
    /// # Errors
    /// Returns error if a built-in pattern fails to compile
    pub fn new() -> Result<Self, AnalysisError> {
        Ok(Self {
            marker: Regex::new(r"\b(TODO|FIXME|XXX|HACK)\b")?,
            import: Regex::new(
                r#"^\s*(?:import\s+(?:[^'"]*\s+from\s+)?['"]([^'"]+)['"]|(?:const|let|var)\s+\w+\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\)|from\s+(\.[\w.]*)\s+import|#include\s+"([^"]+)"|mod\s+(\w+)\s*;)"#,
            )?,
        })
    }

    fn language(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
            "rs" => "rust",
            "ts" | "tsx" => "typescript",
            "js" | "jsx" | "mjs" | "cjs" => "javascript",
            "py" => "python",
            "go" => "go",
            "java" => "java",
            "kt" => "kotlin",
            "rb" => "ruby",
            "c" | "h" => "c",
            "cc" | "cpp" | "hpp" => "cpp",
            "cs" => "csharp",
            "swift" => "swift",
            "php" => "php",
            "scala" => "scala",
            "sh" => "shell",
            "md" => "markdown",
            _ => "other",
        }
    }

    fn is_comment(line: &str) -> bool {
        ["//", "#", "/*", "*", "--", "<!--", "\"\"\""]
            .iter()
            .any(|prefix| line.starts_with(prefix))
    }

    /// Compute stats for already loaded `content`
    #[must_use]
    pub fn stats(&self, path: &Path, content: &str) -> (Value, Vec<String>) {
        let mut lines = 0usize;
        let mut blank = 0usize;
        let mut comments = 0usize;
        let mut markers: BTreeMap<String, usize> = BTreeMap::new();
        let mut imports: Vec<String> = Vec::new();

        for line in content.lines() {
            lines += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                blank += 1;
                continue;
            }
            if Self::is_comment(trimmed) {
                comments += 1;
            }
            for capture in self.marker.captures_iter(trimmed) {
                *markers.entry(capture[1].to_string()).or_default() += 1;
            }
            if let Some(capture) = self.import.captures(line) {
                if let Some(target) = capture.iter().skip(1).flatten().next() {
                    imports.push(target.as_str().to_string());
                }
            }
        }

        let dependencies = imports
            .iter()
            .filter_map(|import| resolve_import(path, import))
            .collect();

        let analysis = json!({
            "language": Self::language(path),
            "lines": lines,
            "blank": blank,
            "comments": comments,
            "code": lines - blank - comments.min(lines - blank),
            "markers": markers,
            "imports": imports,
        });
        (analysis, dependencies)
    }
}

/// Lexical resolution of relative imports against the importing file
fn resolve_import(from: &Path, import: &str) -> Option<String> {
    let relative = import.starts_with("./") || import.starts_with("../");
    let include = !import.contains('/') && import.contains('.') && !import.starts_with('.');
    if !relative && !include {
        return None;
    }
    let base = from.parent().unwrap_or_else(|| Path::new(""));
    let mut resolved = normalize_path(&base.join(import));
    if resolved.extension().is_none() {
        if let Some(ext) = from.extension() {
            resolved.set_extension(ext);
        }
    }
    Some(path_key(&resolved))
}

#[async_trait]
impl Analyzer for SourceStatsAnalyzer {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
    }

    async fn analyze(&self, path: &Path) -> Result<FileAnalysis, AnalysisError> {
        if !self.supports(path) {
            return Err(AnalysisError::Unsupported {
                path: path.to_path_buf(),
            });
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AnalysisError::io(path, e))?;
        let (analysis, dependencies) = self.stats(path, &content);
        Ok(FileAnalysis::new(analysis).with_dependencies(dependencies))
    }

    async fn analyze_project(
        &self,
        root: &Path,
        files: &[AnalysisArtifact],
    ) -> Result<Value, AnalysisError> {
        let mut languages: BTreeMap<String, usize> = BTreeMap::new();
        let mut markers: BTreeMap<String, u64> = BTreeMap::new();
        let (mut lines, mut comments) = (0u64, 0u64);

        for artifact in files {
            let analysis = &artifact.analysis;
            let language = analysis["language"].as_str().unwrap_or("other");
            *languages.entry(language.to_string()).or_default() += 1;
            lines += analysis["lines"].as_u64().unwrap_or(0);
            comments += analysis["comments"].as_u64().unwrap_or(0);
            if let Some(found) = analysis["markers"].as_object() {
                for (marker, count) in found {
                    *markers.entry(marker.clone()).or_default() += count.as_u64().unwrap_or(0);
                }
            }
        }

        Ok(json!({
            "root": path_key(root),
            "files": files.len(),
            "lines": lines,
            "comments": comments,
            "languages": languages,
            "markers": markers,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> SourceStatsAnalyzer {
        SourceStatsAnalyzer::new().unwrap()
    }

    #[test]
    fn counts_lines_comments_and_markers() {
        let source = "import { x } from './util';\n\n// TODO: split\nconst a = 1; // FIXME later\n";
        let (analysis, deps) = analyzer().stats(Path::new("src/a.ts"), source);

        assert_eq!(analysis["language"], "typescript");
        assert_eq!(analysis["lines"], 4);
        assert_eq!(analysis["blank"], 1);
        assert_eq!(analysis["comments"], 1);
        assert_eq!(analysis["markers"]["TODO"], 1);
        assert_eq!(analysis["markers"]["FIXME"], 1);
        assert_eq!(deps, ["src/util.ts"]);
    }

    #[test]
    fn resolves_parent_and_include_imports() {
        assert_eq!(
            resolve_import(Path::new("src/lib/a.js"), "../b.js").as_deref(),
            Some("src/b.js")
        );
        assert_eq!(
            resolve_import(Path::new("src/main.c"), "util.h").as_deref(),
            Some("src/util.h")
        );
        assert_eq!(resolve_import(Path::new("src/a.ts"), "react"), None);
    }

    #[test]
    fn supports_source_extensions_only() {
        let analyzer = analyzer();
        assert!(analyzer.supports(Path::new("a.rs")));
        assert!(analyzer.supports(Path::new("docs/readme.md")));
        assert!(!analyzer.supports(Path::new("templates/base.hbs")));
        assert!(!analyzer.supports(Path::new("Makefile")));
    }

    #[tokio::test]
    async fn analyze_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        std::fs::write(&path, "mod util;\n// XXX\nfn main() {}\n").unwrap();

        let result = analyzer().analyze(&path).await.unwrap();
        assert_eq!(result.analysis["language"], "rust");
        assert_eq!(result.analysis["markers"]["XXX"], 1);
        assert!(result.dependencies.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = analyzer()
            .analyze(Path::new("/definitely/missing.rs"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn project_aggregate_sums_files() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = analyzer();
        let mut artifacts = Vec::new();
        for (name, body) in [("a.ts", "// TODO\nx\n"), ("b.py", "# TODO\n# FIXME\ny\n")] {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            let analysis = analyzer.analyze(&path).await.unwrap();
            artifacts.push(
                AnalysisArtifact::capture(&path, analysis.analysis)
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }

        let project = analyzer.analyze_project(dir.path(), &artifacts).await.unwrap();
        assert_eq!(project["files"], 2);
        assert_eq!(project["lines"], 5);
        assert_eq!(project["markers"]["TODO"], 2);
        assert_eq!(project["languages"]["python"], 1);
    }
}
