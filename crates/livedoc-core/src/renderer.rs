//! Renderer collaborator

use std::fmt::Write as _;
use std::path::Path;

use async_trait::async_trait;
use livedoc_cache::{path_key, AnalysisArtifact, CompiledTemplate, ProjectSnapshot};
use livedoc_scheduler::SectionDependency;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Output ready to publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDocument {
    /// Published document path
    pub path: String,
    /// Full content
    pub content: String,
}

/// Turns cached analyses into published documents
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Compile template source into the form `render_section` consumes
    ///
    /// # Errors
    /// Returns error if the template is malformed
    fn compile_template(&self, _path: &Path, source: &str) -> Result<String, RenderError> {
        Ok(source.to_string())
    }

    /// Render one section from the analyses of its files
    async fn render_section(
        &self,
        section: &SectionDependency,
        artifacts: &[AnalysisArtifact],
        template: Option<&CompiledTemplate>,
    ) -> Result<RenderedDocument, RenderError>;

    /// Render the project overview
    async fn render_project(&self, snapshot: &ProjectSnapshot) -> Result<RenderedDocument, RenderError>;
}

/// Markdown renderer with `{{title}}` / `{{content}}` placeholders
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    output_dir: String,
}

impl MarkdownRenderer {
    /// Create renderer publishing under `output_dir`
    #[must_use]
    pub fn new(output_dir: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn document_path(&self, name: &str) -> String {
        format!("{}/{name}.md", self.output_dir.trim_end_matches('/'))
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new("docs")
    }
}

#[async_trait]
impl Renderer for MarkdownRenderer {
    fn compile_template(&self, path: &Path, source: &str) -> Result<String, RenderError> {
        if source.matches("{{").count() != source.matches("}}").count() {
            return Err(RenderError::Failed(format!(
                "unbalanced placeholder in {}",
                path.display()
            )));
        }
        Ok(source.to_string())
    }

    async fn render_section(
        &self,
        section: &SectionDependency,
        artifacts: &[AnalysisArtifact],
        template: Option<&CompiledTemplate>,
    ) -> Result<RenderedDocument, RenderError> {
        let mut body = String::new();
        for artifact in artifacts {
            let pretty = serde_json::to_string_pretty(&artifact.analysis)
                .map_err(|e| RenderError::Failed(e.to_string()))?;
            let _ = write!(
                body,
                "### `{}`\n\n```json\n{pretty}\n```\n\n",
                path_key(&artifact.path)
            );
        }

        let content = match (template, &section.template_id) {
            (Some(template), _) => template
                .compiled
                .replace("{{title}}", &section.id)
                .replace("{{content}}", body.trim_end()),
            (None, Some(missing)) => return Err(RenderError::MissingTemplate(missing.clone())),
            (None, None) => format!("## {}\n\n{}\n", section.id, body.trim_end()),
        };

        Ok(RenderedDocument {
            path: self.document_path(&section.id),
            content,
        })
    }

    async fn render_project(&self, snapshot: &ProjectSnapshot) -> Result<RenderedDocument, RenderError> {
        let pretty = serde_json::to_string_pretty(&snapshot.analysis)
            .map_err(|e| RenderError::Failed(e.to_string()))?;
        let content = format!(
            "# Project `{}`\n\n```json\n{pretty}\n```\n\n{} files tracked, updated {}\n",
            path_key(&snapshot.project_path),
            snapshot.manifest.len(),
            snapshot.updated_at.to_rfc3339(),
        );
        Ok(RenderedDocument {
            path: self.document_path("index"),
            content,
        })
    }
}
