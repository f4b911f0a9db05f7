//! Mermaid diagram rendering for DOCX export

pub mod cli;
pub mod http;

pub use cli::CliRenderer;
pub use http::HttpRenderer;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{MermaidBackend, MermaidConfig};
use crate::error::{Error, Result};

/// Image format a diagram can be rendered to.
/// DOCX export always asks for PNG since docx-rs embeds raster images only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramFormat {
    Png,
    Svg,
}

impl DiagramFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DiagramFormat::Png => "png",
            DiagramFormat::Svg => "svg",
        }
    }
}

impl fmt::Display for DiagramFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DiagramFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(DiagramFormat::Png),
            "svg" => Ok(DiagramFormat::Svg),
            other => Err(Error::BadRequest(format!(
                "Unsupported diagram format '{}': expected png or svg",
                other
            ))),
        }
    }
}

/// Renders Mermaid source to image bytes
#[async_trait]
pub trait MermaidRenderer: Send + Sync {
    async fn render_png(&self, code: &str) -> Result<Vec<u8>>;

    /// Render to the requested format. Backends without vector output refuse SVG.
    async fn render(&self, code: &str, format: DiagramFormat) -> Result<Vec<u8>> {
        match format {
            DiagramFormat::Png => self.render_png(code).await,
            DiagramFormat::Svg => Err(Error::Render(format!(
                "{} renderer does not produce SVG",
                self.name()
            ))),
        }
    }

    /// Get renderer name for logging
    fn name(&self) -> &str;
}

/// Build the configured renderer, `None` when rendering is disabled or unavailable
pub fn create_renderer(config: &MermaidConfig) -> Option<Arc<dyn MermaidRenderer>> {
    let renderer: Arc<dyn MermaidRenderer> = match config.backend {
        MermaidBackend::Disabled => {
            tracing::info!("Mermaid rendering disabled; diagrams are exported as code");
            return None;
        }
        MermaidBackend::Cli => match CliRenderer::from_config(config) {
            Some(renderer) => Arc::new(renderer),
            None => {
                tracing::warn!(
                    "mmdc (Mermaid CLI) not found; diagrams are exported as code. \
                     Install with: npm install -g @mermaid-js/mermaid-cli"
                );
                return None;
            }
        },
        MermaidBackend::Http => match HttpRenderer::new(config) {
            Ok(renderer) => Arc::new(renderer),
            Err(e) => {
                tracing::warn!("Mermaid HTTP renderer unavailable: {}", e);
                return None;
            }
        },
    };
    tracing::info!("Mermaid renderer: {}", renderer.name());
    Some(renderer)
}

/// Strip a surrounding ```` ```mermaid ```` or ```` ``` ```` fence.
/// Empty diagrams are an error.
pub fn strip_mermaid_fences(code: &str) -> Result<String> {
    let mut code = code.trim();
    if let Some(rest) = code.strip_prefix("```mermaid") {
        code = rest.trim();
    } else if let Some(rest) = code.strip_prefix("```") {
        code = rest.trim();
    }
    if let Some(rest) = code.strip_suffix("```") {
        code = rest.trim();
    }

    if code.is_empty() {
        return Err(Error::Render("Empty Mermaid diagram".to_string()));
    }
    Ok(code.to_string())
}
