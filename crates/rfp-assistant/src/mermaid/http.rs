//! Renderer backed by a Kroki-compatible HTTP service

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::MermaidConfig;
use crate::error::{Error, Result};

use super::{strip_mermaid_fences, DiagramFormat, MermaidRenderer};

/// `POST {base_url}/mermaid/png` with the diagram source as the body
pub struct HttpRenderer {
    client: Client,
    base_url: String,
}

impl HttpRenderer {
    pub fn new(config: &MermaidConfig) -> Result<Self> {
        let base_url = config.service_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("mermaid.service_url is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, format: DiagramFormat) -> String {
        format!("{}/mermaid/{}", self.base_url, format.extension())
    }
}

#[async_trait]
impl MermaidRenderer for HttpRenderer {
    async fn render_png(&self, code: &str) -> Result<Vec<u8>> {
        self.render(code, DiagramFormat::Png).await
    }

    async fn render(&self, code: &str, format: DiagramFormat) -> Result<Vec<u8>> {
        let code = strip_mermaid_fences(code)?;

        let response = self
            .client
            .post(self.endpoint(format))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(code)
            .send()
            .await
            .map_err(|e| Error::Render(format!("diagram service unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Render(format!(
                "diagram service returned {}: {}",
                status,
                crate::text::truncate_chars(body.trim(), 200)
            )));
        }

        let image = response.bytes().await?.to_vec();
        if image.is_empty() {
            return Err(Error::Render("diagram service returned an empty image".to_string()));
        }
        tracing::debug!(
            "Rendered Mermaid diagram to {} via {} ({} bytes)",
            format,
            self.base_url,
            image.len()
        );
        Ok(image)
    }

    fn name(&self) -> &str {
        "kroki"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_slash() {
        let config = MermaidConfig {
            service_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        let renderer = HttpRenderer::new(&config).unwrap();
        assert_eq!(
            renderer.endpoint(DiagramFormat::Png),
            "http://localhost:8000/mermaid/png"
        );
        assert_eq!(
            renderer.endpoint(DiagramFormat::Svg),
            "http://localhost:8000/mermaid/svg"
        );
    }

    #[test]
    fn test_empty_url_rejected() {
        let config = MermaidConfig {
            service_url: " ".to_string(),
            ..Default::default()
        };
        assert!(HttpRenderer::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_render_error() {
        let config = MermaidConfig {
            service_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let renderer = HttpRenderer::new(&config).unwrap();
        assert!(matches!(
            renderer.render_png("graph TD; A-->B").await,
            Err(Error::Render(_))
        ));
    }
}
