//! Configuration for the RFP assistant

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RfpConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// LLM backend configuration
    pub llm: LlmConfig,
    /// Agent tuning
    pub agents: AgentConfig,
    /// Semantic memory configuration
    pub memory: MemoryConfig,
    /// Blob storage configuration
    pub storage: StorageConfig,
    /// Mermaid diagram rendering
    pub mermaid: MermaidConfig,
    /// Text extraction configuration
    pub extraction: ExtractionConfig,
    /// Company details used on the front page and in prompts
    pub company: CompanyConfig,
    /// DOCX layout configuration
    pub document: DocumentConfig,
}

impl RfpConfig {
    /// Load configuration: defaults, then the TOML file (if any), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read config {}: {}", path.display(), e))
                })?;
                toml::from_str(&raw).map_err(|e| {
                    Error::Config(format!("Invalid config {}: {}", path.display(), e))
                })?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from well-known environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("AZURE_OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(endpoint) = non_empty("AZURE_OPENAI_ENDPOINT") {
            self.llm.base_url = endpoint;
            self.llm.backend = LlmBackend::AzureOpenAi;
        }
        if let Some(deployment) = non_empty("AZURE_OPENAI_DEPLOYMENT_NAME") {
            self.llm.model = deployment;
        }
        if let Some(version) = non_empty("AZURE_OPENAI_API_VERSION") {
            self.llm.api_version = version;
        }
        if let Some(conn) = non_empty("AZURE_STORAGE_CONNECTION_STRING") {
            self.storage.backend = StorageBackend::Azure;
            self.storage.connection_string = Some(conn);
        }
        if let Some(path) = non_empty("MERMAID_CLI_PATH") {
            self.mermaid.cli_path = Some(path);
        }
        if let Some(flag) = non_empty("MERMAID_CLI_NO_SANDBOX") {
            self.mermaid.no_sandbox = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(host) = non_empty("RFP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("RFP_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("server.port must be non-zero".to_string()));
        }
        if self.server.max_upload_size == 0 {
            return Err(Error::Config("server.max_upload_size must be non-zero".to_string()));
        }
        if self.llm.backend == LlmBackend::AzureOpenAi {
            if self.llm.base_url.trim().is_empty() {
                return Err(Error::Config(
                    "Azure OpenAI backend requires llm.base_url (AZURE_OPENAI_ENDPOINT)".to_string(),
                ));
            }
            if self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                return Err(Error::Config(
                    "Azure OpenAI backend requires llm.api_key (AZURE_OPENAI_API_KEY)".to_string(),
                ));
            }
        }
        if self.storage.backend == StorageBackend::Azure && self.storage.connection_string.is_none() {
            return Err(Error::Config(
                "Azure storage requires a connection string (AZURE_STORAGE_CONNECTION_STRING)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// LLM backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Azure OpenAI chat completions
    #[serde(rename = "azure")]
    AzureOpenAi,
    /// Local Ollama server
    #[default]
    Ollama,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend provider
    pub backend: LlmBackend,
    /// Azure resource endpoint or Ollama base URL
    pub base_url: String,
    /// Deployment (Azure) or model (Ollama) name
    pub model: String,
    /// API key (Azure only)
    pub api_key: Option<String>,
    /// Azure OpenAI API version
    pub api_version: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            api_key: None,
            api_version: "2024-08-01-preview".to_string(),
            timeout_secs: 180,
            max_retries: 2,
        }
    }
}

/// Agent tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Run structure detection after requirements classification
    pub detect_structure: bool,
    /// Maximum clarifying questions generated per build query
    pub max_questions: usize,
    /// Model context window used to bound response max_tokens
    pub context_window_tokens: i64,
    /// Memory snippets retrieved per search
    pub memory_results: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            detect_structure: true,
            max_questions: 8,
            context_window_tokens: 32_769,
            memory_results: 3,
        }
    }
}

/// Memory backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    /// No memory; reads return nothing and writes are skipped
    Disabled,
    /// Keyword-indexed JSON file on local disk
    #[default]
    Local,
    /// mem0 REST server
    Mem0,
}

/// Semantic memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Backend provider
    pub backend: MemoryBackend,
    /// Local store file
    pub local_path: PathBuf,
    /// mem0 server base URL
    pub mem0_url: String,
    /// mem0 API key (optional)
    pub mem0_api_key: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::Local,
            local_path: data_dir().join("memory.json"),
            mem0_url: "http://localhost:8888".to_string(),
            mem0_api_key: None,
        }
    }
}

/// Blob storage backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Generated documents are only returned, never stored
    #[default]
    Disabled,
    /// Directory on local disk
    Local,
    /// Azure Blob Storage
    Azure,
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend provider
    pub backend: StorageBackend,
    /// Azure storage connection string
    pub connection_string: Option<String>,
    /// Container name
    pub container: String,
    /// Root directory for the local backend
    pub local_root: PathBuf,
    /// Prefix for generated DOCX blobs
    pub docx_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Disabled,
            connection_string: None,
            container: "rfp-documents".to_string(),
            local_root: data_dir().join("blobs"),
            docx_prefix: "docx/".to_string(),
        }
    }
}

/// Mermaid renderer selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MermaidBackend {
    /// Diagrams are kept as code blocks
    Disabled,
    /// mermaid-cli (`mmdc`)
    #[default]
    Cli,
    /// Kroki-compatible HTTP service
    Http,
}

/// Mermaid rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MermaidConfig {
    /// Renderer backend
    pub backend: MermaidBackend,
    /// Explicit mmdc path
    pub cli_path: Option<String>,
    /// Force Puppeteer `--no-sandbox`
    pub no_sandbox: bool,
    /// Render timeout in seconds
    pub timeout_secs: u64,
    /// Rendering service base URL
    pub service_url: String,
}

impl Default for MermaidConfig {
    fn default() -> Self {
        Self {
            backend: MermaidBackend::Cli,
            cli_path: None,
            no_sandbox: false,
            timeout_secs: 30,
            service_url: "https://kroki.io".to_string(),
        }
    }
}

/// Text extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Timeout for native PDF extraction in seconds
    pub pdf_timeout_secs: u64,
    /// Fall back to pdftoppm + tesseract for image-only PDFs
    pub enable_ocr: bool,
    /// Tesseract language codes (e.g. "eng+deu")
    pub ocr_languages: String,
    /// Convert legacy .doc files with LibreOffice
    pub use_libreoffice: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pdf_timeout_secs: 60,
            enable_ocr: true,
            ocr_languages: "eng".to_string(),
            use_libreoffice: true,
        }
    }
}

/// Company details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyConfig {
    /// Company name
    pub name: String,
    /// Website shown on the front page
    pub website: String,
    /// Company overview paragraphs
    pub overview: Vec<String>,
    /// Knowledge base JSON file (capabilities, case studies, accelerators)
    pub knowledge_base_path: Option<PathBuf>,
}

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            name: "fusionAIx".to_string(),
            website: "www.fusionaix.com".to_string(),
            overview: vec![
                "At fusionAIx, we believe that the future of digital transformation lies in the \
                 seamless blend of low-code platforms and artificial intelligence. We partner with \
                 enterprises to reimagine processes, accelerate application delivery, and unlock \
                 new levels of efficiency."
                    .to_string(),
                "Our proven capabilities span Pega Constellation, Microsoft Power Platform, and \
                 ServiceNow. Through these platforms, we provide Low Code/No Code development, \
                 Digital Process Transformation, and AI & Data solutions."
                    .to_string(),
            ],
            knowledge_base_path: None,
        }
    }
}

/// DOCX layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// PNG logo for the front page
    pub logo_path: Option<PathBuf>,
    /// Accent colour (hex, no leading #)
    pub accent_color: String,
    /// Body font
    pub font: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            logo_path: None,
            accent_color: "1A5490".to_string(),
            font: "Calibri".to_string(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rfp-assistant")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides_switch_backends() {
        let env: HashMap<&str, &str> = [
            ("AZURE_OPENAI_API_KEY", "secret"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
            ("AZURE_OPENAI_DEPLOYMENT_NAME", "gpt-5-chat"),
            ("AZURE_STORAGE_CONNECTION_STRING", "AccountName=a;AccountKey=a2V5"),
            ("MERMAID_CLI_NO_SANDBOX", "TRUE"),
            ("RFP_PORT", "9001"),
        ]
        .into_iter()
        .collect();

        let mut config = RfpConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.backend, LlmBackend::AzureOpenAi);
        assert_eq!(config.llm.model, "gpt-5-chat");
        assert_eq!(config.llm.api_key.as_deref(), Some("secret"));
        assert_eq!(config.storage.backend, StorageBackend::Azure);
        assert!(config.mermaid.no_sandbox);
        assert_eq!(config.server.port, 9001);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_azure_without_key() {
        let mut config = RfpConfig::default();
        config.llm.backend = LlmBackend::AzureOpenAi;
        config.llm.base_url = "https://example.openai.azure.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RfpConfig = toml::from_str(
            r#"
            [server]
            port = 9100

            [memory]
            backend = "disabled"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.memory.backend, MemoryBackend::Disabled);
        assert_eq!(config.agents.memory_results, 3);
    }
}
