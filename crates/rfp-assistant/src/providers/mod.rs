//! LLM provider abstractions
//!
//! A trait-based seam that allows switching between Azure OpenAI and a local
//! Ollama server.

pub mod azure_openai;
pub mod llm;
pub mod ollama;
pub mod scripted;

pub use azure_openai::AzureOpenAiClient;
pub use llm::{ChatMessage, ChatRequest, LlmProvider, Role};
pub use ollama::OllamaChatClient;
pub use scripted::ScriptedLlm;

use std::sync::Arc;

use crate::config::{LlmBackend, LlmConfig};
use crate::error::Result;

/// Build the configured LLM backend
pub fn create_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::AzureOpenAi => Arc::new(AzureOpenAiClient::new(config)?),
        LlmBackend::Ollama => Arc::new(OllamaChatClient::new(config)?),
    };

    tracing::info!(
        "LLM provider: {} (model: {})",
        provider.name(),
        provider.model()
    );
    Ok(provider)
}
