//! Ollama chat client
//!
//! Talks to `/api/chat` with streaming disabled.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::llm::{is_retryable_status, retry_with_backoff, Attempt, ChatMessage, ChatRequest, LlmProvider};

/// Ollama API client with automatic retry
pub struct OllamaChatClient {
    client: Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

impl OllamaChatClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaChatClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatBody {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            format: request.json_mode.then_some("json"),
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        tracing::debug!("Ollama chat with model: {}", self.model);

        let (client, url, body) = (&self.client, &url, &body);
        retry_with_backoff(self.max_retries, || async move {
            let response = match client.post(url).json(body).send().await {
                Ok(response) => response,
                Err(e) => return Attempt::Retry(Error::llm(format!("Ollama request failed: {}", e))),
            };

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let err = Error::llm(format!("Ollama returned HTTP {}: {}", status, text));
                return if is_retryable_status(status) {
                    Attempt::Retry(err)
                } else {
                    Attempt::Fail(err)
                };
            }

            match response.json::<ChatResponse>().await {
                Ok(parsed) => Attempt::Done(parsed.message.content),
                Err(e) => Attempt::Fail(Error::llm(format!("Failed to parse Ollama response: {}", e))),
            }
        })
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_body_shape() {
        let request = ChatRequest::new("system", "user").json().with_max_tokens(64);
        let body = ChatBody {
            model: "llama3.1:8b",
            messages: &request.messages,
            stream: false,
            format: request.json_mode.then_some("json"),
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["stream"], false);
        assert_eq!(value["format"], "json");
        assert_eq!(value["options"]["num_predict"], 64);
        assert_eq!(value["messages"][1]["content"], "user");
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..Default::default()
        };
        let client = OllamaChatClient::new(&config).unwrap();
        assert!(!client.health_check().await.unwrap());
    }
}
