//! Azure OpenAI chat-completions client with retry logic

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::llm::{is_retryable_status, retry_with_backoff, Attempt, ChatMessage, ChatRequest, LlmProvider};

/// Azure OpenAI deployment client
pub struct AzureOpenAiClient {
    client: Client,
    endpoint: String,
    deployment: String,
    api_key: String,
    api_version: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl AzureOpenAiClient {
    /// Create a client from configuration
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("Azure OpenAI API key is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.base_url.trim_end_matches('/').to_string(),
            deployment: config.model.clone(),
            api_key,
            api_version: config.api_version.clone(),
            max_retries: config.max_retries,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let url = self.completions_url();
        let body = CompletionRequest {
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        tracing::debug!(
            "Azure OpenAI chat: deployment={}, max_tokens={:?}",
            self.deployment,
            request.max_tokens
        );

        let (client, url, body, api_key) = (&self.client, &url, &body, &self.api_key);
        retry_with_backoff(self.max_retries, || async move {
            let response = match client
                .post(url)
                .header("api-key", api_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => return Attempt::Retry(Error::llm(format!("Azure OpenAI request failed: {}", e))),
            };

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let err = Error::llm(format!("Azure OpenAI returned HTTP {}: {}", status, text));
                return if is_retryable_status(status) {
                    Attempt::Retry(err)
                } else {
                    Attempt::Fail(err)
                };
            }

            let parsed: CompletionResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(e) => {
                    return Attempt::Fail(Error::llm(format!(
                        "Failed to parse Azure OpenAI response: {}",
                        e
                    )))
                }
            };

            match parsed.choices.into_iter().next() {
                Some(choice) => {
                    if choice.finish_reason.as_deref() == Some("length") {
                        tracing::warn!("Azure OpenAI output hit the max_tokens limit");
                    }
                    Attempt::Done(choice.message.content.unwrap_or_default())
                }
                None => Attempt::Fail(Error::llm("Azure OpenAI returned no choices")),
            }
        })
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        // A one-token completion is the cheapest call that exercises the deployment
        let ping = ChatRequest::new("Reply with OK.", "ping").with_max_tokens(1);
        Ok(self.chat(&ping).await.is_ok())
    }

    fn name(&self) -> &str {
        "azure-openai"
    }

    fn model(&self) -> &str {
        &self.deployment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            base_url: "https://example.openai.azure.com/".to_string(),
            model: "gpt-5-chat".to_string(),
            api_key: Some("key".to_string()),
            api_version: "2024-08-01-preview".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_completions_url() {
        let client = AzureOpenAiClient::new(&config()).unwrap();
        assert_eq!(
            client.completions_url(),
            "https://example.openai.azure.com/openai/deployments/gpt-5-chat/chat/completions?api-version=2024-08-01-preview"
        );
        assert_eq!(client.model(), "gpt-5-chat");
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let mut cfg = config();
        cfg.api_key = None;
        assert!(matches!(AzureOpenAiClient::new(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn test_request_body_json_mode() {
        let request = ChatRequest::new("s", "u").json().with_max_tokens(50);
        let body = CompletionRequest {
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["max_tokens"], 50);
    }
}
