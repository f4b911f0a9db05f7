//! mem0 REST server client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::MemoryConfig;
use crate::error::{Error, Result};
use crate::providers::ChatMessage;

use super::{MemoryHit, MemoryProvider};

/// Client for a self-hosted mem0 server
pub struct Mem0Client {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct AddRequest<'a> {
    messages: &'a [ChatMessage],
    user_id: &'a str,
    metadata: &'a Map<String, Value>,
    /// Store messages verbatim instead of LLM-distilled facts
    infer: bool,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped { results: Vec<Mem0Memory> },
    Bare(Vec<Mem0Memory>),
}

#[derive(Deserialize)]
struct Mem0Memory {
    id: String,
    #[serde(default)]
    memory: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AddResponse {
    Wrapped { results: Vec<AddedMemory> },
    Bare(Vec<AddedMemory>),
    Other(Value),
}

#[derive(Deserialize)]
struct AddedMemory {
    id: String,
}

impl Mem0Client {
    /// Create a client from memory configuration
    pub fn new(config: &MemoryConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: config.mem0_url.trim_end_matches('/').to_string(),
            api_key: config.mem0_api_key.clone(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Token {}", key)),
            None => request,
        }
    }
}

#[async_trait]
impl MemoryProvider for Mem0Client {
    async fn add(
        &self,
        messages: Vec<ChatMessage>,
        user_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<String> {
        let body = AddRequest {
            messages: &messages,
            user_id,
            metadata: &metadata,
            infer: false,
        };

        let response = self.post("/memories").json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Memory(format!("mem0 add failed: HTTP {} - {}", status, text)));
        }

        let id = match response.json::<AddResponse>().await? {
            AddResponse::Wrapped { results } | AddResponse::Bare(results) => {
                results.into_iter().next().map(|m| m.id).unwrap_or_default()
            }
            AddResponse::Other(_) => String::new(),
        };
        Ok(id)
    }

    async fn search(&self, query: &str, limit: usize, stage: Option<&str>) -> Result<Vec<MemoryHit>> {
        let body = SearchRequest {
            query,
            limit,
            filters: stage.map(|s| serde_json::json!({ "stage": s })),
        };

        let response = self.post("/search").json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Memory(format!("mem0 search failed: HTTP {} - {}", status, text)));
        }

        let memories = match response.json::<SearchResponse>().await? {
            SearchResponse::Wrapped { results } | SearchResponse::Bare(results) => results,
        };

        Ok(memories
            .into_iter()
            .map(|m| MemoryHit {
                id: m.id,
                user_id: m.user_id.unwrap_or_default(),
                score: m.score.unwrap_or(0.0),
                snippet: m.memory,
                messages: Vec::new(),
                metadata: m.metadata.unwrap_or_default(),
            })
            // The server may ignore filters, so check the stage here too
            .filter(|hit| stage.map_or(true, |s| hit.stage() == Some(s)))
            .take(limit)
            .collect())
    }

    fn name(&self) -> &str {
        "mem0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_shapes() {
        let wrapped: SearchResponse = serde_json::from_str(
            r#"{"results":[{"id":"m1","memory":"text","score":0.7,"user_id":"abc","metadata":{"stage":"requirements"}}]}"#,
        )
        .unwrap();
        let bare: SearchResponse = serde_json::from_str(r#"[{"id":"m2","memory":"other"}]"#).unwrap();

        match wrapped {
            SearchResponse::Wrapped { results } => assert_eq!(results[0].score, Some(0.7)),
            SearchResponse::Bare(_) => panic!("expected wrapped"),
        }
        match bare {
            SearchResponse::Bare(results) => assert_eq!(results[0].id, "m2"),
            SearchResponse::Wrapped { .. } => panic!("expected bare"),
        }
    }

    #[test]
    fn test_add_request_is_verbatim() {
        let messages = vec![ChatMessage::user("hello")];
        let metadata = Map::new();
        let body = AddRequest {
            messages: &messages,
            user_id: "u",
            metadata: &metadata,
            infer: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["infer"], false);
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
