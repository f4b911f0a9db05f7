//! Semantic memory of prior pipeline runs and user edits
//!
//! Every write and read through [`MemoryClient`] is best-effort: failures are
//! logged and reported as `false` or an empty result, never as errors.

pub mod local;
pub mod mem0;
pub mod snapshot;

pub use local::LocalMemoryStore;
pub use mem0::Mem0Client;
pub use snapshot::{sentence_changes, split_sentences, SentenceChange};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::{MemoryBackend, MemoryConfig};
use crate::error::Result;
use crate::providers::ChatMessage;
use crate::types::{BuildQuery, ExtractionResult, RequirementsResult, ScopeResult};

/// Memory stage labels stored in `metadata.stage`
pub mod stage {
    pub const PREPROCESS: &str = "preprocess";
    pub const REQUIREMENTS: &str = "requirements";
    pub const BUILD_QUERY: &str = "build_query";
    pub const EDIT_MEMORY: &str = "edit_memory";
}

const SOURCE: &str = "rfp-assistant";

/// A search result
#[derive(Debug, Clone, Serialize)]
pub struct MemoryHit {
    pub id: String,
    pub user_id: String,
    pub score: f64,
    /// Text that matched
    pub snippet: String,
    /// Original messages, when the backend keeps them
    pub messages: Vec<ChatMessage>,
    pub metadata: Map<String, Value>,
}

impl MemoryHit {
    pub fn stage(&self) -> Option<&str> {
        self.metadata.get("stage").and_then(Value::as_str)
    }

    /// Sentence corrections carried by an edit memory
    pub fn sentence_changes(&self) -> Option<Vec<SentenceChange>> {
        let payload = self
            .messages
            .get(1)
            .map(|m| m.content.as_str())
            .unwrap_or(self.snippet.as_str());
        let value: Value = serde_json::from_str(payload).ok()?;
        serde_json::from_value(value.get("sentence_changes")?.clone()).ok()
    }
}

/// Backend for storing and searching memories
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Store a conversation snippet; returns the memory id
    async fn add(
        &self,
        messages: Vec<ChatMessage>,
        user_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<String>;

    /// Best matches for `query`, optionally restricted to a stage
    async fn search(&self, query: &str, limit: usize, stage: Option<&str>) -> Result<Vec<MemoryHit>>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Build the configured memory backend, `None` when disabled
pub fn create_memory_provider(config: &MemoryConfig) -> Result<Option<Arc<dyn MemoryProvider>>> {
    let provider: Arc<dyn MemoryProvider> = match config.backend {
        MemoryBackend::Disabled => {
            tracing::info!("Memory disabled");
            return Ok(None);
        }
        MemoryBackend::Local => Arc::new(LocalMemoryStore::open(config.local_path.clone())),
        MemoryBackend::Mem0 => Arc::new(Mem0Client::new(config)?),
    };
    tracing::info!("Memory provider: {}", provider.name());
    Ok(Some(provider))
}

/// SHA-256 hex of the source text, used as the memory user id
pub fn user_id_for(source_text: &str) -> String {
    hex::encode(Sha256::digest(source_text.as_bytes()))
}

/// Best-effort facade over an optional memory provider
#[derive(Clone, Default)]
pub struct MemoryClient {
    provider: Option<Arc<dyn MemoryProvider>>,
}

impl MemoryClient {
    pub fn new(provider: Option<Arc<dyn MemoryProvider>>) -> Self {
        Self { provider }
    }

    /// Client that stores nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Store extraction + scope results keyed by the raw RFP text
    pub async fn store_preprocess_result(
        &self,
        source_text: &str,
        extraction: &ExtractionResult,
        scope: &ScopeResult,
    ) -> bool {
        let mut metadata = metadata(stage::PREPROCESS);
        metadata.insert("language".to_string(), json!(extraction.language));
        self.store(
            source_text,
            snapshot::preprocess_messages(extraction, scope),
            metadata,
        )
        .await
    }

    /// Store a requirements snapshot keyed by the essential text
    pub async fn store_requirements_result(
        &self,
        source_text: &str,
        requirements: &RequirementsResult,
    ) -> bool {
        self.store(
            source_text,
            snapshot::requirements_messages(requirements),
            metadata(stage::REQUIREMENTS),
        )
        .await
    }

    /// Store a build-query snapshot keyed by the essential text
    pub async fn store_build_query_result(&self, source_text: &str, query: &BuildQuery) -> bool {
        self.store(
            source_text,
            snapshot::build_query_messages(query),
            metadata(stage::BUILD_QUERY),
        )
        .await
    }

    /// Store the sentence-level diff between a draft and the user's edit.
    /// Returns the number of changed sentences, or `None` when nothing was stored.
    pub async fn store_edit_memory(
        &self,
        original: &str,
        edited: &str,
        requirement: Option<&str>,
    ) -> Option<usize> {
        let changes = sentence_changes(original, edited);
        if changes.is_empty() {
            tracing::debug!("Edit contains no sentence changes; skipping memory storage");
            return None;
        }

        let key = requirement.filter(|r| !r.trim().is_empty()).unwrap_or(original);
        let mut metadata = metadata(stage::EDIT_MEMORY);
        metadata.insert("changes".to_string(), json!(changes.len()));

        let stored = self
            .store(
                key,
                snapshot::edit_messages(original, edited, requirement, &changes),
                metadata,
            )
            .await;
        stored.then_some(changes.len())
    }

    /// Search memories; errors and a disabled backend give an empty list
    pub async fn search_memories(&self, query: &str, limit: usize, stage: Option<&str>) -> Vec<MemoryHit> {
        let Some(provider) = &self.provider else {
            return Vec::new();
        };
        if query.trim().is_empty() {
            return Vec::new();
        }

        match provider.search(query, limit, stage).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("Memory search failed ({}): {}", provider.name(), e);
                Vec::new()
            }
        }
    }

    async fn store(&self, source_text: &str, messages: Vec<ChatMessage>, metadata: Map<String, Value>) -> bool {
        if source_text.is_empty() {
            tracing::debug!("No source text supplied; skipping memory storage");
            return false;
        }
        let Some(provider) = &self.provider else {
            return false;
        };

        let stage = metadata
            .get("stage")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match provider.add(messages, &user_id_for(source_text), metadata).await {
            Ok(id) => {
                tracing::debug!("Stored {} memory {}", stage, id);
                true
            }
            Err(e) => {
                tracing::warn!("Memory write failed for stage {}: {}", stage, e);
                false
            }
        }
    }
}

fn metadata(stage: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("stage".to_string(), json!(stage));
    metadata.insert("source".to_string(), json!(SOURCE));
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct FailingMemory;

    #[async_trait]
    impl MemoryProvider for FailingMemory {
        async fn add(&self, _: Vec<ChatMessage>, _: &str, _: Map<String, Value>) -> Result<String> {
            Err(Error::Memory("down".to_string()))
        }

        async fn search(&self, _: &str, _: usize, _: Option<&str>) -> Result<Vec<MemoryHit>> {
            Err(Error::Memory("down".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn local_client() -> (MemoryClient, Arc<LocalMemoryStore>) {
        let store = Arc::new(LocalMemoryStore::in_memory());
        (MemoryClient::new(Some(store.clone())), store)
    }

    #[test]
    fn test_user_id_is_sha256_hex() {
        assert_eq!(
            user_id_for("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_empty_source_text_skips_storage() {
        let (client, store) = local_client();
        assert!(!client.store_requirements_result("", &RequirementsResult::default()).await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_best_effort() {
        let client = MemoryClient::new(Some(Arc::new(FailingMemory)));
        assert!(!client.store_requirements_result("text", &RequirementsResult::default()).await);
        assert!(client.search_memories("query", 3, None).await.is_empty());

        let disabled = MemoryClient::disabled();
        assert!(!disabled.is_enabled());
        assert!(disabled.search_memories("query", 3, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_edit_memory_round_trip() {
        let (client, _store) = local_client();
        let stored = client
            .store_edit_memory(
                "We integrate with salesforce. Uptime is high.",
                "We integrate with Salesforce. Uptime is high.",
                Some("CRM integration"),
            )
            .await;
        assert_eq!(stored, Some(1));

        let hits = client
            .search_memories("salesforce integration", 3, Some(stage::EDIT_MEMORY))
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user_id, user_id_for("CRM integration"));
        let changes = hits[0].sentence_changes().unwrap();
        assert_eq!(changes[0].edited, "We integrate with Salesforce.");

        assert_eq!(client.store_edit_memory("Same.", "Same.", None).await, None);
    }
}
