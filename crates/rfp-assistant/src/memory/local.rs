//! Local memory store: JSON file persistence with an in-memory keyword index

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::ChatMessage;
use crate::text::{extract_keywords, truncate_chars};

use super::{MemoryHit, MemoryProvider};

const SNIPPET_CHARS: usize = 1000;

/// A stored memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    fn stage(&self) -> Option<&str> {
        self.metadata.get("stage").and_then(Value::as_str)
    }

    fn indexed_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Keyword-indexed memory persisted to a single JSON file
pub struct LocalMemoryStore {
    storage_path: Option<PathBuf>,
    records: RwLock<HashMap<Uuid, MemoryRecord>>,
    keyword_index: RwLock<HashMap<String, Vec<Uuid>>>,
    /// Serializes snapshot-and-write so an older snapshot never lands last
    save_lock: Mutex<()>,
}

impl LocalMemoryStore {
    /// Open (or create) a store backed by `storage_path`
    pub fn open(storage_path: PathBuf) -> Self {
        let store = Self {
            storage_path: Some(storage_path),
            records: RwLock::new(HashMap::new()),
            keyword_index: RwLock::new(HashMap::new()),
            save_lock: Mutex::new(()),
        };

        if let Err(e) = store.load() {
            tracing::warn!("Could not load memory store: {}", e);
        }

        store
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            storage_path: None,
            records: RwLock::new(HashMap::new()),
            keyword_index: RwLock::new(HashMap::new()),
            save_lock: Mutex::new(()),
        }
    }

    /// Number of stored memories
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index(&self, record: &MemoryRecord) {
        let mut index = self.keyword_index.write();
        for keyword in extract_keywords(&record.indexed_text()) {
            index.entry(keyword).or_default().push(record.id);
        }
    }

    /// Write every record to a temp file, then rename it over the store file
    async fn save(&self) -> Result<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        let _guard = self.save_lock.lock().await;
        let data = {
            let records = self.records.read();
            let mut list: Vec<&MemoryRecord> = records.values().collect();
            list.sort_by_key(|r| r.created_at);
            serde_json::to_string_pretty(&list)?
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, data).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }

    fn load(&self) -> Result<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let data = fs::read_to_string(path)?;
        let loaded: Vec<MemoryRecord> = serde_json::from_str(&data)
            .map_err(|e| Error::Memory(format!("Corrupt memory file {}: {}", path.display(), e)))?;

        for record in &loaded {
            self.index(record);
        }
        let count = loaded.len();
        *self.records.write() = loaded.into_iter().map(|r| (r.id, r)).collect();

        tracing::info!("Loaded {} memories from {}", count, path.display());
        Ok(())
    }
}

#[async_trait]
impl MemoryProvider for LocalMemoryStore {
    async fn add(
        &self,
        messages: Vec<ChatMessage>,
        user_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<String> {
        let record = MemoryRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            messages,
            metadata,
            created_at: Utc::now(),
        };
        let id = record.id;

        self.index(&record);
        self.records.write().insert(id, record);
        self.save().await?;

        Ok(id.to_string())
    }

    async fn search(&self, query: &str, limit: usize, stage: Option<&str>) -> Result<Vec<MemoryHit>> {
        let keywords = extract_keywords(query);
        if keywords.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut matches: HashMap<Uuid, usize> = HashMap::new();
        {
            let index = self.keyword_index.read();
            for keyword in &keywords {
                if let Some(ids) = index.get(keyword) {
                    for id in ids {
                        *matches.entry(*id).or_default() += 1;
                    }
                }
            }
        }

        let records = self.records.read();
        let mut hits: Vec<(f64, &MemoryRecord)> = matches
            .into_iter()
            .filter_map(|(id, count)| records.get(&id).map(|r| (count, r)))
            .filter(|(_, r)| stage.map_or(true, |s| r.stage() == Some(s)))
            .map(|(count, r)| (count as f64 / keywords.len() as f64, r))
            .collect();

        // Newer memories win ties
        hits.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.created_at.cmp(&a.1.created_at))
        });

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(score, record)| MemoryHit {
                id: record.id.to_string(),
                user_id: record.user_id.clone(),
                score,
                snippet: truncate_chars(&record.indexed_text(), SNIPPET_CHARS).to_string(),
                messages: record.messages.clone(),
                metadata: record.metadata.clone(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stage(stage: &str) -> Map<String, Value> {
        json!({"stage": stage, "source": "rfp-assistant"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_search_scores_by_keyword_fraction() {
        let store = LocalMemoryStore::in_memory();
        store
            .add(vec![ChatMessage::user("CRM integration with Salesforce")], "u1", stage("requirements"))
            .await
            .unwrap();
        store
            .add(vec![ChatMessage::user("Data migration plan")], "u2", stage("requirements"))
            .await
            .unwrap();

        let hits = store.search("salesforce crm migration", 5, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].user_id, "u1");
        assert!((hits[0].score - 2.0 / 3.0).abs() < 1e-9);
        assert!((hits[1].score - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_search_filters_stage() {
        let store = LocalMemoryStore::in_memory();
        store
            .add(vec![ChatMessage::user("pega constellation")], "u1", stage("requirements"))
            .await
            .unwrap();
        store
            .add(vec![ChatMessage::user("pega corrections")], "u2", stage("edit_memory"))
            .await
            .unwrap();

        let hits = store.search("pega", 5, Some("edit_memory")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user_id, "u2");
        assert!(store.search("", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory").join("store.json");

        {
            let store = LocalMemoryStore::open(path.clone());
            store
                .add(vec![ChatMessage::user("ServiceNow workflow")], "u1", stage("preprocess"))
                .await
                .unwrap();
        }

        let reopened = LocalMemoryStore::open(path.clone());
        assert_eq!(reopened.len(), 1);
        assert!(!path.with_extension("json.tmp").exists());
        let hits = reopened.search("servicenow", 3, Some("preprocess")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].snippet.contains("ServiceNow"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_all_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = std::sync::Arc::new(LocalMemoryStore::open(path.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .add(
                            vec![ChatMessage::user(format!("requirement snapshot {}", i))],
                            &format!("u{}", i),
                            stage("requirements"),
                        )
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.len(), 16);
        let reopened = LocalMemoryStore::open(path);
        assert_eq!(reopened.len(), 16);
    }
}
