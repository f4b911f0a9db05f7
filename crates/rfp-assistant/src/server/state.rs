//! Application state for the RFP server

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::RfpConfig;
use crate::docx::DocxGenerator;
use crate::error::{Error, Result};
use crate::ingestion::TextExtractor;
use crate::knowledge::KnowledgeBase;
use crate::memory::{create_memory_provider, MemoryClient};
use crate::mermaid::create_renderer;
use crate::pipeline::RfpPipeline;
use crate::providers::{create_llm_provider, LlmProvider};
use crate::storage::{create_blob_store, BlobStore};
use crate::types::{Answer, ConversationContext, Question};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RfpConfig,
    /// Agents, memory and knowledge base
    pipeline: RfpPipeline,
    /// PDF/DOCX/DOC text extraction
    extractor: TextExtractor,
    /// DOCX export
    docx: DocxGenerator,
    /// Where exported documents are kept, when configured
    blob_store: Option<Arc<dyn BlobStore>>,
    /// Clarifying-question sessions
    sessions: DashMap<String, ConversationContext>,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create new application state from configuration
    pub async fn new(config: RfpConfig) -> Result<Self> {
        tracing::info!("Initializing RFP application state...");

        let llm = create_llm_provider(&config.llm)?;
        let memory = MemoryClient::new(create_memory_provider(&config.memory)?);
        let extractor = TextExtractor::new(&config.extraction);
        let blob_store = create_blob_store(&config.storage).await?;

        let state = Self::from_parts(config, llm, memory, extractor, blob_store);
        tracing::info!("RFP application state initialized");
        Ok(state)
    }

    /// Assemble state from already-built collaborators
    pub fn from_parts(
        config: RfpConfig,
        llm: Arc<dyn LlmProvider>,
        memory: MemoryClient,
        extractor: TextExtractor,
        blob_store: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        let mut pipeline = RfpPipeline::new(
            llm,
            memory,
            config.agents.clone(),
            config.company.name.clone(),
        );
        if let Some(knowledge_base) = load_knowledge_base(&config) {
            pipeline = pipeline.with_knowledge_base(Arc::new(knowledge_base));
        }

        let docx = DocxGenerator::new(
            config.company.clone(),
            config.document.clone(),
            create_renderer(&config.mermaid),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pipeline,
                extractor,
                docx,
                blob_store,
                sessions: DashMap::new(),
                ready: RwLock::new(true),
            }),
        }
    }

    pub fn config(&self) -> &RfpConfig {
        &self.inner.config
    }

    pub fn pipeline(&self) -> &RfpPipeline {
        &self.inner.pipeline
    }

    pub fn extractor(&self) -> &TextExtractor {
        &self.inner.extractor
    }

    pub fn docx(&self) -> &DocxGenerator {
        &self.inner.docx
    }

    pub fn blob_store(&self) -> Option<&Arc<dyn BlobStore>> {
        self.inner.blob_store.as_ref()
    }

    /// Check if server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }

    /// Start a chat session, optionally seeded with questions
    pub fn create_session(&self, questions: Vec<Question>) -> ConversationContext {
        let mut session = ConversationContext::new(Uuid::new_v4().to_string());
        session.questions = questions;
        self.inner
            .sessions
            .insert(session.session_id.clone(), session.clone());
        tracing::info!(
            "Created chat session {} ({} questions)",
            session.session_id,
            session.questions.len()
        );
        session
    }

    pub fn get_session(&self, session_id: &str) -> Result<ConversationContext> {
        self.inner
            .sessions
            .get(session_id)
            .map(|s| s.clone())
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))
    }

    /// Record answers against a session and return its updated state
    pub fn record_answers(&self, session_id: &str, answers: Vec<Answer>) -> Result<ConversationContext> {
        let mut session = self
            .inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
        session.record_answers(answers);
        Ok(session.clone())
    }
}

/// Knowledge base problems are logged; responses are drafted without it
fn load_knowledge_base(config: &RfpConfig) -> Option<KnowledgeBase> {
    let path = config.company.knowledge_base_path.as_deref()?;
    match KnowledgeBase::load(path) {
        Ok(kb) if kb.is_empty() => {
            tracing::warn!("Knowledge base {} is empty", path.display());
            None
        }
        Ok(kb) => Some(kb),
        Err(e) => {
            tracing::warn!("Failed to load knowledge base {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MermaidBackend;
    use crate::ingestion::ExternalTools;
    use crate::providers::ScriptedLlm;

    fn state() -> AppState {
        let mut config = RfpConfig::default();
        config.mermaid.backend = MermaidBackend::Disabled;
        let extractor = TextExtractor::with_tools(&config.extraction, ExternalTools::none());
        AppState::from_parts(
            config,
            Arc::new(ScriptedLlm::new()),
            MemoryClient::disabled(),
            extractor,
            None,
        )
    }

    #[test]
    fn test_ready_flag() {
        let state = state();
        assert!(state.is_ready());
        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[test]
    fn test_session_lifecycle() {
        let state = state();
        let question = Question {
            question_id: "Q1".to_string(),
            question_text: "Which identity provider is in use?".to_string(),
            context: String::new(),
            category: "technical".to_string(),
            priority: "high".to_string(),
            requirement_id: Some("SOL-001".to_string()),
            answered: false,
        };
        let session = state.create_session(vec![question]);

        let updated = state
            .record_answers(
                &session.session_id,
                vec![Answer {
                    question_id: "Q1".to_string(),
                    answer_text: "Azure AD".to_string(),
                }],
            )
            .unwrap();
        assert!(updated.questions[0].answered);
        assert_eq!(
            state.get_session(&session.session_id).unwrap().get_qa_context(),
            "Q: Which identity provider is in use?\nA: Azure AD"
        );
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let state = state();
        assert!(matches!(state.get_session("missing"), Err(Error::NotFound(_))));
        assert!(matches!(state.record_answers("missing", vec![]), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_missing_knowledge_base_is_skipped() {
        let mut config = RfpConfig::default();
        config.company.knowledge_base_path = Some("/nonexistent/kb.json".into());
        assert!(load_knowledge_base(&config).is_none());
    }
}
