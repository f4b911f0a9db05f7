//! Sequential RFP pipeline
//!
//! extraction → scope → requirements → (structure detection) → build query → responses.
//! Stages are awaited in order; memory writes along the way are best-effort.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::agents::{self, ResponseMode, ResponseRequest};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::knowledge::KnowledgeBase;
use crate::memory::MemoryClient;
use crate::providers::LlmProvider;
use crate::types::{
    BuildQuery, PipelineOutput, Question, RequirementResponse, RequirementsResult,
    STRUCTURED_RESPONSE_ID,
};

const NO_REQUEST_ID: &str = "no-request-id";

/// Everything produced by a full draft run
#[derive(Debug, Clone, Serialize)]
pub struct DraftOutput {
    #[serde(flatten)]
    pub output: PipelineOutput,
    pub build_query: BuildQuery,
    pub responses: Vec<RequirementResponse>,
}

/// Runs the agents in order against one LLM provider
#[derive(Clone)]
pub struct RfpPipeline {
    llm: Arc<dyn LlmProvider>,
    memory: MemoryClient,
    knowledge_base: Option<Arc<KnowledgeBase>>,
    agents: AgentConfig,
    company: String,
}

impl RfpPipeline {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        memory: MemoryClient,
        agents: AgentConfig,
        company: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            memory,
            knowledge_base: None,
            agents,
            company: company.into(),
        }
    }

    /// Ground responses in company material
    pub fn with_knowledge_base(mut self, knowledge_base: Arc<KnowledgeBase>) -> Self {
        self.knowledge_base = Some(knowledge_base);
        self
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn memory(&self) -> &MemoryClient {
        &self.memory
    }

    pub fn agent_config(&self) -> &AgentConfig {
        &self.agents
    }

    /// Extraction, scope and requirements over raw RFP text
    pub async fn run(&self, text: &str, request_id: Option<&str>) -> Result<PipelineOutput> {
        let rid = request_id.unwrap_or(NO_REQUEST_ID);
        self.preprocess(text, rid, false).await
    }

    /// Requirements agent plus structure detection (when enabled) over essential text
    pub async fn run_requirements(&self, essential_text: &str) -> Result<RequirementsResult> {
        self.requirements_stage(essential_text, NO_REQUEST_ID, self.agents.detect_structure)
            .await
    }

    /// Clarifying questions for a build query, capped by configuration
    pub async fn generate_questions(&self, build_query: &BuildQuery) -> Result<Vec<Question>> {
        agents::generate_questions(self.llm.as_ref(), build_query, self.agents.max_questions).await
    }

    /// The whole pipeline: preprocessing, an auto-confirmed build query and responses
    pub async fn draft(
        &self,
        text: &str,
        request_id: Option<&str>,
        qa_context: Option<&str>,
    ) -> Result<DraftOutput> {
        let rid = request_id.unwrap_or(NO_REQUEST_ID);
        let started = Instant::now();

        let output = self.preprocess(text, rid, self.agents.detect_structure).await?;

        tracing::info!("REQUEST {}: building query", rid);
        let mut build_query = agents::build_query(&output.extraction, &output.scope, &output.requirements);
        build_query.confirmed = true;
        self.memory
            .store_build_query_result(&output.scope.essential_text, &build_query)
            .await;

        tracing::info!("REQUEST {}: generating responses", rid);
        let responses = self
            .generate_responses(&build_query, &output.requirements, qa_context)
            .await?;

        tracing::info!(
            "REQUEST {}: draft complete in {:.2}s ({} responses)",
            rid,
            started.elapsed().as_secs_f64(),
            responses.len()
        );

        Ok(DraftOutput {
            output,
            build_query,
            responses,
        })
    }

    /// Draft responses for a confirmed build query.
    ///
    /// An explicit document structure yields one `STRUCTURED` response over the
    /// whole query; otherwise each solution requirement is answered on its own.
    pub async fn generate_responses(
        &self,
        build_query: &BuildQuery,
        requirements: &RequirementsResult,
        qa_context: Option<&str>,
    ) -> Result<Vec<RequirementResponse>> {
        if agents::response_mode(build_query) == ResponseMode::Comprehensive {
            tracing::info!("Explicit response structure: generating a single structured response");
            let result = agents::run_response_agent(
                self.llm.as_ref(),
                &self.response_request(build_query, qa_context),
            )
            .await?;
            return Ok(vec![RequirementResponse {
                requirement_id: STRUCTURED_RESPONSE_ID.to_string(),
                requirement_text: build_query.solution_requirements_summary.clone(),
                response: result.response_text,
            }]);
        }

        let total = requirements.solution_requirements.len();
        if total == 0 {
            tracing::warn!("No solution requirements to respond to");
        }

        let mut responses = Vec::with_capacity(total);
        for (idx, requirement) in requirements.solution_requirements.iter().enumerate() {
            tracing::info!("Generating response {}/{} for {}", idx + 1, total, requirement.id);
            let per_requirement = BuildQuery {
                query_text: build_query.query_text.clone(),
                solution_requirements_summary: requirement.display_text().to_string(),
                response_structure_requirements_summary: build_query
                    .response_structure_requirements_summary
                    .clone(),
                extraction_data: build_query.extraction_data.clone(),
                confirmed: build_query.confirmed,
            };

            let result = agents::run_response_agent(
                self.llm.as_ref(),
                &self.response_request(&per_requirement, qa_context),
            )
            .await?;
            responses.push(RequirementResponse {
                requirement_id: requirement.id.clone(),
                requirement_text: requirement.display_text().to_string(),
                response: result.response_text,
            });
        }
        Ok(responses)
    }

    fn response_request<'a>(
        &'a self,
        build_query: &'a BuildQuery,
        qa_context: Option<&'a str>,
    ) -> ResponseRequest<'a> {
        let mut request = ResponseRequest::new(build_query, &self.memory, &self.company);
        request.knowledge_base = self.knowledge_base.as_deref();
        request.qa_context = qa_context;
        request.context_window_tokens = self.agents.context_window_tokens;
        request.memory_results = self.agents.memory_results;
        request
    }

    async fn preprocess(&self, text: &str, rid: &str, detect: bool) -> Result<PipelineOutput> {
        let llm = self.llm.as_ref();

        tracing::info!("REQUEST {}: step 1/3 - extraction agent", rid);
        let extraction = agents::run_extraction_agent(llm, text).await?;
        tracing::info!(
            "REQUEST {}: extraction complete (lang={}, cpv={}, other_codes={})",
            rid,
            extraction.language,
            extraction.cpv_codes.len(),
            extraction.other_codes.len()
        );

        tracing::info!("REQUEST {}: step 2/3 - scope agent", rid);
        let scope = agents::run_scope_agent(llm, text).await?;
        tracing::info!(
            "REQUEST {}: scope complete (essential_chars={}, removed_chars={})",
            rid,
            scope.essential_text.len(),
            scope.removed_text.len()
        );
        self.memory.store_preprocess_result(text, &extraction, &scope).await;

        tracing::info!("REQUEST {}: step 3/3 - requirements agent", rid);
        let requirements = self.requirements_stage(&scope.essential_text, rid, detect).await?;

        Ok(PipelineOutput {
            extraction,
            scope,
            requirements,
        })
    }

    async fn requirements_stage(
        &self,
        essential_text: &str,
        rid: &str,
        detect: bool,
    ) -> Result<RequirementsResult> {
        let mut requirements = agents::run_requirements_agent(self.llm.as_ref(), essential_text).await?;
        tracing::info!(
            "REQUEST {}: requirements complete (solution={}, response_structure={})",
            rid,
            requirements.solution_requirements.len(),
            requirements.response_structure_requirements.len()
        );

        if detect {
            let detection = agents::detect_structure(
                self.llm.as_ref(),
                &requirements.response_structure_requirements,
            )
            .await;
            requirements.structure_detection = Some(detection);
        }

        self.memory
            .store_requirements_result(essential_text, &requirements)
            .await;
        Ok(requirements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::{stage, LocalMemoryStore};
    use crate::providers::ScriptedLlm;

    const EXTRACTION: &str = r#"{"language": "en", "cpv_codes": ["72000000-5"], "other_codes": []}"#;
    const SCOPE: &str = r#"{"essential_text": "The CRM must support SSO. The CRM must offer 24/7 support.", "removed_text": "Submit by May."}"#;
    const REQUIREMENTS: &str = r#"{"solution_requirements": [
        {"id": "SOL-001", "type": "mandatory", "source_text": "The CRM must support SSO."},
        {"id": "SOL-002", "type": "mandatory", "source_text": "The CRM must offer 24/7 support."}
    ], "response_structure_requirements": []}"#;

    fn scripted() -> ScriptedLlm {
        ScriptedLlm::new()
            .on("extraction agent", EXTRACTION)
            .on("scope agent", SCOPE)
            .on("requirements agent", REQUIREMENTS)
            .on("clarity checker", r#"{"clarity": "clear"}"#)
            .on("response agent", "We deliver this.")
    }

    fn pipeline(llm: Arc<ScriptedLlm>, memory: MemoryClient) -> RfpPipeline {
        RfpPipeline::new(llm, memory, AgentConfig::default(), "Acme")
    }

    #[tokio::test]
    async fn test_run_three_stages_and_stores_memories() {
        let llm = Arc::new(scripted());
        let store = Arc::new(LocalMemoryStore::in_memory());
        let memory = MemoryClient::new(Some(store.clone()));

        let output = pipeline(llm.clone(), memory.clone())
            .run("RFP text about CRM", Some("req-1"))
            .await
            .unwrap();

        assert_eq!(output.extraction.language, "en");
        assert_eq!(output.requirements.solution_requirements.len(), 2);
        assert!(output.requirements.structure_detection.is_none());
        assert_eq!(llm.count_calls("structure detection agent"), 0);
        assert_eq!(store.len(), 2);
        assert_eq!(
            memory.search_memories("crm sso", 5, Some(stage::REQUIREMENTS)).await.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_run_requirements_adds_detection() {
        let llm = Arc::new(scripted());
        let result = pipeline(llm.clone(), MemoryClient::disabled())
            .run_requirements("The CRM must support SSO.")
            .await
            .unwrap();

        // No structure requirements, so detection short-circuits without an LLM call
        let detection = result.structure_detection.unwrap();
        assert!(!detection.has_explicit_structure);
        assert_eq!(detection.confidence, 1.0);
        assert_eq!(llm.count_calls("structure detection agent"), 0);
    }

    #[tokio::test]
    async fn test_draft_answers_each_requirement() {
        let llm = Arc::new(scripted());
        let draft = pipeline(llm.clone(), MemoryClient::disabled())
            .draft("RFP text", None, Some("Q: Team size?\nA: 12 engineers"))
            .await
            .unwrap();

        assert!(draft.build_query.confirmed);
        assert_eq!(draft.responses.len(), 2);
        assert_eq!(draft.responses[0].requirement_id, "SOL-001");
        assert_eq!(draft.responses[1].response, "We deliver this.");
        assert_eq!(llm.count_calls("response agent"), 2);

        let prompts: Vec<String> = llm
            .calls()
            .iter()
            .filter(|r| r.system_prompt().contains("response agent"))
            .map(|r| r.user_prompt().to_string())
            .collect();
        assert!(prompts[0].contains("REQUIREMENT TO ADDRESS:\nThe CRM must support SSO."));
        assert!(prompts[1].contains("A: 12 engineers"));

        let value = serde_json::to_value(&draft).unwrap();
        assert!(value["extraction"].is_object());
        assert!(value["responses"].is_array());
    }

    #[tokio::test]
    async fn test_explicit_structure_yields_single_response() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .on("extraction agent", EXTRACTION)
                .on("scope agent", SCOPE)
                .on(
                    "requirements agent",
                    r#"{"solution_requirements": [{"source_text": "Support SSO."}],
                        "response_structure_requirements": [{"source_text": "Chapter 1: Executive Summary; Chapter 2: Technical Approach"}]}"#,
                )
                .on(
                    "structure detection agent",
                    r#"{"has_explicit_structure": true, "structure_type": "explicit",
                        "detected_sections": ["Executive Summary", "Technical Approach"], "confidence": 0.95}"#,
                )
                .on("clarity checker", r#"{"clarity": "clear"}"#)
                .on("response agent", "# Executive Summary\n\nWe deliver."),
        );

        let draft = pipeline(llm.clone(), MemoryClient::disabled())
            .draft("RFP text", Some("req-2"), None)
            .await
            .unwrap();
        assert_eq!(draft.responses.len(), 1);
        assert!(draft.responses[0].is_structured());
        assert_eq!(llm.count_calls("response agent"), 1);
    }

    #[tokio::test]
    async fn test_unconfirmed_query_is_rejected() {
        let llm = Arc::new(scripted());
        let query = agents::build_query(
            &crate::types::ExtractionResult::new("en"),
            &crate::types::ScopeResult::default(),
            &RequirementsResult::default(),
        );
        let requirements = RequirementsResult {
            solution_requirements: vec![crate::types::RequirementItem {
                id: "SOL-001".to_string(),
                requirement_type: String::new(),
                source_text: "Support SSO.".to_string(),
                normalized_text: String::new(),
                category: String::new(),
            }],
            ..Default::default()
        };

        let err = pipeline(llm, MemoryClient::disabled())
            .generate_responses(&query, &requirements, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_stage_failure_propagates() {
        let llm = Arc::new(ScriptedLlm::new().fail_on("extraction agent", "model offline"));
        let err = pipeline(llm, MemoryClient::disabled()).run("text", None).await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }
}
