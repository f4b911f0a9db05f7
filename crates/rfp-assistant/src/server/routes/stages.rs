//! Endpoints that run one pipeline stage at a time

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::agents;
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{
    BuildQuery, ExtractionResult, Question, RequirementResponse, RequirementsResult, ScopeResult,
};

#[derive(Debug, Deserialize)]
pub struct RunRequirementsRequest {
    pub essential_text: String,
}

#[derive(Debug, Deserialize)]
pub struct BuildQueryRequest {
    pub extraction: ExtractionResult,
    pub scope: ScopeResult,
    pub requirements: RequirementsResult,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuestionsRequest {
    pub build_query: BuildQuery,
}

#[derive(Debug, Serialize)]
pub struct GenerateQuestionsResponse {
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponseRequest {
    pub build_query: BuildQuery,
    pub requirements: RequirementsResult,
    /// Answers from this chat session become Q&A context
    #[serde(default)]
    pub session_id: Option<String>,
    /// Explicit Q&A context; takes precedence over the session
    #[serde(default)]
    pub qa_context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponseResponse {
    pub responses: Vec<RequirementResponse>,
    pub total_requirements: usize,
}

#[derive(Debug, Deserialize)]
pub struct RecordEditRequest {
    pub original: String,
    pub edited: String,
    /// Requirement the draft answered; keys the memory when present
    #[serde(default)]
    pub requirement: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordEditResponse {
    pub stored: bool,
    pub changes: usize,
}

/// POST /run-requirements - Requirements agent plus structure detection
pub async fn run_requirements(
    State(state): State<AppState>,
    Json(request): Json<RunRequirementsRequest>,
) -> Result<Json<RequirementsResult>> {
    if request.essential_text.trim().is_empty() {
        return Err(Error::BadRequest("essential_text is empty".to_string()));
    }
    let requirements = state.pipeline().run_requirements(&request.essential_text).await?;
    Ok(Json(requirements))
}

/// POST /build-query - Deterministic build query assembly
pub async fn build_query(Json(request): Json<BuildQueryRequest>) -> Json<BuildQuery> {
    Json(agents::build_query(
        &request.extraction,
        &request.scope,
        &request.requirements,
    ))
}

/// POST /generate-questions
pub async fn generate_questions(
    State(state): State<AppState>,
    Json(request): Json<GenerateQuestionsRequest>,
) -> Result<Json<GenerateQuestionsResponse>> {
    let questions = state.pipeline().generate_questions(&request.build_query).await?;
    Ok(Json(GenerateQuestionsResponse { questions }))
}

/// POST /generate-response - Draft responses for a confirmed build query
pub async fn generate_response(
    State(state): State<AppState>,
    Json(request): Json<GenerateResponseRequest>,
) -> Result<Json<GenerateResponseResponse>> {
    let start = Instant::now();

    let qa_context = match request.qa_context.filter(|c| !c.trim().is_empty()) {
        Some(context) => Some(context),
        None => match request.session_id.as_deref() {
            Some(id) => Some(state.get_session(id)?.get_qa_context()).filter(|c| !c.is_empty()),
            None => None,
        },
    };

    let responses = state
        .pipeline()
        .generate_responses(&request.build_query, &request.requirements, qa_context.as_deref())
        .await?;

    tracing::info!(
        "Generated {} responses in {:.2}s",
        responses.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(Json(GenerateResponseResponse {
        total_requirements: request.requirements.solution_requirements.len(),
        responses,
    }))
}

/// POST /record-edit - Remember the sentences a user corrected
pub async fn record_edit(
    State(state): State<AppState>,
    Json(request): Json<RecordEditRequest>,
) -> Result<Json<RecordEditResponse>> {
    if request.original.trim().is_empty() || request.edited.trim().is_empty() {
        return Err(Error::BadRequest(
            "original and edited text are required".to_string(),
        ));
    }

    let changes = state
        .pipeline()
        .memory()
        .store_edit_memory(&request.original, &request.edited, request.requirement.as_deref())
        .await;

    Ok(Json(RecordEditResponse {
        stored: changes.is_some(),
        changes: changes.unwrap_or(0),
    }))
}
