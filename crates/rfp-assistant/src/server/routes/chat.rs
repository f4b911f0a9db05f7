//! Clarifying-question session endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{Answer, ConversationContext, Question};

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
pub struct AnswersRequest {
    pub answers: Vec<Answer>,
}

/// POST /chat/session - Start a session, optionally seeded with questions
pub async fn create_session(
    State(state): State<AppState>,
    payload: Option<Json<CreateSessionRequest>>,
) -> Json<serde_json::Value> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let session = state.create_session(request.questions);
    Json(serde_json::json!({
        "session_id": session.session_id,
        "questions": session.questions,
    }))
}

/// GET /chat/session/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ConversationContext>> {
    Ok(Json(state.get_session(&session_id)?))
}

/// POST /chat/session/:id/answers
pub async fn submit_answers(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AnswersRequest>,
) -> Result<Json<ConversationContext>> {
    let count = request.answers.len();
    let session = state.record_answers(&session_id, request.answers)?;
    tracing::info!("Recorded {} answers in session {}", count, session_id);
    Ok(Json(session))
}
