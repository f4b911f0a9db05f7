//! API routes for the RFP server

pub mod chat;
pub mod export;
pub mod process;
pub mod stages;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Uploads - with larger body limit
        .route(
            "/process-rfp",
            post(process::process_rfp).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/draft-rfp",
            post(process::draft_rfp).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Individual pipeline stages
        .route("/run-requirements", post(stages::run_requirements))
        .route("/build-query", post(stages::build_query))
        .route("/generate-questions", post(stages::generate_questions))
        .route("/generate-response", post(stages::generate_response))
        .route("/record-edit", post(stages::record_edit))
        // Clarifying-question sessions
        .route("/chat/session", post(chat::create_session))
        .route("/chat/session/:id", get(chat::get_session))
        .route("/chat/session/:id/answers", post(chat::submit_answers))
        // Export
        .route(
            "/export-docx",
            post(export::export_docx).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "rfp-assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "RFP response drafting: extraction, requirement analysis, memory-backed drafting and DOCX export",
        "endpoints": {
            "GET /health": "Liveness check",
            "GET /ready": "Readiness check",
            "POST /process-rfp": "Upload an RFP (PDF/DOCX/DOC) and run extraction, scope and requirements",
            "POST /draft-rfp": "Upload an RFP and receive a drafted DOCX response",
            "POST /run-requirements": "Classify requirements in essential RFP text",
            "POST /build-query": "Assemble a build query from pipeline output",
            "POST /generate-questions": "Clarifying questions for a build query",
            "POST /chat/session": "Start a clarifying-question session",
            "GET /chat/session/:id": "Get a session",
            "POST /chat/session/:id/answers": "Record answers in a session",
            "POST /generate-response": "Draft responses for a confirmed build query",
            "POST /export-docx": "Render responses to DOCX (?upload=true stores a copy)",
            "POST /record-edit": "Remember a user's corrections to a draft"
        }
    }))
}
