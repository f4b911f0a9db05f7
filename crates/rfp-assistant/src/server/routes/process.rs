//! RFP upload endpoints

use axum::{
    extract::{Multipart, State},
    response::Response,
    Json,
};
use bytes::Bytes;
use std::time::Instant;
use uuid::Uuid;

use crate::docx::DocumentRequest;
use crate::error::{Error, Result};
use crate::server::state::AppState;

use super::export::docx_response;

/// The uploaded file plus any text fields sent alongside it
struct Upload {
    filename: String,
    data: Bytes,
    qa_context: Option<String>,
    title: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    let mut file = None;
    let mut qa_context = None;
    let mut title = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "qa_context" | "title" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::BadRequest(format!("Failed to read {}: {}", name, e)))?;
                let value = Some(value).filter(|v| !v.trim().is_empty());
                if name == "title" {
                    title = value;
                } else {
                    qa_context = value;
                }
            }
            _ if file.is_none() => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::BadRequest(format!("Failed to read file: {}", e)))?;
                file = Some((filename, data));
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| Error::BadRequest("No file uploaded".to_string()))?;
    if filename.trim().is_empty() {
        return Err(Error::BadRequest("Uploaded file has no filename".to_string()));
    }
    Ok(Upload {
        filename,
        data,
        qa_context,
        title,
    })
}

/// POST /process-rfp - Extract text and run extraction, scope and requirements
pub async fn process_rfp(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let request_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    let upload = read_upload(multipart).await?;
    tracing::info!(
        "REQUEST {}: processing {} ({} bytes)",
        request_id,
        upload.filename,
        upload.data.len()
    );

    let extracted = state.extractor().extract(&upload.filename, &upload.data).await?;
    tracing::info!(
        "REQUEST {}: extracted {} chars via {:?}",
        request_id,
        extracted.text.len(),
        extracted.method
    );

    let output = state
        .pipeline()
        .run(&extracted.text, Some(&request_id))
        .await
        .map_err(|e| {
            tracing::error!("REQUEST {}: pipeline failed: {}", request_id, e);
            Error::Internal(format!(
                "Pipeline failed for request {}. Check server logs.",
                request_id
            ))
        })?;

    let mut response = serde_json::to_value(&output)?;
    if let Some(object) = response.as_object_mut() {
        object.insert("ocr_source_text".to_string(), serde_json::json!(extracted.text));
    }

    tracing::info!(
        "REQUEST {}: completed in {:.2}s",
        request_id,
        start.elapsed().as_secs_f64()
    );
    Ok(Json(response))
}

/// POST /draft-rfp - Upload an RFP and get back a drafted DOCX
pub async fn draft_rfp(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let request_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    let upload = read_upload(multipart).await?;
    tracing::info!(
        "REQUEST {}: drafting response to {} ({} bytes)",
        request_id,
        upload.filename,
        upload.data.len()
    );

    let extracted = state.extractor().extract(&upload.filename, &upload.data).await?;
    let draft = state
        .pipeline()
        .draft(&extracted.text, Some(&request_id), upload.qa_context.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("REQUEST {}: draft failed: {}", request_id, e);
            Error::Internal(format!(
                "Pipeline failed for request {}. Check server logs.",
                request_id
            ))
        })?;

    if draft.responses.is_empty() {
        return Err(Error::BadRequest(
            "No solution requirements were found in the RFP".to_string(),
        ));
    }

    let document = DocumentRequest {
        responses: draft.responses,
        requirements: draft.output.requirements.solution_requirements,
        extraction: Some(draft.output.extraction),
        title: upload.title,
    };
    let bytes = state.docx().generate(&document).await?;

    tracing::info!(
        "REQUEST {}: DOCX ready in {:.2}s",
        request_id,
        start.elapsed().as_secs_f64()
    );
    docx_response(bytes, &format!("rfp_response_{}.docx", request_id), None)
}
