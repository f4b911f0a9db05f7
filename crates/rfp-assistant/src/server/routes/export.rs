//! DOCX export endpoint

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::docx::DocumentRequest;
use crate::error::{Error, Result};
use crate::server::state::AppState;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Name of the stored copy, when one was uploaded
pub const BLOB_NAME_HEADER: &str = "x-blob-name";

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    /// Keep a copy in blob storage
    #[serde(default)]
    pub upload: bool,
}

/// POST /export-docx - Render responses to DOCX
pub async fn export_docx(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
    Json(request): Json<DocumentRequest>,
) -> Result<Response> {
    let bytes = state.docx().generate(&request).await?;
    let filename = format!("rfp_response_{}.docx", Uuid::new_v4());

    let mut blob_name = None;
    if params.upload {
        match state.blob_store() {
            Some(store) => {
                let name = format!("{}{}", state.config().storage.docx_prefix, filename);
                // The caller still gets the document when the upload fails
                match store.upload_bytes(&name, &bytes, true).await {
                    Ok(()) => blob_name = Some(name),
                    Err(e) => tracing::warn!("Failed to store {} in {}: {}", name, store.name(), e),
                }
            }
            None => tracing::warn!("Upload requested but no blob storage is configured"),
        }
    }

    docx_response(bytes, &filename, blob_name.as_deref())
}

/// Attachment response carrying DOCX bytes
pub fn docx_response(bytes: Vec<u8>, filename: &str, blob_name: Option<&str>) -> Result<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(DOCX_CONTENT_TYPE));
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&format!("attachment; filename=\"{}\"", filename))?,
    );
    if let Some(name) = blob_name {
        headers.insert(HeaderName::from_static(BLOB_NAME_HEADER), header_value(name)?);
    }
    Ok((headers, bytes).into_response())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Internal(format!("Invalid header value: {}", e)))
}
