//! Document ingestion endpoint.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tomedb_core::DocumentId;

use crate::handlers::ApiError;
use crate::state::AppState;

/// Request body for `POST /documents`.
///
/// `content` is plain text; extraction from binary formats happens
/// upstream. `metadata` entries are stored verbatim on every chunk.
#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub filename: String,
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub document_id: DocumentId,
    pub filename: String,
    pub chunks: usize,
    pub size_bytes: usize,
}

/// `POST /documents`
pub async fn ingest_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    if request.content.len() > state.max_upload_bytes {
        return Err(ApiError::Validation(format!(
            "document content is {} bytes, exceeding the {} byte upload limit",
            request.content.len(),
            state.max_upload_bytes
        )));
    }

    let report = state
        .store
        .add_document(
            &request.filename,
            &request.content,
            request.content_type,
            request.metadata,
        )
        .await?;

    Ok(Json(DocumentResponse {
        document_id: report.document_id,
        filename: report.source,
        chunks: report.chunks,
        size_bytes: report.size_bytes,
    }))
}
