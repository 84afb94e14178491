//! Semantic search endpoint.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tomedb_vector::ChunkMetadata;

use crate::handlers::ApiError;
use crate::state::AppState;

/// Request body for `POST /query`.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Maximum number of results to return.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Minimum cosine similarity for a chunk to qualify.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

fn default_k() -> usize {
    3
}

fn default_min_score() -> f32 {
    0.1
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Serialize)]
pub struct QueryResult {
    /// Filename of the document the chunk came from.
    pub title: String,
    pub content: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// `POST /query`
pub async fn query_documents(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let matches = state
        .store
        .search(&request.query, request.k, request.min_score)
        .await?;

    let results = matches
        .into_iter()
        .map(|hit| QueryResult {
            title: hit.metadata.source.clone(),
            content: hit.content,
            score: hit.score,
            metadata: hit.metadata,
        })
        .collect();

    Ok(Json(QueryResponse { results }))
}
