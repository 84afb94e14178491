//! HTTP router assembly.

use axum::{
    extract::{DefaultBodyLimit, Request},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{classify::ServerErrorsFailureClass, trace::TraceLayer};
use tracing::{info_span, Span};
use uuid::Uuid;

use crate::handlers::{
    backup_status, detailed_health, ingest_document, liveness, query_documents, readiness,
};
use crate::state::AppState;

/// Builds the Axum router hosting the REST surface.
pub fn build_router(state: AppState) -> Router {
    // The transport limit sits above the content cap enforced in the
    // ingest handler, leaving room for the JSON envelope and escaping.
    let body_limit = state.max_upload_bytes.saturating_mul(2);

    Router::new()
        // Document ingestion and search
        .route("/documents", post(ingest_document))
        .route("/query", post(query_documents))
        // Backup monitoring
        .route("/backup/status", get(backup_status))
        // Health probes
        .route("/health", get(detailed_health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        // Request logging
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    let request_id = Uuid::new_v4();
                    info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(|response: &Response, latency: std::time::Duration, _span: &Span| {
                    let status = response.status();
                    let latency_ms = latency.as_millis();

                    if status.is_server_error() {
                        tracing::error!(status = %status, latency_ms = latency_ms, "request failed with server error");
                    } else if status.is_client_error() {
                        tracing::warn!(status = %status, latency_ms = latency_ms, "request failed with client error");
                    } else {
                        tracing::info!(status = %status, latency_ms = latency_ms, "request completed");
                    }
                })
                .on_failure(|failure_class: ServerErrorsFailureClass, latency: std::time::Duration, _span: &Span| {
                    tracing::error!(failure_class = ?failure_class, latency_ms = latency.as_millis(), "request failed");
                }),
        )
}
