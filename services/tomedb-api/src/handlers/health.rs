//! Health and readiness endpoints.
//!
//! `/health/live` and `/health/ready` are probe-friendly status codes;
//! `/health` reports per-component detail for humans and dashboards.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub components: HashMap<&'static str, ComponentHealth>,
}

/// `GET /health/live`
///
/// Process is up and serving requests.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// `GET /health/ready`
///
/// Ready to take traffic: the embedding backend and the remote object
/// store both answer.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.store.embedder_health().await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    if state.coordinator.current_manifest().await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// `GET /health`
pub async fn detailed_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut components = HashMap::new();

    // An absent manifest is a fresh install, not an outage.
    let object_store = match state.coordinator.current_manifest().await {
        Ok(Some(manifest)) => ComponentHealth {
            status: HealthStatus::Healthy,
            message: Some(format!("last backup manifest from {}", manifest.timestamp)),
        },
        Ok(None) => ComponentHealth {
            status: HealthStatus::Healthy,
            message: Some("no backup published yet".to_string()),
        },
        Err(err) => ComponentHealth {
            status: HealthStatus::Unhealthy,
            message: Some(err.to_string()),
        },
    };
    components.insert("object_store", object_store);

    components.insert(
        "vector_engine",
        ComponentHealth {
            status: HealthStatus::Healthy,
            message: Some(format!(
                "{} documents, {} chunks",
                state.store.document_count(),
                state.store.chunk_count()
            )),
        },
    );

    let embedding = match state.store.embedding_model().await {
        Ok(info) => ComponentHealth {
            status: HealthStatus::Healthy,
            message: Some(format!("{} ({} dimensions)", info.model, info.dimension)),
        },
        Err(err) => ComponentHealth {
            status: HealthStatus::Unhealthy,
            message: Some(err.to_string()),
        },
    };
    components.insert("embedding_provider", embedding);

    let statuses: Vec<HealthStatus> = components.values().map(|c| c.status).collect();

    Json(HealthResponse {
        status: determine_overall_status(&statuses),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        components,
    })
}

/// The worst component status wins.
fn determine_overall_status(statuses: &[HealthStatus]) -> HealthStatus {
    if statuses.contains(&HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if statuses.contains(&HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_status_all_healthy() {
        let statuses = [HealthStatus::Healthy, HealthStatus::Healthy];
        assert_eq!(determine_overall_status(&statuses), HealthStatus::Healthy);
    }

    #[test]
    fn test_overall_status_degraded_wins_over_healthy() {
        let statuses = [HealthStatus::Healthy, HealthStatus::Degraded];
        assert_eq!(determine_overall_status(&statuses), HealthStatus::Degraded);
    }

    #[test]
    fn test_overall_status_unhealthy_wins() {
        let statuses = [
            HealthStatus::Healthy,
            HealthStatus::Degraded,
            HealthStatus::Unhealthy,
        ];
        assert_eq!(determine_overall_status(&statuses), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_overall_status_empty_is_healthy() {
        assert_eq!(determine_overall_status(&[]), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }
}
