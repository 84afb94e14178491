//! Backup monitoring endpoint.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use tomedb_storage::BackupStatus;

use crate::state::AppState;

/// `GET /backup/status`
pub async fn backup_status(State(state): State<AppState>) -> Json<BackupStatus> {
    Json(state.coordinator.status(Utc::now()))
}
