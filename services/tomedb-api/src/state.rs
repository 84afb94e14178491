//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use tomedb_storage::PersistenceCoordinator;
use tomedb_vector::VectorStore;

/// State shared across all request handlers.
///
/// Cloning is cheap: every field is either an `Arc` or `Copy`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<VectorStore>,
    pub coordinator: Arc<PersistenceCoordinator>,
    pub max_upload_bytes: usize,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<VectorStore>,
        coordinator: Arc<PersistenceCoordinator>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            coordinator,
            max_upload_bytes,
            started_at: Instant::now(),
        }
    }
}
