//! Document store facade over chunking, embedding, and the flat index.
//!
//! `VectorStore` is the single entry point the API service talks to. An
//! ingest splits the document into chunks, embeds them in one batch,
//! inserts the chunk records into the index, and then gives the
//! persistence coordinator a chance to run an interval backup. Backup
//! failures are logged and never propagate into the ingest result; the
//! upload has already been persisted locally by the time the backup runs.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use tomedb_core::{CoreError, CoreResult, DocumentId};
use tomedb_embedding::{BatchEmbeddingRequest, EmbeddingError, EmbeddingProvider, ModelInfo};
use tomedb_storage::{BackupOutcome, PersistenceCoordinator};

use crate::chunking::{chunk_text, ChunkConfig};
use crate::engine::FlatIndex;
use crate::types::{ChunkMetadata, ChunkRecord, QueryMatch};

/// Summary of one ingested document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddReport {
    /// Identifier assigned to the upload.
    pub document_id: DocumentId,
    /// Source filename the chunks were filed under.
    pub source: String,
    /// Number of chunks produced and stored.
    pub chunks: usize,
    /// Size of the ingested content in bytes.
    pub size_bytes: usize,
    /// Tokens consumed by the embedding request.
    pub total_tokens: usize,
}

/// High-level document store backing the HTTP API.
pub struct VectorStore {
    index: FlatIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    coordinator: Arc<PersistenceCoordinator>,
    chunking: ChunkConfig,
}

impl VectorStore {
    /// Opens the store over `db_dir`.
    ///
    /// The caller is expected to have already reconciled `db_dir` with the
    /// remote backup (see `PersistenceCoordinator::restore_on_start`) so
    /// the index loads the freshest state.
    pub async fn open(
        db_dir: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        coordinator: Arc<PersistenceCoordinator>,
        chunking: ChunkConfig,
    ) -> CoreResult<Self> {
        let index = FlatIndex::open(db_dir).await?;
        Ok(Self {
            index,
            embedder,
            coordinator,
            chunking,
        })
    }

    /// Chunks, embeds, and stores one document, then triggers an interval
    /// backup check.
    ///
    /// # Errors
    ///
    /// - `CoreError::ValidationError` if `filename` or `content` is blank
    /// - `CoreError::EmbeddingError` if the embedding backend fails
    /// - `CoreError::IoError` if persisting the index fails
    ///
    /// A failed backup check is logged and does not fail the ingest.
    pub async fn add_document(
        &self,
        filename: &str,
        content: &str,
        content_type: Option<String>,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> CoreResult<AddReport> {
        if filename.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "filename must not be blank".to_string(),
            ));
        }

        let chunks = chunk_text(content, &self.chunking);
        if chunks.is_empty() {
            return Err(CoreError::ValidationError(
                "document content must not be blank".to_string(),
            ));
        }

        let response = self
            .embedder
            .embed_batch(BatchEmbeddingRequest {
                model: String::new(),
                inputs: chunks.clone(),
                normalize: true,
            })
            .await
            .map_err(embedding_error)?;

        let document_id = DocumentId::new();
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(response.embeddings)
            .enumerate()
            .map(|(part, (chunk, embedding))| {
                let metadata = ChunkMetadata {
                    source: filename.to_string(),
                    part,
                    content_type: content_type.clone(),
                    extra: extra.clone(),
                };
                ChunkRecord::new(document_id, chunk, embedding, metadata)
            })
            .collect();
        let chunk_count = records.len();

        self.index.insert(records).await?;
        info!(
            document_id = %document_id,
            filename,
            chunks = chunk_count,
            total_tokens = response.usage.total_tokens,
            "Document ingested"
        );

        self.backup_checkpoint().await;

        Ok(AddReport {
            document_id,
            source: filename.to_string(),
            chunks: chunk_count,
            size_bytes: content.len(),
            total_tokens: response.usage.total_tokens,
        })
    }

    /// Embeds `query` and returns the `k` most similar stored chunks
    /// scoring at least `min_score`.
    ///
    /// # Errors
    ///
    /// - `CoreError::ValidationError` if `query` is blank
    /// - `CoreError::EmbeddingError` if the embedding backend fails
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        min_score: f32,
    ) -> CoreResult<Vec<QueryMatch>> {
        if query.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "query text must not be blank".to_string(),
            ));
        }

        let response = self
            .embedder
            .embed_batch(BatchEmbeddingRequest {
                model: String::new(),
                inputs: vec![query.to_string()],
                normalize: true,
            })
            .await
            .map_err(embedding_error)?;

        let query_vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::internal("embedding backend returned no vectors"))?;

        self.index.search(&query_vector, k, min_score)
    }

    /// Returns the number of stored chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    /// Returns the number of distinct ingested documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.index.document_count()
    }

    /// Returns the embedding dimension of the stored chunks, if any.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    /// Checks whether the embedding backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmbeddingError` when the backend is down.
    pub async fn embedder_health(&self) -> CoreResult<()> {
        self.embedder.health_check().await.map_err(embedding_error)
    }

    /// Reports the embedding model the store is configured with.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmbeddingError` if the backend cannot be queried.
    pub async fn embedding_model(&self) -> CoreResult<ModelInfo> {
        self.embedder.model_info().await.map_err(embedding_error)
    }

    /// Runs the interval backup check, swallowing failures.
    async fn backup_checkpoint(&self) {
        match self.coordinator.maybe_backup(Utc::now()).await {
            Ok(BackupOutcome::Completed(report)) => {
                info!(
                    label = %report.label,
                    files = report.files,
                    bytes = report.bytes,
                    "Backup completed after ingest"
                );
            }
            Ok(BackupOutcome::NotDue) => {}
            Err(err) => {
                warn!(error = %err, "Scheduled backup failed, ingest unaffected");
            }
        }
    }
}

fn embedding_error(err: EmbeddingError) -> CoreError {
    CoreError::EmbeddingError(err.to_string())
}
