use async_trait::async_trait;

use crate::types::{BatchEmbeddingRequest, BatchEmbeddingResponse, EmbeddingResult, ModelInfo};

/// Trait for embedding providers.
///
/// Implementations wrap a concrete backend (a remote embeddings API, a
/// deterministic mock) behind one interface, so the document pipeline never
/// depends on which one is configured.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of text inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Input validation fails (empty batch, empty text)
    /// - The backend rejects the request or is unreachable
    async fn embed_batch(
        &self,
        request: BatchEmbeddingRequest,
    ) -> EmbeddingResult<BatchEmbeddingResponse>;

    /// Get model information (dimension, capabilities).
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not available.
    async fn model_info(&self) -> EmbeddingResult<ModelInfo>;

    /// Health check for the embedding backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unhealthy or unreachable.
    async fn health_check(&self) -> EmbeddingResult<()>;
}
