use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::provider::EmbeddingProvider;
use crate::types::{
    BatchEmbeddingRequest, BatchEmbeddingResponse, EmbeddingError, EmbeddingResult, ModelInfo,
    Usage,
};

/// Mock embedding provider for testing.
///
/// Generates deterministic embeddings seeded from the input's hash, so tests
/// run without network access and identical texts always map to identical
/// vectors.
pub struct MockEmbeddingProvider {
    model: String,
    dimension: u32,
    latency_ms: u64,
}

impl MockEmbeddingProvider {
    /// Default model name for the mock provider.
    pub const DEFAULT_MODEL: &'static str = "mock-embed-1536";
    /// Default dimension, matching the real provider's default model.
    pub const DEFAULT_DIMENSION: u32 = 1536;

    /// Creates a mock provider with default parameters and no latency.
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: Self::DEFAULT_MODEL.to_string(),
            dimension: Self::DEFAULT_DIMENSION,
            latency_ms: 0,
        }
    }

    /// Creates a mock provider with a custom dimension.
    #[must_use]
    pub fn with_dimension(dimension: u32) -> Self {
        Self {
            model: format!("mock-embed-{dimension}"),
            dimension,
            latency_ms: 0,
        }
    }

    /// Sets a simulated per-batch latency.
    #[must_use]
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Generate a deterministic embedding for one input.
    fn generate_embedding(&self, text: &str, normalize: bool) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        // Odd seed keeps the xorshift sequence from collapsing to zero
        let mut state = hasher.finish() | 1;

        let mut embedding = Vec::with_capacity(self.dimension as usize);
        for _ in 0..self.dimension {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            // 24 high bits scaled into [-1, 1)
            embedding.push((state >> 40) as f32 / 8_388_608.0 - 1.0);
        }

        if normalize {
            let magnitude = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if magnitude > 0.0 {
                for value in &mut embedding {
                    *value /= magnitude;
                }
            }
        }

        embedding
    }

    /// Token estimate for usage reporting (word count).
    fn estimate_tokens(text: &str) -> usize {
        text.split_whitespace().count().max(1)
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(
        &self,
        request: BatchEmbeddingRequest,
    ) -> EmbeddingResult<BatchEmbeddingResponse> {
        let start = Instant::now();

        if request.inputs.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "empty input batch".to_string(),
            ));
        }
        if request.inputs.iter().any(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "input texts must be non-empty".to_string(),
            ));
        }

        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }

        let embeddings: Vec<Vec<f32>> = request
            .inputs
            .iter()
            .map(|text| self.generate_embedding(text, request.normalize))
            .collect();

        let total_tokens = request
            .inputs
            .iter()
            .map(|text| Self::estimate_tokens(text))
            .sum();

        Ok(BatchEmbeddingResponse {
            model: self.model.clone(),
            embeddings,
            usage: Usage {
                total_tokens,
                duration_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    async fn model_info(&self) -> EmbeddingResult<ModelInfo> {
        Ok(ModelInfo {
            model: self.model.clone(),
            dimension: self.dimension,
            max_tokens: 8192,
        })
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(inputs: &[&str], normalize: bool) -> BatchEmbeddingRequest {
        BatchEmbeddingRequest {
            model: MockEmbeddingProvider::DEFAULT_MODEL.to_string(),
            inputs: inputs.iter().map(|s| (*s).to_string()).collect(),
            normalize,
        }
    }

    #[tokio::test]
    async fn test_mock_provider_deterministic() {
        let provider = MockEmbeddingProvider::new();

        let first = provider
            .embed_batch(request(&["hello world"], false))
            .await
            .unwrap();
        let second = provider
            .embed_batch(request(&["hello world"], false))
            .await
            .unwrap();

        assert_eq!(first.embeddings, second.embeddings);
    }

    #[tokio::test]
    async fn test_mock_provider_distinct_inputs_differ() {
        let provider = MockEmbeddingProvider::new();

        let response = provider
            .embed_batch(request(&["alpha", "beta"], false))
            .await
            .unwrap();

        assert_eq!(response.embeddings.len(), 2);
        assert_ne!(response.embeddings[0], response.embeddings[1]);
    }

    #[tokio::test]
    async fn test_mock_provider_dimension() {
        let provider = MockEmbeddingProvider::with_dimension(128);
        let response = provider
            .embed_batch(BatchEmbeddingRequest {
                model: "mock-embed-128".to_string(),
                inputs: vec!["test".to_string()],
                normalize: false,
            })
            .await
            .unwrap();

        assert_eq!(response.embeddings[0].len(), 128);
    }

    #[tokio::test]
    async fn test_mock_provider_normalize() {
        let provider = MockEmbeddingProvider::new();
        let response = provider
            .embed_batch(request(&["normalize me"], true))
            .await
            .unwrap();

        let magnitude: f32 = response.embeddings[0]
            .iter()
            .map(|x| x * x)
            .sum::<f32>()
            .sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_provider_rejects_empty_batch() {
        let provider = MockEmbeddingProvider::new();
        let result = provider.embed_batch(request(&[], false)).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_mock_provider_rejects_blank_text() {
        let provider = MockEmbeddingProvider::new();
        let result = provider.embed_batch(request(&["ok", "   "], false)).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_mock_provider_model_info() {
        let provider = MockEmbeddingProvider::with_dimension(256);
        let info = provider.model_info().await.unwrap();
        assert_eq!(info.dimension, 256);
        assert_eq!(info.model, "mock-embed-256");
    }

    #[tokio::test]
    async fn test_mock_provider_usage() {
        let provider = MockEmbeddingProvider::new();
        let response = provider
            .embed_batch(request(&["one two three", "four"], false))
            .await
            .unwrap();
        assert_eq!(response.usage.total_tokens, 4);
    }
}
