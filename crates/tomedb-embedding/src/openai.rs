use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::EmbeddingProvider;
use crate::types::{
    BatchEmbeddingRequest, BatchEmbeddingResponse, EmbeddingError, EmbeddingResult, ModelInfo,
    Usage,
};

/// Configuration for the OpenAI-compatible embeddings API.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API base URL, without the trailing endpoint path.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Model used when a request does not name one.
    pub model: String,
    /// Output dimension of the configured model.
    pub dimension: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize)]
struct ApiEmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct ApiEmbeddingsResponse {
    data: Vec<ApiEmbeddingRow>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
struct ApiEmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiUsage {
    total_tokens: usize,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn l2_normalize(embedding: &mut [f32]) {
    let magnitude = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in embedding.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Embedding provider backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiEmbeddingProvider {
    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::Internal` if the HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> EmbeddingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Internal(format!("Failed to build HTTP client: {e}")))?;

        let config = OpenAiConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
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

        let model = if request.model.is_empty() {
            self.config.model.as_str()
        } else {
            request.model.as_str()
        };

        debug!(
            "Embedding batch of {} inputs with model {}",
            request.inputs.len(),
            model
        );

        let response = self
            .client
            .post(self.endpoint("embeddings"))
            .bearer_auth(&self.config.api_key)
            .json(&ApiEmbeddingsRequest {
                model,
                input: &request.inputs,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            warn!("Embedding API rejected request: {} {}", status, message);
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut parsed: ApiEmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::RequestFailed(format!("Malformed API response: {e}")))?;

        if parsed.data.len() != request.inputs.len() {
            return Err(EmbeddingError::Internal(format!(
                "API returned {} embeddings for {} inputs",
                parsed.data.len(),
                request.inputs.len()
            )));
        }

        // The API does not guarantee row order
        parsed.data.sort_by_key(|row| row.index);

        let embeddings: Vec<Vec<f32>> = parsed
            .data
            .into_iter()
            .map(|row| {
                let mut embedding = row.embedding;
                if request.normalize {
                    l2_normalize(&mut embedding);
                }
                embedding
            })
            .collect();

        Ok(BatchEmbeddingResponse {
            model: model.to_string(),
            embeddings,
            usage: Usage {
                total_tokens: parsed.usage.total_tokens,
                duration_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    async fn model_info(&self) -> EmbeddingResult<ModelInfo> {
        // The embeddings API has no dimension introspection; report the
        // configured model's parameters.
        Ok(ModelInfo {
            model: self.config.model.clone(),
            dimension: self.config.dimension,
            max_tokens: 8191,
        })
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        let url = self.endpoint(&format!("models/{}", self.config.model));
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| EmbeddingError::ServiceUnavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(EmbeddingError::ServiceUnavailable(format!(
                "model endpoint returned {}",
                response.status()
            )))
        }
    }
}
