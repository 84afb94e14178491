//! Integration tests for the OpenAI-compatible embedding provider
//!
//! Runs against a local wiremock server standing in for the embeddings API:
//! 1. Successful batch embedding with out-of-order response rows
//! 2. API error responses map to typed errors
//! 3. Client-side validation never hits the network
//! 4. Optional L2 normalization
//! 5. Health check against the model endpoint

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tomedb_embedding::{
    BatchEmbeddingRequest, EmbeddingError, EmbeddingProvider, OpenAiConfig,
    OpenAiEmbeddingProvider,
};

fn provider_for(server: &MockServer) -> OpenAiEmbeddingProvider {
    OpenAiEmbeddingProvider::new(OpenAiConfig {
        base_url: server.uri(),
        api_key: "test-key".to_string(),
        dimension: 2,
        ..OpenAiConfig::default()
    })
    .unwrap()
}

fn batch(inputs: &[&str], normalize: bool) -> BatchEmbeddingRequest {
    BatchEmbeddingRequest {
        model: "text-embedding-3-small".to_string(),
        inputs: inputs.iter().map(|s| (*s).to_string()).collect(),
        normalize,
    }
}

#[tokio::test]
async fn test_embed_batch_orders_rows_by_index() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": ["first", "second"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let response = provider
        .embed_batch(batch(&["first", "second"], false))
        .await
        .unwrap();

    assert_eq!(response.embeddings[0], vec![1.0, 0.0]);
    assert_eq!(response.embeddings[1], vec![0.0, 1.0]);
    assert_eq!(response.usage.total_tokens, 4);
    assert_eq!(response.model, "text-embedding-3-small");
}

#[tokio::test]
async fn test_embed_batch_maps_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let result = provider.embed_batch(batch(&["text"], false)).await;

    match result {
        Err(EmbeddingError::Api { status, message }) => {
            assert_eq!(status, 401);
            assert!(message.contains("Incorrect API key"));
        }
        other => panic!("expected an API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_embed_batch_validates_before_network() {
    // No mock mounted: any request would fail, so validation must short-circuit
    let server = MockServer::start().await;
    let provider = provider_for(&server);

    let result = provider.embed_batch(batch(&[], false)).await;
    assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));

    let result = provider.embed_batch(batch(&["ok", "  "], false)).await;
    assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
}

#[tokio::test]
async fn test_embed_batch_normalizes_when_requested() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [3.0, 4.0]}],
            "usage": {"total_tokens": 1}
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let response = provider.embed_batch(batch(&["text"], true)).await.unwrap();

    let embedding = &response.embeddings[0];
    assert!((embedding[0] - 0.6).abs() < 1e-6);
    assert!((embedding[1] - 0.8).abs() < 1e-6);
}

#[tokio::test]
async fn test_embed_batch_rejects_row_count_mismatch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0, 0.0]}],
            "usage": {"total_tokens": 2}
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let result = provider.embed_batch(batch(&["one", "two"], false)).await;
    assert!(matches!(result, Err(EmbeddingError::Internal(_))));
}

#[tokio::test]
async fn test_health_check_queries_model_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models/text-embedding-3-small"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "text-embedding-3-small",
            "object": "model"
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    assert!(provider.health_check().await.is_ok());
}

#[tokio::test]
async fn test_health_check_reports_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models/text-embedding-3-small"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let result = provider.health_check().await;
    assert!(matches!(result, Err(EmbeddingError::ServiceUnavailable(_))));
}
