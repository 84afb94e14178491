//! End-to-end tests for the TomeDB REST API

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use tomedb_api::{build_router, AppState};
use tomedb_embedding::MockEmbeddingProvider;
use tomedb_storage::{
    BackupPolicy, MockObjectStore, MockStoreConfig, ObjectStore, PersistenceCoordinator,
    RemoteLayout,
};
use tomedb_vector::{ChunkConfig, VectorStore};

/// Initialize tracing for tests (call once)
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("tomedb_api=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

async fn state_over(
    db_dir: &Path,
    remote: Arc<dyn ObjectStore>,
    max_upload_bytes: usize,
) -> AppState {
    let coordinator = Arc::new(PersistenceCoordinator::new(
        remote,
        RemoteLayout::new("tomedb"),
        db_dir,
        BackupPolicy::default(),
    ));
    let embedder = Arc::new(MockEmbeddingProvider::with_dimension(8));
    let store = VectorStore::open(db_dir, embedder, coordinator.clone(), ChunkConfig::default())
        .await
        .unwrap();
    AppState::new(Arc::new(store), coordinator, max_upload_bytes)
}

async fn test_app(db_dir: &Path) -> axum::Router {
    let remote: Arc<dyn ObjectStore> =
        Arc::new(MockObjectStore::new_with_config(MockStoreConfig::instant()));
    build_router(state_over(db_dir, remote, 1024 * 1024).await)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path()).await;

    let response = app
        .clone()
        .oneshot(get_request("/health/live"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get_request("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_detailed_health_reports_components() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path()).await;

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["object_store"]["status"], "healthy");
    assert_eq!(body["components"]["vector_engine"]["status"], "healthy");
    assert_eq!(body["components"]["embedding_provider"]["status"], "healthy");
    assert!(body["version"].is_string());
    assert!(body["uptime_seconds"].is_number());
}

#[tokio::test]
async fn test_readiness_fails_when_object_store_is_down() {
    let dir = TempDir::new().unwrap();
    let remote: Arc<dyn ObjectStore> = Arc::new(MockObjectStore::new_always_fail(
        "503 Service Unavailable",
        true,
    ));
    let app = build_router(state_over(dir.path(), remote, 1024 * 1024).await);

    let response = app
        .clone()
        .oneshot(get_request("/health/ready"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.oneshot(get_request("/health")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["components"]["object_store"]["status"], "unhealthy");
    assert_eq!(body["components"]["vector_engine"]["status"], "healthy");
}

#[tokio::test]
async fn test_ingest_document() {
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path()).await;

    let content = "Ownership in Rust moves values by default. Borrowing lends access \
                   without transferring the value.";
    let response = app
        .oneshot(post_json(
            "/documents",
            &json!({"filename": "ownership.md", "content": content}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert!(body["document_id"].is_string());
    assert_eq!(body["filename"], "ownership.md");
    assert_eq!(body["chunks"], 1);
    assert_eq!(body["size_bytes"], content.len() as u64);
}

#[tokio::test]
async fn test_ingest_then_query() {
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path()).await;

    let content = "The borrow checker enforces aliasing rules at compile time.";
    let response = app
        .clone()
        .oneshot(post_json(
            "/documents",
            &json!({
                "filename": "borrowck.md",
                "content": content,
                "content_type": "text/markdown",
                "metadata": {"author": "ada"},
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The mock embedder maps identical text to identical vectors, so
    // querying the exact content scores at the top of the scale.
    let response = app
        .oneshot(post_json("/query", &json!({"query": content})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["title"], "borrowck.md");
    assert_eq!(results[0]["content"], content);
    assert!(results[0]["score"].as_f64().unwrap() > 0.99);
    assert_eq!(results[0]["metadata"]["source"], "borrowck.md");
    assert_eq!(results[0]["metadata"]["part"], 0);
    assert_eq!(results[0]["metadata"]["content_type"], "text/markdown");
    assert_eq!(results[0]["metadata"]["author"], "ada");
}

#[tokio::test]
async fn test_query_k_limits_results() {
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path()).await;

    for name in ["a.md", "b.md", "c.md", "d.md"] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/documents",
                &json!({"filename": name, "content": "shared paragraph in every document"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(post_json(
            "/query",
            &json!({
                "query": "shared paragraph in every document",
                "k": 2,
                "min_score": 0.5,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_blank_query_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(post_json("/query", &json!({"query": "   "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "query text must not be blank");
}

#[tokio::test]
async fn test_blank_filename_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(post_json(
            "/documents",
            &json!({"filename": "  ", "content": "hello"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "filename must not be blank");
}

#[tokio::test]
async fn test_upload_cap_is_enforced() {
    let dir = TempDir::new().unwrap();
    let remote: Arc<dyn ObjectStore> =
        Arc::new(MockObjectStore::new_with_config(MockStoreConfig::instant()));
    let app = build_router(state_over(dir.path(), remote, 64).await);

    let response = app
        .oneshot(post_json(
            "/documents",
            &json!({"filename": "big.md", "content": "x".repeat(65)}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("upload limit"));
}

#[tokio::test]
async fn test_backup_status_starts_pending() {
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path()).await;

    let response = app.oneshot(get_request("/backup/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert!(body["last_backup_time"].is_null());
    assert_eq!(body["backup_interval_seconds"], 3600);
    assert_eq!(body["pending"], true);
}

#[tokio::test]
async fn test_ingest_triggers_first_backup() {
    let dir = TempDir::new().unwrap();
    let app = test_app(dir.path()).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/documents",
            &json!({"filename": "seed.md", "content": "first document"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get_request("/backup/status")).await.unwrap();
    let body = json_body(response).await;
    assert!(body["last_backup_time"].is_string());
    assert_eq!(body["pending"], false);
}
