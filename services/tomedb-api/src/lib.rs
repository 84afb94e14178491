pub mod config;
pub mod handlers;
pub mod logging;
pub mod rest;
pub mod state;

pub use config::{Config, ConfigError};
pub use logging::init_tracing;
pub use rest::build_router;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use tomedb_core::{CoreError, CoreResult};
use tomedb_embedding::{
    EmbeddingProvider, MockEmbeddingProvider, OpenAiConfig, OpenAiEmbeddingProvider,
};
use tomedb_storage::{
    BackupPolicy, LocalObjectStore, MockObjectStore, ObjectStore, PersistenceCoordinator,
    RemoteLayout, S3Config, S3ObjectStore,
};
use tomedb_vector::{ChunkConfig, VectorStore};

/// Boots the TomeDB API server and blocks until shutdown.
pub async fn run_server(config: Config) -> CoreResult<()> {
    let store = build_object_store(&config).await?;

    let layout = RemoteLayout::new(config.backup.prefix.clone());
    let policy = BackupPolicy {
        interval: chrono::Duration::seconds(config.backup.interval_seconds as i64),
        history_keep: config.backup.history_keep,
    };
    let coordinator = Arc::new(PersistenceCoordinator::new(
        store,
        layout,
        config.database.dir.clone(),
        policy,
    ));

    // Reconcile the local directory with the latest remote backup before
    // the index opens it. The coordinator logs the outcome; only the
    // failure path needs handling here.
    if config.backup.enabled && config.database.restore_on_start {
        if let Err(err) = coordinator.restore_on_start().await {
            if config.database.strict_restore {
                return Err(CoreError::internal(format!(
                    "startup restore failed: {err}"
                )));
            }
            warn!(error = %err, "Startup restore failed, serving existing local data");
        }
    } else {
        info!("Startup restore disabled, serving existing local data");
    }

    let embedder: Arc<dyn EmbeddingProvider> = if config.embedding.provider == "mock" {
        info!(
            dimension = config.embedding.dimension,
            "Using mock embedding provider"
        );
        Arc::new(MockEmbeddingProvider::with_dimension(
            config.embedding.dimension,
        ))
    } else {
        info!(
            "Initializing embedding provider: base_url={}, model={}",
            config.embedding.base_url, config.embedding.model
        );
        let provider = OpenAiEmbeddingProvider::new(OpenAiConfig {
            base_url: config.embedding.base_url.clone(),
            api_key: config.embedding.api_key.clone(),
            model: config.embedding.model.clone(),
            dimension: config.embedding.dimension,
            timeout_secs: config.embedding.timeout_seconds,
        })
        .map_err(|e| {
            CoreError::EmbeddingError(format!("failed to initialize embedding provider: {e}"))
        })?;
        Arc::new(provider)
    };

    let store = VectorStore::open(
        &config.database.dir,
        embedder,
        coordinator.clone(),
        ChunkConfig {
            max_chars: config.chunking.max_chars,
            overlap: config.chunking.overlap,
        },
    )
    .await?;

    info!(
        documents = store.document_count(),
        chunks = store.chunk_count(),
        "Vector store opened"
    );

    let state = AppState::new(
        Arc::new(store),
        coordinator,
        config.server.max_upload_bytes,
    );
    let app = rest::build_router(state);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        CoreError::ValidationError(format!("invalid bind address '{bind_address}': {e}"))
    })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| CoreError::internal(format!("failed to bind to {addr}: {e}")))?;

    info!("Starting TomeDB API server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CoreError::internal(format!("server error: {e}")))?;

    info!("TomeDB API server shutdown complete");
    Ok(())
}

async fn build_object_store(config: &Config) -> CoreResult<Arc<dyn ObjectStore>> {
    match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory object store");
            Ok(Arc::new(MockObjectStore::new()))
        }
        "local" => {
            info!(
                dir = %config.storage.local_dir,
                "Using filesystem object store"
            );
            Ok(Arc::new(
                LocalObjectStore::new(&config.storage.local_dir).await?,
            ))
        }
        _ => {
            let s3 = &config.storage.s3;
            info!(
                "Initializing S3 object store: endpoint={}, bucket={}, region={}",
                s3.endpoint, s3.bucket, s3.region
            );
            let store = S3ObjectStore::new(&S3Config {
                endpoint: s3.endpoint.clone(),
                region: s3.region.clone(),
                access_key: s3.access_key.clone(),
                secret_key: s3.secret_key.clone(),
                bucket: s3.bucket.clone(),
                ..Default::default()
            })?;
            Ok(Arc::new(store))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, initiating graceful shutdown");
        }
    }
}
