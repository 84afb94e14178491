//! S3-compatible implementation of ObjectStore with retry logic and circuit breaker.
//!
//! Talks to AWS S3 or any S3-compatible endpoint (MinIO) through the
//! `object_store` crate. Every operation runs through exponential-backoff
//! retry with jitter; a circuit breaker sheds load once the endpoint has
//! failed repeatedly, so a dead remote cannot stall every backup-triggering
//! request for the full retry budget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{
    ClientOptions, Error as ObjectStoreError, ObjectStore as RemoteClient, PutPayload,
};
use parking_lot::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{ObjectMetadata, ObjectStore};
use tomedb_core::{CoreError, CoreResult};

/// S3 connection configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint URL. Empty for AWS S3, "http://localhost:9000" for MinIO.
    pub endpoint: String,
    /// AWS region
    pub region: String,
    /// Access key ID
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
    /// Bucket name
    pub bucket: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Retry configuration
    pub retry_config: RetryConfig,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            timeout_secs: 30,
            retry_config: RetryConfig::default(),
        }
    }
}

/// Retry configuration for S3 operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Backoff factor (exponential)
    pub backoff_factor: f64,
    /// Jitter percentage (0.0 - 1.0)
    pub jitter_percent: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 3200,
            backoff_factor: 2.0,
            jitter_percent: 0.2,
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected without hitting the network
    Open,
    /// Probing whether the endpoint recovered
    HalfOpen,
}

/// Circuit breaker guarding the remote endpoint
#[derive(Debug)]
struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_count: RwLock<u32>,
    last_failure_time: RwLock<Option<Instant>>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: RwLock::new(0),
            last_failure_time: RwLock::new(None),
            failure_threshold,
            recovery_timeout,
        }
    }

    fn is_open(&self) -> bool {
        let state = *self.state.read();

        if state == CircuitState::Open {
            if let Some(last_failure) = *self.last_failure_time.read() {
                if last_failure.elapsed() >= self.recovery_timeout {
                    *self.state.write() = CircuitState::HalfOpen;
                    info!("Circuit breaker transitioning to half-open state");
                    return false;
                }
            }
            return true;
        }

        false
    }

    fn record_success(&self) {
        let mut state = self.state.write();
        let mut failure_count = self.failure_count.write();

        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Closed;
                *failure_count = 0;
                info!("Circuit breaker closed after successful recovery");
            }
            CircuitState::Closed => {
                *failure_count = 0;
            }
            CircuitState::Open => {
                // Success while open should not happen; reset anyway
                *state = CircuitState::Closed;
                *failure_count = 0;
            }
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.write();
        let mut failure_count = self.failure_count.write();
        let mut last_failure_time = self.last_failure_time.write();

        *failure_count += 1;
        *last_failure_time = Some(Instant::now());

        match *state {
            CircuitState::Closed => {
                if *failure_count >= self.failure_threshold {
                    *state = CircuitState::Open;
                    warn!(
                        "Circuit breaker opened after {} consecutive failures",
                        self.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                warn!("Circuit breaker re-opened after failure in half-open state");
            }
            CircuitState::Open => {}
        }
    }
}

/// Errors worth retrying. Absence of an object and rejected input will not
/// change on a second attempt.
fn is_retryable(error: &CoreError) -> bool {
    !matches!(
        error,
        CoreError::NotFound { .. } | CoreError::ValidationError(_)
    )
}

/// S3-compatible object store
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Arc<dyn RemoteClient>,
    retry_config: RetryConfig,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl S3ObjectStore {
    /// Create a store talking to the configured bucket.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::StorageError` when the client cannot be built
    /// (e.g. malformed endpoint URL).
    pub fn new(config: &S3Config) -> CoreResult<Self> {
        let client_options =
            ClientOptions::new().with_timeout(Duration::from_secs(config.timeout_secs));

        let mut builder = AmazonS3Builder::new()
            .with_region(&config.region)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key)
            .with_client_options(client_options);

        if !config.endpoint.is_empty() {
            builder = builder.with_endpoint(&config.endpoint);
            // MinIO and other local endpoints speak plain HTTP
            if config.endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
        }

        let client = builder
            .build()
            .map_err(|e| CoreError::StorageError(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self::from_client(Arc::new(client), config.retry_config.clone()))
    }

    fn from_client(client: Arc<dyn RemoteClient>, retry_config: RetryConfig) -> Self {
        let circuit_breaker = Arc::new(CircuitBreaker::new(
            5,                       // consecutive failures to open
            Duration::from_secs(30), // recovery timeout
        ));

        Self {
            client,
            retry_config,
            circuit_breaker,
        }
    }

    #[cfg(test)]
    fn new_with_client(client: Arc<dyn RemoteClient>, retry_config: RetryConfig) -> Self {
        Self::from_client(client, retry_config)
    }

    /// Execute an operation with backoff, jitter, and circuit breaking.
    async fn retry_with_backoff<F, Fut, T>(&self, operation: F) -> CoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = CoreResult<T>>,
    {
        if self.circuit_breaker.is_open() {
            return Err(CoreError::StorageError(
                "Circuit breaker is open, rejecting request".to_string(),
            ));
        }

        let mut attempt = 0;
        let mut delay_ms = self.retry_config.initial_delay_ms;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => {
                    self.circuit_breaker.record_success();
                    return Ok(result);
                }
                Err(e) if !is_retryable(&e) => {
                    // Not a backend fault; leave the breaker alone
                    return Err(e);
                }
                Err(e) => {
                    if attempt >= self.retry_config.max_attempts {
                        error!("Operation failed after {} attempts: {}", attempt, e);
                        self.circuit_breaker.record_failure();
                        return Err(e);
                    }

                    let jitter_range = (delay_ms as f64 * self.retry_config.jitter_percent) as u64;
                    let jitter = rand::random::<u64>() % (jitter_range + 1);
                    let actual_delay = delay_ms + jitter;

                    warn!(
                        "Operation failed (attempt {}/{}), retrying after {}ms: {}",
                        attempt, self.retry_config.max_attempts, actual_delay, e
                    );

                    sleep(Duration::from_millis(actual_delay)).await;

                    delay_ms = ((delay_ms as f64 * self.retry_config.backoff_factor) as u64)
                        .min(self.retry_config.max_delay_ms);
                }
            }
        }
    }
}

fn meta_to_object_metadata(meta: &object_store::ObjectMeta) -> ObjectMetadata {
    ObjectMetadata {
        key: meta.location.to_string(),
        size_bytes: meta.size as u64,
        last_modified: meta.last_modified,
        etag: meta.e_tag.clone(),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> CoreResult<()> {
        if key.is_empty() {
            return Err(CoreError::ValidationError(
                "Key cannot be empty".to_string(),
            ));
        }

        let path = ObjectPath::from(key);
        let size = data.len();

        self.retry_with_backoff(|| {
            let data = data.clone();
            let path = path.clone();

            async move {
                self.client
                    .put(&path, PutPayload::from_bytes(data))
                    .await
                    .map_err(|e| {
                        CoreError::StorageError(format!("Failed to put object {}: {}", key, e))
                    })?;

                debug!("Uploaded object {} ({} bytes)", key, size);
                Ok(())
            }
        })
        .await
    }

    async fn get(&self, key: &str) -> CoreResult<Bytes> {
        let path = ObjectPath::from(key);

        self.retry_with_backoff(|| {
            let path = path.clone();

            async move {
                let result = match self.client.get(&path).await {
                    Ok(reader) => reader,
                    Err(ObjectStoreError::NotFound { .. }) => {
                        return Err(CoreError::not_found("object", key));
                    }
                    Err(e) => {
                        return Err(CoreError::StorageError(format!(
                            "Failed to get object {}: {}",
                            key, e
                        )));
                    }
                };

                let bytes = result.bytes().await.map_err(|e| {
                    CoreError::StorageError(format!("Failed to read object bytes: {}", e))
                })?;

                debug!("Retrieved object {} ({} bytes)", key, bytes.len());
                Ok(bytes)
            }
        })
        .await
    }

    async fn exists(&self, key: &str) -> CoreResult<bool> {
        let path = ObjectPath::from(key);

        self.retry_with_backoff(|| {
            let path = path.clone();

            async move {
                match self.client.head(&path).await {
                    Ok(_) => Ok(true),
                    Err(ObjectStoreError::NotFound { .. }) => Ok(false),
                    Err(e) => Err(CoreError::StorageError(format!(
                        "Failed to query object metadata for {}: {}",
                        key, e
                    ))),
                }
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        let path = ObjectPath::from(key);

        self.retry_with_backoff(|| {
            let path = path.clone();

            async move {
                match self.client.delete(&path).await {
                    // Idempotent: deleting an absent object is fine
                    Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {
                        debug!("Deleted object {}", key);
                        Ok(())
                    }
                    Err(e) => Err(CoreError::StorageError(format!(
                        "Failed to delete object {}: {}",
                        key, e
                    ))),
                }
            }
        })
        .await
    }

    async fn list(&self, prefix: &str) -> CoreResult<Vec<ObjectMetadata>> {
        let path = if prefix.is_empty() {
            None
        } else {
            Some(ObjectPath::from(prefix))
        };

        self.retry_with_backoff(|| {
            let path = path.clone();

            async move {
                let mut objects = Vec::new();
                let list_result = self.client.list(path.as_ref());

                use futures::StreamExt;
                let mut stream = Box::pin(list_result);

                while let Some(result) = stream.next().await {
                    let meta = result.map_err(|e| {
                        CoreError::StorageError(format!("Failed to list objects: {}", e))
                    })?;
                    objects.push(meta_to_object_metadata(&meta));
                }

                debug!("Listed {} objects with prefix '{}'", objects.len(), prefix);
                Ok(objects)
            }
        })
        .await
    }

    async fn head(&self, key: &str) -> CoreResult<ObjectMetadata> {
        let path = ObjectPath::from(key);

        self.retry_with_backoff(|| {
            let path = path.clone();

            async move {
                match self.client.head(&path).await {
                    Ok(meta) => Ok(meta_to_object_metadata(&meta)),
                    Err(ObjectStoreError::NotFound { .. }) => {
                        Err(CoreError::not_found("object", key))
                    }
                    Err(e) => Err(CoreError::StorageError(format!(
                        "Failed to query object metadata for {}: {}",
                        key, e
                    ))),
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn test_store() -> S3ObjectStore {
        let client: Arc<dyn RemoteClient> = Arc::new(InMemory::new());
        S3ObjectStore::new_with_client(client, RetryConfig::default())
    }

    #[test]
    fn test_circuit_breaker_closed_to_open() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(10));

        assert_eq!(*cb.state.read(), CircuitState::Closed);
        assert!(!cb.is_open());

        cb.record_failure();
        assert!(!cb.is_open());

        cb.record_failure();
        assert!(!cb.is_open());

        cb.record_failure();
        assert!(cb.is_open());
        assert_eq!(*cb.state.read(), CircuitState::Open);
    }

    #[test]
    fn test_circuit_breaker_half_open_after_timeout() {
        let cb = CircuitBreaker::new(3, Duration::from_millis(50));

        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_open());

        std::thread::sleep(Duration::from_millis(60));

        assert!(!cb.is_open());
        assert_eq!(*cb.state.read(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_circuit_breaker_recovery() {
        let cb = CircuitBreaker::new(3, Duration::from_millis(50));

        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_open());

        std::thread::sleep(Duration::from_millis(60));
        assert!(!cb.is_open());

        cb.record_success();
        assert!(!cb.is_open());
        assert_eq!(*cb.state.read(), CircuitState::Closed);
        assert_eq!(*cb.failure_count.read(), 0);
    }

    #[test]
    fn test_s3_config_default() {
        let config = S3Config::default();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.retry_config.max_attempts, 5);
    }

    #[test]
    fn test_not_found_is_not_retryable() {
        assert!(!is_retryable(&CoreError::not_found("object", "missing")));
        assert!(!is_retryable(&CoreError::ValidationError("bad".into())));
        assert!(is_retryable(&CoreError::StorageError("timeout".into())));
    }

    #[tokio::test]
    async fn test_s3_store_round_trip() {
        let store = test_store();

        let data = Bytes::from("manifest contents");
        store.put("tomedb/manifest.json", data.clone()).await.unwrap();

        let retrieved = store.get("tomedb/manifest.json").await.unwrap();
        assert_eq!(retrieved, data);

        assert!(store.exists("tomedb/manifest.json").await.unwrap());
        assert!(!store.exists("tomedb/missing.json").await.unwrap());

        let metadata = store.head("tomedb/manifest.json").await.unwrap();
        assert_eq!(metadata.key, "tomedb/manifest.json");
        assert_eq!(metadata.size_bytes, data.len() as u64);

        store.delete("tomedb/manifest.json").await.unwrap();
        assert!(!store.exists("tomedb/manifest.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_s3_store_get_missing_maps_to_not_found() {
        let store = test_store();

        let result = store.get("tomedb/absent.json").await;
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_s3_store_delete_missing_is_idempotent() {
        let store = test_store();
        store.delete("tomedb/never-existed.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_s3_store_list_prefix() {
        let store = test_store();

        store.put("tomedb/index.json", Bytes::from("a")).await.unwrap();
        store
            .put("tomedb/history/20250101_120000/index.json", Bytes::from("b"))
            .await
            .unwrap();
        store.put("unrelated/key", Bytes::from("c")).await.unwrap();

        let history = store.list("tomedb/history").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].key, "tomedb/history/20250101_120000/index.json");

        let all = store.list("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_s3_store_put_rejects_empty_key() {
        let store = test_store();
        let result = store.put("", Bytes::from("data")).await;
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }
}
