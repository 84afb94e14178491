//! Mock ObjectStore for testing
//!
//! In-memory store with configurable failure patterns, used to exercise the
//! persistence coordinator's abort paths (failed uploads must leave the
//! published manifest and scheduling state untouched) without a real
//! S3/MinIO dependency.
//!
//! # Features
//!
//! - **Deterministic failures**: pre-defined failure sequences
//! - **Random failures**: configurable failure rate
//! - **Call history**: track all operations for assertions
//! - **Latency simulation**: realistic network delays
//!
//! # Examples
//!
//! ```rust
//! use tomedb_storage::object_store::{MockObjectStore, MockFailure, ObjectStore};
//! use bytes::Bytes;
//!
//! # async fn example() -> tomedb_core::CoreResult<()> {
//! let mock = MockObjectStore::new_with_failures(vec![
//!     MockFailure::Transient("500 Internal Server Error"),
//!     MockFailure::Ok,
//! ]);
//!
//! // First put fails, second succeeds
//! assert!(mock.put("key1", Bytes::from("data1")).await.is_err());
//! assert!(mock.put("key2", Bytes::from("data2")).await.is_ok());
//!
//! assert_eq!(mock.failed_puts(), 1);
//! assert_eq!(mock.successful_puts(), 1);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ObjectMetadata, ObjectStore};
use tomedb_core::{CoreError, CoreResult};

/// Mock failure pattern.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Transient error (retry-able). Examples: 500, 503, 504, timeout.
    Transient(&'static str),

    /// Permanent error. Examples: 403, 400.
    Permanent(&'static str),

    /// Success (no error).
    Ok,
}

impl MockFailure {
    fn to_error(&self) -> Option<CoreError> {
        match self {
            MockFailure::Transient(msg) => {
                Some(CoreError::StorageError(format!("Transient: {}", msg)))
            }
            MockFailure::Permanent(msg) => {
                Some(CoreError::StorageError(format!("Permanent: {}", msg)))
            }
            MockFailure::Ok => None,
        }
    }
}

/// Mock store configuration.
#[derive(Debug, Clone)]
pub struct MockStoreConfig {
    /// Simulated network latency (realistic S3 latency is ~10-50ms).
    pub latency: Duration,

    /// Enable call history tracking.
    pub track_history: bool,
}

impl Default for MockStoreConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(10),
            track_history: true,
        }
    }
}

impl MockStoreConfig {
    /// Config with no simulated latency, for tests that issue many calls.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            latency: Duration::ZERO,
            track_history: true,
        }
    }
}

/// Record of one store call, for assertions.
#[derive(Debug, Clone)]
pub struct CallHistoryEntry {
    /// Operation type: "put", "get", "delete", "list", "head".
    pub operation: String,

    /// Object key (empty for list).
    pub key: String,

    /// Whether the operation succeeded.
    pub success: bool,

    /// Timestamp of the operation.
    pub timestamp: Instant,
}

/// In-memory ObjectStore with scripted failures.
pub struct MockObjectStore {
    /// In-memory storage (simulates a bucket).
    storage: Arc<RwLock<HashMap<String, Bytes>>>,

    /// Failure pattern queue, consumed one entry per operation.
    failure_queue: Arc<RwLock<VecDeque<MockFailure>>>,

    config: MockStoreConfig,

    call_history: Arc<RwLock<Vec<CallHistoryEntry>>>,
}

impl MockObjectStore {
    /// Create a mock store with default config and no failures.
    pub fn new() -> Self {
        Self::new_with_config(MockStoreConfig::default())
    }

    /// Create a mock store with custom config.
    pub fn new_with_config(config: MockStoreConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            failure_queue: Arc::new(RwLock::new(VecDeque::new())),
            config,
            call_history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create a mock store with a deterministic failure pattern.
    ///
    /// Failures are consumed in order, one per operation. Once the queue is
    /// empty, all operations succeed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tomedb_storage::object_store::{MockObjectStore, MockFailure};
    ///
    /// // First operation succeeds, second fails, rest succeed
    /// let mock = MockObjectStore::new_with_failures(vec![
    ///     MockFailure::Ok,
    ///     MockFailure::Transient("503 Service Unavailable"),
    /// ]);
    /// ```
    pub fn new_with_failures(pattern: Vec<MockFailure>) -> Self {
        let mut mock = Self::new_with_config(MockStoreConfig::instant());
        mock.failure_queue = Arc::new(RwLock::new(pattern.into()));
        mock
    }

    /// Create a mock store where every operation fails with the given error.
    ///
    /// Pre-fills the failure queue with 1000 identical errors.
    pub fn new_always_fail(error: &'static str, is_transient: bool) -> Self {
        let failure = if is_transient {
            MockFailure::Transient(error)
        } else {
            MockFailure::Permanent(error)
        };

        Self::new_with_failures(vec![failure; 1000])
    }

    /// Create a mock store with intermittent failures (flaky network).
    ///
    /// Generates a random sequence of 100 outcomes based on `failure_rate`
    /// (0.0-1.0).
    pub fn new_flaky(failure_rate: f64) -> Self {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let mut pattern = Vec::new();

        for _ in 0..100 {
            if rng.gen::<f64>() < failure_rate {
                pattern.push(MockFailure::Transient("timeout"));
            } else {
                pattern.push(MockFailure::Ok);
            }
        }

        Self::new_with_failures(pattern)
    }

    /// Queue additional failures to apply to upcoming operations.
    pub fn push_failures(&self, pattern: Vec<MockFailure>) {
        self.failure_queue.write().extend(pattern);
    }

    /// Get call history for assertions.
    pub fn get_call_history(&self) -> Vec<CallHistoryEntry> {
        self.call_history.read().clone()
    }

    /// Clear call history.
    pub fn clear_history(&self) {
        self.call_history.write().clear();
    }

    /// Number of successful puts.
    pub fn successful_puts(&self) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == "put" && entry.success)
            .count()
    }

    /// Number of failed puts.
    pub fn failed_puts(&self) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == "put" && !entry.success)
            .count()
    }

    /// Number of stored objects.
    pub fn storage_size(&self) -> usize {
        self.storage.read().len()
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.storage.read().contains_key(key)
    }

    /// All stored keys, sorted.
    pub fn object_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.storage.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Reset storage and history.
    pub fn reset(&self) {
        self.storage.write().clear();
        self.call_history.write().clear();
    }

    fn check_failure(&self) -> Option<CoreError> {
        let mut queue = self.failure_queue.write();
        match queue.pop_front() {
            Some(failure) => failure.to_error(),
            // Empty queue defaults to success
            None => None,
        }
    }

    fn record_call(&self, operation: &str, key: &str, success: bool) {
        if self.config.track_history {
            self.call_history.write().push(CallHistoryEntry {
                operation: operation.to_string(),
                key: key.to_string(),
                success,
                timestamp: Instant::now(),
            });
        }
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Content hash standing in for an S3 entity tag.
fn content_etag(data: &Bytes) -> String {
    let digest = Sha256::digest(data.as_ref());
    let mut etag = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(etag, "{byte:02x}");
    }
    etag
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> CoreResult<()> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.check_failure() {
            self.record_call("put", key, false);
            return Err(error);
        }

        self.storage.write().insert(key.to_string(), data);
        self.record_call("put", key, true);

        Ok(())
    }

    async fn get(&self, key: &str) -> CoreResult<Bytes> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.check_failure() {
            self.record_call("get", key, false);
            return Err(error);
        }

        match self.storage.read().get(key).cloned() {
            Some(data) => {
                self.record_call("get", key, true);
                Ok(data)
            }
            None => {
                self.record_call("get", key, false);
                Err(CoreError::not_found("object", key))
            }
        }
    }

    async fn exists(&self, key: &str) -> CoreResult<bool> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.check_failure() {
            return Err(error);
        }

        Ok(self.storage.read().contains_key(key))
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.check_failure() {
            self.record_call("delete", key, false);
            return Err(error);
        }

        // Idempotent
        self.storage.write().remove(key);
        self.record_call("delete", key, true);

        Ok(())
    }

    async fn list(&self, prefix: &str) -> CoreResult<Vec<ObjectMetadata>> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.check_failure() {
            self.record_call("list", prefix, false);
            return Err(error);
        }

        let storage = self.storage.read();
        let objects: Vec<ObjectMetadata> = storage
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| ObjectMetadata {
                key: k.clone(),
                size_bytes: v.len() as u64,
                last_modified: Utc::now(),
                etag: Some(content_etag(v)),
            })
            .collect();
        self.record_call("list", prefix, true);

        Ok(objects)
    }

    async fn head(&self, key: &str) -> CoreResult<ObjectMetadata> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.check_failure() {
            self.record_call("head", key, false);
            return Err(error);
        }

        match self.storage.read().get(key) {
            Some(data) => {
                self.record_call("head", key, true);
                Ok(ObjectMetadata {
                    key: key.to_string(),
                    size_bytes: data.len() as u64,
                    last_modified: Utc::now(),
                    etag: Some(content_etag(data)),
                })
            }
            None => {
                self.record_call("head", key, false);
                Err(CoreError::not_found("object", key))
            }
        }
    }
}
