//! Local filesystem implementation of ObjectStore
//!
//! Stores objects as files under a base directory, with the key as the
//! relative path. Used by tests and by air-gapped deployments that back up
//! to a mounted directory instead of S3.

use super::{ObjectMetadata, ObjectStore};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tomedb_core::{CoreError, CoreResult};

/// Local filesystem object store
///
/// Keys are treated as relative paths within the base directory, so the
/// backup layout (`tomedb/<file>`, `tomedb/history/<ts>/<file>`) maps onto
/// plain directories and can be inspected with ordinary shell tools.
pub struct LocalObjectStore {
    base_dir: PathBuf,
}

impl LocalObjectStore {
    /// Create a new local object store
    ///
    /// Creates the base directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::IoError` if directory creation fails
    pub async fn new(base_dir: impl AsRef<Path>) -> CoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir })
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    fn path_to_key(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.base_dir)
            .ok()
            .and_then(|p| p.to_str())
            .map(|s| s.to_string())
    }

    /// Recursively collect all file paths under a directory
    fn collect_files<'a>(
        &'a self,
        dir: &'a Path,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = CoreResult<Vec<PathBuf>>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut results = Vec::new();

            let mut read_dir = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;

                if metadata.is_file() {
                    results.push(path);
                } else if metadata.is_dir() {
                    let mut nested = self.collect_files(&path).await?;
                    results.append(&mut nested);
                }
            }

            Ok(results)
        })
    }
}

/// Convert a filesystem modification time to UTC, falling back to now when
/// the platform cannot report one.
fn modified_at(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .ok()
        .and_then(|t| {
            t.duration_since(UNIX_EPOCH)
                .ok()
                .and_then(|d| DateTime::from_timestamp(d.as_secs() as i64, 0))
        })
        .unwrap_or_else(Utc::now)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> CoreResult<()> {
        if key.is_empty() {
            return Err(CoreError::ValidationError(
                "Key cannot be empty".to_string(),
            ));
        }

        let path = self.full_path(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, &data).await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> CoreResult<Bytes> {
        let path = self.full_path(key);

        let data = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::not_found("object", key)
            } else {
                CoreError::from(e)
            }
        })?;

        Ok(Bytes::from(data))
    }

    async fn exists(&self, key: &str) -> CoreResult<bool> {
        let path = self.full_path(key);
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        let path = self.full_path(key);

        // Idempotent: absent files are not an error
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::remove_file(&path).await?;
        }

        Ok(())
    }

    async fn list(&self, prefix: &str) -> CoreResult<Vec<ObjectMetadata>> {
        let prefix_path = self.full_path(prefix);

        if !tokio::fs::try_exists(&prefix_path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let prefix_meta = tokio::fs::metadata(&prefix_path).await?;

        let files = if prefix_meta.is_file() {
            vec![prefix_path]
        } else if prefix_meta.is_dir() {
            self.collect_files(&prefix_path).await?
        } else {
            vec![]
        };

        let mut results = Vec::new();
        for path in files {
            if let Ok(metadata) = tokio::fs::metadata(&path).await {
                if let Some(key) = self.path_to_key(&path) {
                    results.push(ObjectMetadata {
                        key,
                        size_bytes: metadata.len(),
                        last_modified: modified_at(&metadata),
                        etag: None,
                    });
                }
            }
        }

        Ok(results)
    }

    async fn head(&self, key: &str) -> CoreResult<ObjectMetadata> {
        let path = self.full_path(key);

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::not_found("object", key)
            } else {
                CoreError::from(e)
            }
        })?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size_bytes: metadata.len(),
            last_modified: modified_at(&metadata),
            etag: None,
        })
    }
}
