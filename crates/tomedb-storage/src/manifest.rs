//! Backup manifest and remote key layout.
//!
//! The manifest is the commit point of a backup generation: readers resolve
//! "current backup" exclusively through it, so partially uploaded files are
//! invisible until the manifest that names them is published.
//!
//! # Remote Layout
//!
//! ```text
//! <prefix>/manifest.json                    current manifest
//! <prefix>/<filename>                       current database files
//! <prefix>/history/<YYYYMMDD_HHMMSS>/<filename>   rotated generations
//! ```

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tomedb_core::CoreResult;

use crate::object_store::ObjectStore;

/// Manifest schema version written by this build
pub const MANIFEST_VERSION: &str = "1.0";

/// Commit record for one backup generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// When the backup was taken
    pub timestamp: DateTime<Utc>,
    /// Database file names included in this generation
    pub files: Vec<String>,
    /// Schema version of the manifest itself
    pub version: String,
}

impl BackupManifest {
    /// Create a manifest for the given backup time and file set
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, files: Vec<String>) -> Self {
        Self {
            timestamp,
            files,
            version: MANIFEST_VERSION.to_string(),
        }
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Fetch the current manifest from the store.
    ///
    /// Returns `None` when no manifest has ever been published, which is how
    /// a fresh remote is distinguished from a broken one.
    ///
    /// # Errors
    ///
    /// - `CoreError::StorageError` if the download fails
    /// - `CoreError::DeserializationError` if the manifest is corrupted
    pub async fn load(
        store: &dyn ObjectStore,
        layout: &RemoteLayout,
    ) -> CoreResult<Option<Self>> {
        match store.get(&layout.manifest_key()).await {
            Ok(data) => {
                let manifest = serde_json::from_slice(&data)?;
                Ok(Some(manifest))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Publish this manifest, committing the generation it describes.
    ///
    /// # Errors
    ///
    /// - `CoreError::StorageError` if the upload fails
    pub async fn persist(&self, store: &dyn ObjectStore, layout: &RemoteLayout) -> CoreResult<()> {
        let data = serde_json::to_vec_pretty(self)?;
        store.put(&layout.manifest_key(), Bytes::from(data)).await
    }
}

/// Key builder for one backup target under a shared bucket
#[derive(Debug, Clone)]
pub struct RemoteLayout {
    prefix: String,
}

impl RemoteLayout {
    /// Create a layout rooted at `prefix`. Trailing slashes are trimmed so
    /// keys never contain empty path segments.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the current manifest
    #[must_use]
    pub fn manifest_key(&self) -> String {
        format!("{}/manifest.json", self.prefix)
    }

    /// Key of a current database file
    #[must_use]
    pub fn file_key(&self, filename: &str) -> String {
        format!("{}/{}", self.prefix, filename)
    }

    /// Prefix under which rotated generations live
    #[must_use]
    pub fn history_prefix(&self) -> String {
        format!("{}/history", self.prefix)
    }

    /// Key of a file inside a rotated generation
    #[must_use]
    pub fn history_file_key(&self, label: &str, filename: &str) -> String {
        format!("{}/history/{}/{}", self.prefix, label, filename)
    }

    /// Split a history key into its generation label and file name.
    ///
    /// Returns `None` for keys outside `<prefix>/history/`.
    pub fn split_history_key<'a>(&self, key: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = key.strip_prefix(self.history_prefix().as_str())?;
        let rest = rest.strip_prefix('/')?;
        let (label, filename) = rest.split_once('/')?;
        if label.is_empty() || filename.is_empty() {
            return None;
        }
        Some((label, filename))
    }

    /// Generation label for a backup time. Second precision, and
    /// lexicographic order on labels matches chronological order.
    #[must_use]
    pub fn timestamp_label(timestamp: &DateTime<Utc>) -> String {
        timestamp.format("%Y%m%d_%H%M%S").to_string()
    }
}

/// Path of the local manifest copy kept beside the database directory.
///
/// The copy sits next to the directory rather than inside it, so it is never
/// itself part of a backup and a restore into an empty directory recreates
/// exactly the files the manifest names.
#[must_use]
pub fn local_manifest_path(db_dir: &Path) -> PathBuf {
    // Normalize first: a trailing separator would land the file inside the
    // directory instead of beside it.
    let normalized: PathBuf = db_dir.components().collect();
    let mut path = normalized.into_os_string();
    path.push(".manifest.json");
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::{MockObjectStore, MockStoreConfig};
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_manifest_json_shape() {
        let manifest = BackupManifest::new(
            fixed_time(),
            vec!["index.json".to_string(), "documents.json".to_string()],
        );

        let value: serde_json::Value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["files"][0], "index.json");
        assert_eq!(value["files"][1], "documents.json");
        assert!(value["timestamp"].as_str().unwrap().starts_with("2025-01-01T12:00:00"));
    }

    #[test]
    fn test_layout_keys() {
        let layout = RemoteLayout::new("tomedb");

        assert_eq!(layout.manifest_key(), "tomedb/manifest.json");
        assert_eq!(layout.file_key("index.json"), "tomedb/index.json");
        assert_eq!(layout.history_prefix(), "tomedb/history");
        assert_eq!(
            layout.history_file_key("20250101_120000", "index.json"),
            "tomedb/history/20250101_120000/index.json"
        );
    }

    #[test]
    fn test_layout_trims_trailing_slash() {
        let layout = RemoteLayout::new("backups/prod/");
        assert_eq!(layout.manifest_key(), "backups/prod/manifest.json");
    }

    #[test]
    fn test_split_history_key() {
        let layout = RemoteLayout::new("tomedb");

        let (label, filename) = layout
            .split_history_key("tomedb/history/20250101_120000/index.json")
            .unwrap();
        assert_eq!(label, "20250101_120000");
        assert_eq!(filename, "index.json");

        // Nested file names keep everything after the label
        let (_, filename) = layout
            .split_history_key("tomedb/history/20250101_120000/sub/part.json")
            .unwrap();
        assert_eq!(filename, "sub/part.json");

        assert!(layout.split_history_key("tomedb/manifest.json").is_none());
        assert!(layout.split_history_key("other/history/20250101_120000/x").is_none());
        assert!(layout.split_history_key("tomedb/history/20250101_120000").is_none());
    }

    #[test]
    fn test_timestamp_label_ordering() {
        let earlier = RemoteLayout::timestamp_label(&fixed_time());
        let later = RemoteLayout::timestamp_label(
            &Utc.with_ymd_and_hms(2025, 1, 2, 9, 30, 5).unwrap(),
        );

        assert_eq!(earlier, "20250101_120000");
        assert_eq!(later, "20250102_093005");
        assert!(earlier < later);
    }

    #[test]
    fn test_local_manifest_path_is_sibling() {
        let path = local_manifest_path(Path::new("/data/tomedb"));
        assert_eq!(path, PathBuf::from("/data/tomedb.manifest.json"));

        // Dotted directory names keep their full name
        let path = local_manifest_path(Path::new("/data/tome.db"));
        assert_eq!(path, PathBuf::from("/data/tome.db.manifest.json"));

        // Trailing separator must not move the copy inside the directory
        let path = local_manifest_path(Path::new("/data/tomedb/"));
        assert_eq!(path, PathBuf::from("/data/tomedb.manifest.json"));
    }

    #[tokio::test]
    async fn test_load_absent_manifest_is_none() {
        let store = MockObjectStore::new_with_config(MockStoreConfig::instant());
        let layout = RemoteLayout::new("tomedb");

        let loaded = BackupManifest::load(&store, &layout).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let store = MockObjectStore::new_with_config(MockStoreConfig::instant());
        let layout = RemoteLayout::new("tomedb");

        let manifest = BackupManifest::new(fixed_time(), vec!["index.json".to_string()]);
        manifest.persist(&store, &layout).await.unwrap();

        assert!(store.contains_key("tomedb/manifest.json"));

        let loaded = BackupManifest::load(&store, &layout).await.unwrap().unwrap();
        assert_eq!(loaded, manifest);
    }
}
