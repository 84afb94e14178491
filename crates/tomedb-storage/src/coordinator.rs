//! Persistence coordination between the local database directory and the
//! remote object store.
//!
//! The coordinator owns backup scheduling, backup/restore execution, and
//! history rotation. Backups are manifest-committed: every database file is
//! uploaded to the current location and to a fresh history generation first,
//! and only then is the manifest published. A crash before publication
//! leaves the previous manifest (and therefore the previous backup) fully
//! intact.
//!
//! ```text
//! <db_dir>/*  ──upload──▶  <prefix>/<file>
//!                          <prefix>/history/<label>/<file>
//!                          <prefix>/manifest.json   (commit point)
//! ```
//!
//! Scheduling is opportunistic: there is no timer thread, callers invoke
//! [`PersistenceCoordinator::maybe_backup`] on their mutating path and the
//! coordinator decides whether the interval has elapsed.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tomedb_storage::coordinator::{BackupPolicy, PersistenceCoordinator};
//! use tomedb_storage::manifest::RemoteLayout;
//! use tomedb_storage::object_store::{LocalObjectStore, ObjectStore};
//!
//! #[tokio::main]
//! async fn main() -> tomedb_core::CoreResult<()> {
//!     let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new("./remote").await?);
//!     let coordinator = PersistenceCoordinator::new(
//!         store,
//!         RemoteLayout::new("tomedb"),
//!         "./data/tomedb",
//!         BackupPolicy::default(),
//!     );
//!
//!     // Reconcile with the remote before the database is opened
//!     coordinator.restore_on_start().await?;
//!
//!     // Later, on every mutating operation
//!     coordinator.maybe_backup(chrono::Utc::now()).await?;
//!     Ok(())
//! }
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use tomedb_core::{CoreError, CoreResult};

use crate::manifest::{local_manifest_path, BackupManifest, RemoteLayout};
use crate::object_store::{ObjectMetadata, ObjectStore};
use crate::rotation::{self, CleanupReport, HistoryEntry, RotationReport};

/// Backup scheduling and retention policy
#[derive(Debug, Clone)]
pub struct BackupPolicy {
    /// Minimum gap between automatic backups
    pub interval: Duration,
    /// History generations retained after rotation
    pub history_keep: usize,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::seconds(3600),
            history_keep: 24,
        }
    }
}

/// Whether a backup is due at `now`.
///
/// Due when no backup has succeeded this process lifetime, or when the
/// interval has fully elapsed since the last one.
#[must_use]
pub fn backup_pending(
    now: DateTime<Utc>,
    last_backup_time: Option<DateTime<Utc>>,
    interval: Duration,
) -> bool {
    match last_backup_time {
        None => true,
        Some(last) => now - last >= interval,
    }
}

/// How startup reconciliation resolved local against remote state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupRestore {
    /// No remote manifest exists; the local directory was left untouched
    FreshInstall,
    /// Local data is at least as recent as the remote backup
    LocalUpToDate,
    /// Remote files were downloaded over the local directory
    Restored {
        files: usize,
        /// Timestamp of the manifest that was restored
        timestamp: DateTime<Utc>,
    },
}

/// Result of one completed backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// History generation label this backup created
    pub label: String,
    /// Files uploaded
    pub files: usize,
    /// Bytes uploaded to the current location
    pub bytes: u64,
}

/// Result of an opportunistic backup check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The interval has not elapsed, or a backup is already in flight
    NotDue,
    /// A backup ran to completion
    Completed(BackupReport),
}

/// Result of an operator-driven restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No remote manifest exists; there is nothing to restore
    NoRemoteBackup,
    /// Files were downloaded into the database directory
    Restored(RestoreReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Files written into the database directory
    pub files: usize,
    /// Where the pre-restore contents were copied, when a safety copy was made
    pub safety_copy: Option<PathBuf>,
    /// Whether the safety copy was skipped after a disk quota error
    pub quota_fallback: bool,
}

/// Scheduling state snapshot for the monitoring surface
#[derive(Debug, Clone, Serialize)]
pub struct BackupStatus {
    /// Most recent successful backup this process lifetime
    pub last_backup_time: Option<DateTime<Utc>>,
    /// Configured minimum gap between automatic backups
    pub backup_interval_seconds: i64,
    /// Interval elapsed but no upload has triggered a backup yet
    pub pending: bool,
}

#[derive(Debug, Default)]
struct SchedulerState {
    last_backup_time: Option<DateTime<Utc>>,
}

/// Run `operation(false)`, retrying once with `operation(true)` if the first
/// attempt hits a disk quota error. The flag tells the operation to skip
/// whatever local writes caused the quota failure. Returns the result and
/// whether the fallback path was taken.
async fn with_quota_fallback<F, Fut, T>(operation: F) -> CoreResult<(T, bool)>
where
    F: Fn(bool) -> Fut,
    Fut: std::future::Future<Output = CoreResult<T>>,
{
    match operation(false).await {
        Ok(value) => Ok((value, false)),
        Err(e) if e.is_disk_quota() => {
            warn!(
                "Disk quota exceeded, retrying without local safety copy: {}",
                e
            );
            let value = operation(true).await?;
            Ok((value, true))
        }
        Err(e) => Err(e),
    }
}

/// Coordinates backup, restore, and rotation for one database directory.
///
/// One instance per process. The scheduling check and backup execution are
/// serialized through a single-flight guard. Two processes sharing a prefix
/// can still both pass the interval check; a duplicate backup is wasteful
/// but harmless.
pub struct PersistenceCoordinator {
    store: Arc<dyn ObjectStore>,
    layout: RemoteLayout,
    db_dir: PathBuf,
    policy: BackupPolicy,
    state: Mutex<SchedulerState>,
    backup_flight: AsyncMutex<()>,
}

impl PersistenceCoordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        layout: RemoteLayout,
        db_dir: impl Into<PathBuf>,
        policy: BackupPolicy,
    ) -> Self {
        Self {
            store,
            layout,
            db_dir: db_dir.into(),
            policy,
            state: Mutex::new(SchedulerState::default()),
            backup_flight: AsyncMutex::new(()),
        }
    }

    #[must_use]
    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    #[must_use]
    pub fn policy(&self) -> &BackupPolicy {
        &self.policy
    }

    #[must_use]
    pub fn last_backup_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_backup_time
    }

    /// Scheduling state for the monitoring endpoint and CLI.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> BackupStatus {
        let last_backup_time = self.state.lock().last_backup_time;
        BackupStatus {
            last_backup_time,
            backup_interval_seconds: self.policy.interval.num_seconds(),
            pending: backup_pending(now, last_backup_time, self.policy.interval),
        }
    }

    /// Back up if the interval has elapsed since the last successful backup.
    ///
    /// A failed attempt leaves `last_backup_time` and the published manifest
    /// untouched, so the next qualifying call retries. When another backup
    /// is already in flight this returns [`BackupOutcome::NotDue`] without
    /// waiting for it.
    ///
    /// # Errors
    ///
    /// - `CoreError::InvalidState` if the database directory does not exist
    /// - `CoreError::StorageError` if an upload fails
    pub async fn maybe_backup(&self, now: DateTime<Utc>) -> CoreResult<BackupOutcome> {
        let Ok(_flight) = self.backup_flight.try_lock() else {
            debug!("Backup already in flight, skipping trigger");
            return Ok(BackupOutcome::NotDue);
        };

        let last_backup_time = self.state.lock().last_backup_time;
        if !backup_pending(now, last_backup_time, self.policy.interval) {
            return Ok(BackupOutcome::NotDue);
        }

        let report = self.run_backup(now).await?;
        self.state.lock().last_backup_time = Some(now);
        Ok(BackupOutcome::Completed(report))
    }

    /// Back up immediately, regardless of the interval.
    ///
    /// # Errors
    ///
    /// Same as [`PersistenceCoordinator::maybe_backup`].
    pub async fn backup_now(&self, now: DateTime<Utc>) -> CoreResult<BackupReport> {
        let _flight = self.backup_flight.lock().await;
        let report = self.run_backup(now).await?;
        self.state.lock().last_backup_time = Some(now);
        Ok(report)
    }

    /// Reconcile local state with the remote backup before the database is
    /// opened. Absent remote manifest means fresh install; a local backup
    /// timestamp at least as recent as the remote one means nothing to do;
    /// otherwise every manifest file is downloaded over the local directory.
    ///
    /// Restores are accretive: local files not named by the manifest are
    /// left in place.
    ///
    /// # Errors
    ///
    /// - `CoreError::StorageError` if the manifest or a file download fails;
    ///   the directory may be left mixed, which is safe only because this
    ///   runs before any reader opens the database
    pub async fn restore_on_start(&self) -> CoreResult<StartupRestore> {
        let Some(manifest) = BackupManifest::load(self.store.as_ref(), &self.layout).await? else {
            info!("No remote backup found, starting fresh");
            return Ok(StartupRestore::FreshInstall);
        };

        if let Some(local_time) = self.local_backup_time().await {
            if local_time >= manifest.timestamp {
                info!(
                    "Local database is up to date (local {}, remote {})",
                    local_time, manifest.timestamp
                );
                return Ok(StartupRestore::LocalUpToDate);
            }
        }

        let files = self.download_manifest_files(&manifest).await?;
        self.write_local_manifest(&manifest).await;
        info!(
            "Restored {} files from remote backup taken at {}",
            files, manifest.timestamp
        );
        Ok(StartupRestore::Restored {
            files,
            timestamp: manifest.timestamp,
        })
    }

    /// Operator-driven restore.
    ///
    /// Unless `skip_local_backup` is set, the current directory contents are
    /// first copied to a timestamped sibling directory as a safety net. A
    /// disk quota failure during that copy triggers one automatic retry with
    /// the safety copy disabled.
    ///
    /// # Errors
    ///
    /// - `CoreError::StorageError` if the manifest or a file download fails
    /// - `CoreError::QuotaExceeded` / quota-classified I/O errors if even the
    ///   fallback attempt runs out of space
    pub async fn restore(&self, skip_local_backup: bool) -> CoreResult<RestoreOutcome> {
        let Some(manifest) = BackupManifest::load(self.store.as_ref(), &self.layout).await? else {
            warn!("No remote backup available to restore");
            return Ok(RestoreOutcome::NoRemoteBackup);
        };

        let report = if skip_local_backup {
            self.restore_attempt(&manifest, true).await?
        } else {
            let (mut report, quota_fallback) =
                with_quota_fallback(|skip| self.restore_attempt(&manifest, skip)).await?;
            report.quota_fallback = quota_fallback;
            report
        };

        info!(
            "Restore complete: {} files from backup taken at {}",
            report.files, manifest.timestamp
        );
        Ok(RestoreOutcome::Restored(report))
    }

    /// Delete history generations beyond the policy's retention count.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::StorageError` if listing or a deletion fails.
    pub async fn rotate_history(&self) -> CoreResult<RotationReport> {
        rotation::rotate_history(self.store.as_ref(), &self.layout, self.policy.history_keep).await
    }

    /// Operator cleanup pass, see [`rotation::cleanup_history`].
    ///
    /// # Errors
    ///
    /// Returns `CoreError::StorageError` if listing or a deletion fails.
    pub async fn cleanup(
        &self,
        keep: usize,
        limit: usize,
        dry_run: bool,
    ) -> CoreResult<CleanupReport> {
        rotation::cleanup_history(self.store.as_ref(), &self.layout, keep, limit, dry_run).await
    }

    /// List objects in the current snapshot location, manifest included.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::StorageError` if the listing fails.
    pub async fn list_current(&self) -> CoreResult<Vec<ObjectMetadata>> {
        let history_prefix = format!("{}/", self.layout.history_prefix());
        let mut objects = self.store.list(self.layout.prefix()).await?;
        objects.retain(|object| !object.key.starts_with(&history_prefix));
        Ok(objects)
    }

    /// List retained history generations, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::StorageError` if the listing fails.
    pub async fn list_history(&self) -> CoreResult<Vec<HistoryEntry>> {
        rotation::list_history(self.store.as_ref(), &self.layout).await
    }

    /// Fetch the currently published manifest, if any.
    ///
    /// # Errors
    ///
    /// - `CoreError::StorageError` if the download fails
    /// - `CoreError::DeserializationError` if the manifest is corrupted
    pub async fn current_manifest(&self) -> CoreResult<Option<BackupManifest>> {
        BackupManifest::load(self.store.as_ref(), &self.layout).await
    }

    async fn run_backup(&self, now: DateTime<Utc>) -> CoreResult<BackupReport> {
        let files = self.local_database_files().await?;
        if files.is_empty() {
            warn!(
                "Database directory {} is empty, publishing empty backup manifest",
                self.db_dir.display()
            );
        }

        let label = RemoteLayout::timestamp_label(&now);
        let mut total_bytes = 0u64;

        for (filename, path) in &files {
            let data = Bytes::from(tokio::fs::read(path).await?);
            total_bytes += data.len() as u64;

            self.store
                .put(&self.layout.file_key(filename), data.clone())
                .await?;
            self.store
                .put(&self.layout.history_file_key(&label, filename), data)
                .await?;
            debug!("Uploaded {} to current and history {}", filename, label);
        }

        // All files are durable in both locations; publishing the manifest
        // commits the generation.
        let manifest =
            BackupManifest::new(now, files.iter().map(|(name, _)| name.clone()).collect());
        manifest.persist(self.store.as_ref(), &self.layout).await?;
        self.write_local_manifest(&manifest).await;

        // The backup is already committed; a rotation failure only delays
        // pruning until the next pass.
        if let Err(e) =
            rotation::rotate_history(self.store.as_ref(), &self.layout, self.policy.history_keep)
                .await
        {
            warn!("History rotation failed after backup {}: {}", label, e);
        }

        info!(
            "Backup {} complete: {} files, {} bytes",
            label,
            files.len(),
            total_bytes
        );

        Ok(BackupReport {
            label,
            files: files.len(),
            bytes: total_bytes,
        })
    }

    async fn restore_attempt(
        &self,
        manifest: &BackupManifest,
        skip_local_backup: bool,
    ) -> CoreResult<RestoreReport> {
        let safety_copy = if skip_local_backup {
            None
        } else {
            self.snapshot_local_dir().await?
        };

        let files = self.download_manifest_files(manifest).await?;
        self.write_local_manifest(manifest).await;

        Ok(RestoreReport {
            files,
            safety_copy,
            quota_fallback: false,
        })
    }

    /// Copy the current directory contents to a timestamped sibling before a
    /// restore overwrites them. Returns `None` when there is nothing to copy.
    async fn snapshot_local_dir(&self) -> CoreResult<Option<PathBuf>> {
        let files = match self.local_database_files().await {
            Ok(files) => files,
            Err(CoreError::InvalidState { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if files.is_empty() {
            return Ok(None);
        }

        let label = RemoteLayout::timestamp_label(&Utc::now());
        let normalized: PathBuf = self.db_dir.components().collect();
        let mut dest = normalized.into_os_string();
        dest.push(format!("_local_backup_{label}"));
        let dest = PathBuf::from(dest);

        tokio::fs::create_dir_all(&dest).await?;
        for (filename, path) in &files {
            tokio::fs::copy(path, dest.join(filename)).await?;
        }

        info!("Saved local safety copy to {}", dest.display());
        Ok(Some(dest))
    }

    /// Download every file the manifest names into the database directory.
    /// Files missing from the remote are skipped with a warning; any other
    /// download failure aborts the restore.
    async fn download_manifest_files(&self, manifest: &BackupManifest) -> CoreResult<usize> {
        tokio::fs::create_dir_all(&self.db_dir).await?;

        let mut written = 0;
        for filename in &manifest.files {
            // Manifest entries are plain file names; anything with path
            // separators would escape the database directory.
            if Path::new(filename).file_name() != Some(OsStr::new(filename.as_str())) {
                warn!("Skipping manifest entry with non-plain file name: {}", filename);
                continue;
            }

            match self.store.get(&self.layout.file_key(filename)).await {
                Ok(data) => {
                    tokio::fs::write(self.db_dir.join(filename), &data).await?;
                    debug!("Restored {} ({} bytes)", filename, data.len());
                    written += 1;
                }
                Err(e) if e.is_not_found() => {
                    warn!("Skipping file missing from remote backup: {}", filename);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(written)
    }

    /// Timestamp of the newest local backup state: the local manifest copy
    /// when present, otherwise the newest file modification time.
    async fn local_backup_time(&self) -> Option<DateTime<Utc>> {
        let path = local_manifest_path(&self.db_dir);
        match tokio::fs::read(&path).await {
            Ok(data) => match serde_json::from_slice::<BackupManifest>(&data) {
                Ok(manifest) => return Some(manifest.timestamp),
                Err(e) => warn!(
                    "Ignoring unreadable local manifest copy at {}: {}",
                    path.display(),
                    e
                ),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to read local manifest copy at {}: {}",
                path.display(),
                e
            ),
        }

        let files = self.local_database_files().await.ok()?;
        let mut newest: Option<DateTime<Utc>> = None;
        for (_, file_path) in &files {
            let Ok(metadata) = tokio::fs::metadata(file_path).await else {
                continue;
            };
            if let Ok(modified) = metadata.modified() {
                let modified = DateTime::<Utc>::from(modified);
                newest = Some(newest.map_or(modified, |current| current.max(modified)));
            }
        }

        if let Some(time) = newest {
            debug!("Using newest file modification time {} as local backup time", time);
        }
        newest
    }

    /// Keep a local copy of the manifest beside the database directory so
    /// the next startup can compare timestamps without guessing from file
    /// modification times. Best effort: failure never fails the backup.
    async fn write_local_manifest(&self, manifest: &BackupManifest) {
        let path = local_manifest_path(&self.db_dir);
        let result: CoreResult<()> = async {
            let data = serde_json::to_vec_pretty(manifest)?;
            tokio::fs::write(&path, data).await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            warn!(
                "Failed to write local manifest copy at {}: {}",
                path.display(),
                e
            );
        }
    }

    async fn local_database_files(&self) -> CoreResult<Vec<(String, PathBuf)>> {
        let mut dir = tokio::fs::read_dir(&self.db_dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::invalid_state(format!(
                    "Database directory {} does not exist",
                    self.db_dir.display()
                ))
            } else {
                CoreError::from(e)
            }
        })?;

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                debug!("Skipping non-file entry {}", entry.path().display());
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => files.push((name, entry.path())),
                Err(_) => warn!(
                    "Skipping file with non-UTF-8 name in {}",
                    self.db_dir.display()
                ),
            }
        }

        // Deterministic manifest order
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}
