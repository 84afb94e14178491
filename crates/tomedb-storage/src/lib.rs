//! Backup, restore, and persistence coordination for TomeDB.

pub mod coordinator;
pub mod manifest;
pub mod object_store;
pub mod rotation;

pub use coordinator::{
    backup_pending, BackupOutcome, BackupPolicy, BackupReport, BackupStatus,
    PersistenceCoordinator, RestoreOutcome, RestoreReport, StartupRestore,
};
pub use manifest::{local_manifest_path, BackupManifest, RemoteLayout, MANIFEST_VERSION};
pub use object_store::{
    LocalObjectStore, MockFailure, MockObjectStore, MockStoreConfig, ObjectMetadata, ObjectStore,
    RetryConfig, S3Config, S3ObjectStore,
};
pub use rotation::{CleanupReport, HistoryEntry, RotationReport};
