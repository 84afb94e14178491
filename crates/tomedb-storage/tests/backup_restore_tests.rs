//! End-to-end backup/restore tests for the persistence coordinator
//!
//! Covered scenarios:
//! 1. Backup then restore into an empty directory is an exact round trip
//! 2. Interval gating through the full maybe_backup operation
//! 3. A failed upload leaves the published manifest and scheduling state untouched
//! 4. Retention bound: 30 existing generations plus one new backup leaves 24
//! 5. Rotation is idempotent
//! 6. Startup reconciliation: fresh install, up-to-date local, stale local
//! 7. Restores are accretive
//! 8. Files missing from the remote are skipped, the rest restored
//! 9. Safety copy placement and the skip flag

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use tomedb_storage::{
    local_manifest_path, BackupOutcome, BackupPolicy, MockFailure, MockObjectStore,
    MockStoreConfig, ObjectStore, PersistenceCoordinator, RemoteLayout, RestoreOutcome,
    StartupRestore,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap()
}

fn mock_store() -> Arc<MockObjectStore> {
    Arc::new(MockObjectStore::new_with_config(MockStoreConfig::instant()))
}

fn coordinator(
    store: Arc<MockObjectStore>,
    db_dir: &Path,
    history_keep: usize,
) -> PersistenceCoordinator {
    PersistenceCoordinator::new(
        store,
        RemoteLayout::new("tomedb"),
        db_dir,
        BackupPolicy {
            interval: Duration::seconds(3600),
            history_keep,
        },
    )
}

async fn write_files(dir: &Path, files: &[(&str, &str)]) {
    tokio::fs::create_dir_all(dir).await.unwrap();
    for (name, contents) in files {
        tokio::fs::write(dir.join(name), contents).await.unwrap();
    }
}

async fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().into_string().unwrap());
    }
    names.sort();
    names
}

#[tokio::test]
async fn test_backup_restore_round_trip() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let contents = [("a.json", "alpha"), ("b.json", "beta"), ("c.json", "gamma")];
    write_files(&source, &contents).await;

    let store = mock_store();
    let backup_side = coordinator(store.clone(), &source, 24);
    backup_side.backup_now(t0()).await.unwrap();

    // The manifest copy lives beside the directory, never inside it
    assert!(local_manifest_path(&source).exists());

    let restored_dir = temp.path().join("restored");
    let restore_side = coordinator(store.clone(), &restored_dir, 24);
    let outcome = restore_side.restore(false).await.unwrap();

    let RestoreOutcome::Restored(report) = outcome else {
        panic!("expected a restore, got NoRemoteBackup");
    };
    assert_eq!(report.files, 3);
    assert!(
        report.safety_copy.is_none(),
        "an absent target directory needs no safety copy"
    );

    assert_eq!(
        dir_entries(&restored_dir).await,
        vec!["a.json", "b.json", "c.json"]
    );
    for (name, expected) in contents {
        let data = tokio::fs::read(restored_dir.join(name)).await.unwrap();
        assert_eq!(
            data,
            expected.as_bytes(),
            "byte content must survive the round trip"
        );
    }
}

#[tokio::test]
async fn test_interval_gating_full_operation() {
    let temp = TempDir::new().unwrap();
    let db_dir = temp.path().join("db");
    write_files(&db_dir, &[("index.json", "idx")]).await;

    let store = mock_store();
    let c = coordinator(store, &db_dir, 24);

    assert!(matches!(
        c.maybe_backup(t0()).await.unwrap(),
        BackupOutcome::Completed(_)
    ));

    // One second inside the interval: nothing happens
    assert_eq!(
        c.maybe_backup(t0() + Duration::seconds(3599)).await.unwrap(),
        BackupOutcome::NotDue
    );

    // One second past it: a backup runs
    let outcome = c.maybe_backup(t0() + Duration::seconds(3601)).await.unwrap();
    let BackupOutcome::Completed(report) = outcome else {
        panic!("expected a backup past the interval");
    };
    assert_eq!(report.label, "20250201_130001");
}

#[tokio::test]
async fn test_failed_upload_leaves_no_torn_state() {
    let temp = TempDir::new().unwrap();
    let db_dir = temp.path().join("db");
    write_files(&db_dir, &[("a.json", "one"), ("b.json", "two")]).await;

    let store = mock_store();
    let c = coordinator(store.clone(), &db_dir, 24);

    c.backup_now(t0()).await.unwrap();
    let committed = c.current_manifest().await.unwrap().unwrap();

    // Next attempt: a.json uploads to current and history, then b.json's
    // upload fails partway through the file set
    store.push_failures(vec![
        MockFailure::Ok,
        MockFailure::Ok,
        MockFailure::Transient("503 SlowDown"),
    ]);

    let result = c.maybe_backup(t0() + Duration::seconds(7200)).await;
    assert!(result.is_err(), "expected the backup attempt to fail");

    // Scheduling state and the committed manifest are both unchanged
    assert_eq!(c.last_backup_time(), Some(t0()));
    let after = c.current_manifest().await.unwrap().unwrap();
    assert_eq!(after.timestamp, committed.timestamp);
    assert_eq!(after.files, committed.files);
}

#[tokio::test]
async fn test_rotation_bound_30_to_24() {
    let temp = TempDir::new().unwrap();
    let db_dir = temp.path().join("db");
    write_files(&db_dir, &[("index.json", "idx")]).await;

    let store = mock_store();
    let layout = RemoteLayout::new("tomedb");

    // 30 pre-existing generations from January
    for day in 1..=30 {
        let label = format!("202501{day:02}_000000");
        for name in ["index.json", "documents.json"] {
            store
                .put(&layout.history_file_key(&label, name), Bytes::from("seed"))
                .await
                .unwrap();
        }
    }

    let c = coordinator(store, &db_dir, 24);
    let report = c.backup_now(t0()).await.unwrap();

    let entries = c.list_history().await.unwrap();
    assert_eq!(entries.len(), 24, "retention bound must hold after rotation");
    assert_eq!(entries[0].label, report.label, "newest entry is the new backup");
    assert_eq!(
        entries.last().unwrap().label,
        "20250108_000000",
        "the seven oldest generations must be gone"
    );
}

#[tokio::test]
async fn test_rotation_idempotent_via_coordinator() {
    let temp = TempDir::new().unwrap();
    let db_dir = temp.path().join("db");
    write_files(&db_dir, &[("index.json", "idx")]).await;

    let store = mock_store();
    let c = coordinator(store, &db_dir, 2);

    for hours in [0, 2, 4] {
        c.backup_now(t0() + Duration::hours(hours)).await.unwrap();
    }

    let first = c.rotate_history().await.unwrap();
    assert_eq!(first.retained, 2);
    assert_eq!(first.deleted_backups, 0, "backup already rotated internally");
    let labels_after_first: Vec<String> = c
        .list_history()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.label)
        .collect();

    let second = c.rotate_history().await.unwrap();
    assert_eq!(second.deleted_backups, 0);
    let labels_after_second: Vec<String> = c
        .list_history()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.label)
        .collect();
    assert_eq!(labels_after_first, labels_after_second);
}

#[tokio::test]
async fn test_startup_fresh_install_is_noop() {
    let temp = TempDir::new().unwrap();
    let db_dir = temp.path().join("db");

    let store = mock_store();
    let c = coordinator(store.clone(), &db_dir, 24);

    let outcome = c.restore_on_start().await.unwrap();
    assert_eq!(outcome, StartupRestore::FreshInstall);

    assert!(
        !tokio::fs::try_exists(&db_dir).await.unwrap(),
        "a fresh install must leave the local directory untouched"
    );
    assert_eq!(store.storage_size(), 0);
}

#[tokio::test]
async fn test_startup_local_up_to_date_after_backup() {
    let temp = TempDir::new().unwrap();
    let db_dir = temp.path().join("db");
    write_files(&db_dir, &[("index.json", "idx")]).await;

    let store = mock_store();
    let c = coordinator(store, &db_dir, 24);
    c.backup_now(t0()).await.unwrap();

    let outcome = c.restore_on_start().await.unwrap();
    assert_eq!(outcome, StartupRestore::LocalUpToDate);
    assert_eq!(
        tokio::fs::read_to_string(db_dir.join("index.json"))
            .await
            .unwrap(),
        "idx"
    );
}

#[tokio::test]
async fn test_startup_restores_when_remote_newer() {
    let temp = TempDir::new().unwrap();
    let store = mock_store();

    // This node backed up at t0
    let stale_dir = temp.path().join("stale");
    write_files(&stale_dir, &[("index.json", "old")]).await;
    let stale_node = coordinator(store.clone(), &stale_dir, 24);
    stale_node.backup_now(t0()).await.unwrap();

    // Another node published a newer generation two hours later
    let fresh_dir = temp.path().join("fresh");
    write_files(&fresh_dir, &[("index.json", "new")]).await;
    let fresh_node = coordinator(store.clone(), &fresh_dir, 24);
    fresh_node
        .backup_now(t0() + Duration::seconds(7200))
        .await
        .unwrap();

    // The stale node restarts and pulls the newer files
    let outcome = stale_node.restore_on_start().await.unwrap();
    assert_eq!(
        outcome,
        StartupRestore::Restored {
            files: 1,
            timestamp: t0() + Duration::seconds(7200),
        }
    );
    assert_eq!(
        tokio::fs::read_to_string(stale_dir.join("index.json"))
            .await
            .unwrap(),
        "new"
    );

    // The refreshed local manifest copy makes the next start a no-op
    assert_eq!(
        stale_node.restore_on_start().await.unwrap(),
        StartupRestore::LocalUpToDate
    );
}

#[tokio::test]
async fn test_restore_is_accretive() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    write_files(&source, &[("a.json", "alpha")]).await;

    let store = mock_store();
    coordinator(store.clone(), &source, 24)
        .backup_now(t0())
        .await
        .unwrap();

    let target = temp.path().join("target");
    write_files(&target, &[("extra.json", "keep me")]).await;

    let c = coordinator(store, &target, 24);
    let RestoreOutcome::Restored(report) = c.restore(false).await.unwrap() else {
        panic!("expected a restore");
    };

    assert_eq!(dir_entries(&target).await, vec!["a.json", "extra.json"]);
    assert_eq!(
        tokio::fs::read_to_string(target.join("extra.json"))
            .await
            .unwrap(),
        "keep me"
    );

    // The safety copy preserved the pre-restore contents
    let safety_copy = report.safety_copy.expect("non-empty target gets a safety copy");
    assert!(safety_copy
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("target_local_backup_"));
    assert_eq!(dir_entries(&safety_copy).await, vec!["extra.json"]);
}

#[tokio::test]
async fn test_restore_skip_flag_makes_no_safety_copy() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    write_files(&source, &[("a.json", "alpha")]).await;

    let store = mock_store();
    coordinator(store.clone(), &source, 24)
        .backup_now(t0())
        .await
        .unwrap();

    let target = temp.path().join("target");
    write_files(&target, &[("extra.json", "overwrite risk accepted")]).await;

    let c = coordinator(store, &target, 24);
    let RestoreOutcome::Restored(report) = c.restore(true).await.unwrap() else {
        panic!("expected a restore");
    };
    assert!(report.safety_copy.is_none());
    assert!(!report.quota_fallback);

    let siblings: Vec<String> = dir_entries(temp.path())
        .await
        .into_iter()
        .filter(|name| name.starts_with("target_local_backup_"))
        .collect();
    assert!(siblings.is_empty(), "skip flag must suppress the safety copy");
}

#[tokio::test]
async fn test_restore_skips_missing_remote_file() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    write_files(&source, &[("a.json", "alpha"), ("b.json", "beta")]).await;

    let store = mock_store();
    let layout = RemoteLayout::new("tomedb");
    coordinator(store.clone(), &source, 24)
        .backup_now(t0())
        .await
        .unwrap();

    // Simulate an externally deleted current object
    store.delete(&layout.file_key("a.json")).await.unwrap();

    let target = temp.path().join("target");
    let c = coordinator(store, &target, 24);
    let RestoreOutcome::Restored(report) = c.restore(false).await.unwrap() else {
        panic!("expected a restore");
    };

    assert_eq!(report.files, 1);
    assert_eq!(dir_entries(&target).await, vec!["b.json"]);
}

#[tokio::test]
async fn test_restore_without_remote_backup() {
    let temp = TempDir::new().unwrap();
    let db_dir = temp.path().join("db");

    let store = mock_store();
    let c = coordinator(store, &db_dir, 24);

    let outcome = c.restore(false).await.unwrap();
    assert_eq!(outcome, RestoreOutcome::NoRemoteBackup);
    assert!(!tokio::fs::try_exists(&db_dir).await.unwrap());
}
