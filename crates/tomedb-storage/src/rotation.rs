//! History rotation and cleanup.
//!
//! Every backup leaves a full generation under `<prefix>/history/<label>/`.
//! Rotation bounds how many generations are retained by deleting the oldest
//! ones, object by object. Generation labels sort lexicographically in
//! chronological order, so ordering never needs to parse timestamps.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use tomedb_core::CoreResult;

use crate::manifest::RemoteLayout;
use crate::object_store::{ObjectMetadata, ObjectStore};

/// One retained history generation
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// Generation label (`YYYYMMDD_HHMMSS`)
    pub label: String,
    /// Number of objects in the generation
    pub object_count: usize,
    /// Total stored bytes across the generation
    pub total_bytes: u64,
}

/// Outcome of a rotation pass
#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    /// Generations still present after the pass
    pub retained: usize,
    /// Generations deleted by the pass
    pub deleted_backups: usize,
    /// Objects deleted by the pass
    pub deleted_objects: usize,
}

/// Outcome of an operator-driven cleanup pass
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    /// Generations present before the pass
    pub total: usize,
    /// Generations over the retention count
    pub eligible: usize,
    /// Generations deleted (or that would be deleted under `dry_run`)
    pub deleted_backups: usize,
    /// Objects deleted (or that would be deleted under `dry_run`)
    pub deleted_objects: usize,
    /// Whether the pass only reported without deleting
    pub dry_run: bool,
}

/// Group all history objects by generation label, oldest first.
async fn group_generations(
    store: &dyn ObjectStore,
    layout: &RemoteLayout,
) -> CoreResult<BTreeMap<String, Vec<ObjectMetadata>>> {
    let objects = store.list(&layout.history_prefix()).await?;

    let mut generations: BTreeMap<String, Vec<ObjectMetadata>> = BTreeMap::new();
    for object in objects {
        match layout.split_history_key(&object.key) {
            Some((label, _)) => {
                generations.entry(label.to_string()).or_default().push(object);
            }
            None => {
                debug!("Ignoring non-generation key in history listing: {}", object.key);
            }
        }
    }

    Ok(generations)
}

async fn delete_generation(
    store: &dyn ObjectStore,
    label: &str,
    objects: &[ObjectMetadata],
) -> CoreResult<usize> {
    for object in objects {
        store.delete(&object.key).await?;
    }
    info!(
        "Deleted history backup {} ({} objects)",
        label,
        objects.len()
    );
    Ok(objects.len())
}

/// List retained history generations, newest first.
///
/// # Errors
///
/// Returns `CoreError::StorageError` if the history listing fails.
pub async fn list_history(
    store: &dyn ObjectStore,
    layout: &RemoteLayout,
) -> CoreResult<Vec<HistoryEntry>> {
    let generations = group_generations(store, layout).await?;

    Ok(generations
        .into_iter()
        .rev()
        .map(|(label, objects)| HistoryEntry {
            label,
            object_count: objects.len(),
            total_bytes: objects.iter().map(|o| o.size_bytes).sum(),
        })
        .collect())
}

/// Delete the oldest generations beyond `keep`.
///
/// Idempotent: with nothing over the retention count this is a pure listing.
/// Only keys under the history prefix are ever deleted, so the current
/// backup cannot be touched. Deletion goes oldest first, so an interrupted
/// pass leaves the newest generations intact and a rerun finishes the job.
///
/// # Errors
///
/// Returns `CoreError::StorageError` if listing or a deletion fails.
pub async fn rotate_history(
    store: &dyn ObjectStore,
    layout: &RemoteLayout,
    keep: usize,
) -> CoreResult<RotationReport> {
    let generations = group_generations(store, layout).await?;
    let total = generations.len();

    if total <= keep {
        return Ok(RotationReport {
            retained: total,
            deleted_backups: 0,
            deleted_objects: 0,
        });
    }

    let excess = total - keep;
    let mut deleted_objects = 0;

    // BTreeMap iterates oldest label first
    for (label, objects) in generations.iter().take(excess) {
        deleted_objects += delete_generation(store, label, objects).await?;
    }

    info!(
        "History rotation complete: deleted {} backups, retained {}",
        excess, keep
    );

    Ok(RotationReport {
        retained: keep,
        deleted_backups: excess,
        deleted_objects,
    })
}

/// Operator cleanup pass with an optional per-invocation batch limit.
///
/// `limit = 0` means unbounded. Under `dry_run` nothing is deleted and the
/// report describes what a real pass would remove.
///
/// # Errors
///
/// Returns `CoreError::StorageError` if listing or a deletion fails.
pub async fn cleanup_history(
    store: &dyn ObjectStore,
    layout: &RemoteLayout,
    keep: usize,
    limit: usize,
    dry_run: bool,
) -> CoreResult<CleanupReport> {
    let generations = group_generations(store, layout).await?;
    let total = generations.len();
    let eligible = total.saturating_sub(keep);

    let batch = if limit == 0 { eligible } else { eligible.min(limit) };

    let mut deleted_backups = 0;
    let mut deleted_objects = 0;

    for (label, objects) in generations.iter().take(batch) {
        if dry_run {
            info!(
                "Would delete history backup {} ({} objects)",
                label,
                objects.len()
            );
            deleted_objects += objects.len();
        } else {
            deleted_objects += delete_generation(store, label, objects).await?;
        }
        deleted_backups += 1;
    }

    Ok(CleanupReport {
        total,
        eligible,
        deleted_backups,
        deleted_objects,
        dry_run,
    })
}
