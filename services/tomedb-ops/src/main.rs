use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use chrono::{DateTime, Utc};
use tomedb_storage::{
    local_manifest_path, BackupManifest, BackupPolicy, LocalObjectStore, ObjectStore,
    PersistenceCoordinator, RemoteLayout, RestoreOutcome, S3Config, S3ObjectStore,
};

#[derive(Parser, Debug)]
#[command(name = "tomedb-ops")]
#[command(about = "TomeDB backup and restore operations tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Object store and database location, shared by every subcommand
#[derive(Args, Debug)]
struct StoreArgs {
    /// Local database directory
    #[arg(long, env = "TOMEDB_DB_DIR", default_value = "./data/tomedb")]
    db_dir: PathBuf,

    /// Remote key prefix for this database
    #[arg(long, env = "TOMEDB_BACKUP_PREFIX", default_value = "tomedb")]
    prefix: String,

    /// Use a filesystem-backed object store rooted here instead of S3
    #[arg(long, env = "TOMEDB_LOCAL_DIR")]
    local_dir: Option<PathBuf>,

    /// S3 endpoint
    #[arg(
        long,
        env = "TOMEDB_S3_ENDPOINT",
        default_value = "http://localhost:9000"
    )]
    s3_endpoint: String,

    /// S3 access key
    #[arg(long, env = "TOMEDB_S3_ACCESS_KEY")]
    s3_access_key: Option<String>,

    /// S3 secret key
    #[arg(long, env = "TOMEDB_S3_SECRET_KEY")]
    s3_secret_key: Option<String>,

    /// S3 bucket
    #[arg(long, env = "TOMEDB_S3_BUCKET", default_value = "tomedb")]
    s3_bucket: String,

    /// S3 region
    #[arg(long, env = "TOMEDB_S3_REGION", default_value = "us-east-1")]
    s3_region: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Restore the local database directory from the latest remote backup
    Restore {
        /// Skip the safety copy of the pre-restore directory contents
        #[arg(long)]
        skip_backup: bool,
    },

    /// Force an immediate backup regardless of the interval
    Backup,

    /// Delete history generations beyond the retention count
    Cleanup {
        /// Report what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,

        /// Actually delete; without this the pass runs as a dry run
        #[arg(long)]
        force: bool,

        /// History generations to retain
        #[arg(long, default_value = "24")]
        keep: usize,

        /// Maximum generations to delete in one pass (0 = unlimited)
        #[arg(long, default_value = "0")]
        limit: usize,
    },

    /// Show remote backup state, local manifest timestamp, and history count
    Status,

    /// List current snapshot objects and history generations
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();
    let coordinator = build_coordinator(&cli.store).await?;

    match cli.command {
        Commands::Restore { skip_backup } => run_restore(&coordinator, skip_backup).await,
        Commands::Backup => run_backup(&coordinator).await,
        Commands::Cleanup {
            dry_run,
            force,
            keep,
            limit,
        } => run_cleanup(&coordinator, effective_dry_run(dry_run, force), keep, limit).await,
        Commands::Status => run_status(&coordinator, &cli.store).await,
        Commands::List => run_list(&coordinator).await,
    }
}

async fn build_coordinator(
    args: &StoreArgs,
) -> Result<PersistenceCoordinator, Box<dyn std::error::Error>> {
    let store: Arc<dyn ObjectStore> = if let Some(dir) = &args.local_dir {
        Arc::new(LocalObjectStore::new(dir).await?)
    } else {
        let (Some(access_key), Some(secret_key)) =
            (args.s3_access_key.clone(), args.s3_secret_key.clone())
        else {
            return Err(
                "TOMEDB_S3_ACCESS_KEY and TOMEDB_S3_SECRET_KEY must be set, \
                 or pass --local-dir for a filesystem-backed store"
                    .into(),
            );
        };
        Arc::new(S3ObjectStore::new(&S3Config {
            endpoint: args.s3_endpoint.clone(),
            region: args.s3_region.clone(),
            access_key,
            secret_key,
            bucket: args.s3_bucket.clone(),
            ..Default::default()
        })?)
    };

    Ok(PersistenceCoordinator::new(
        store,
        RemoteLayout::new(args.prefix.clone()),
        args.db_dir.clone(),
        BackupPolicy::default(),
    ))
}

async fn run_restore(
    coordinator: &PersistenceCoordinator,
    skip_backup: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("📥 Restoring database from remote backup...");

    match coordinator.restore(skip_backup).await {
        Ok(RestoreOutcome::Restored(report)) => {
            println!("✅ Restore complete!");
            println!("  Files written: {}", report.files);
            if let Some(path) = &report.safety_copy {
                println!("  Previous contents copied to: {}", path.display());
            }
            if report.quota_fallback {
                println!("  ⚠️  Safety copy skipped after a disk quota error");
            }
            Ok(())
        }
        Ok(RestoreOutcome::NoRemoteBackup) => {
            eprintln!("❌ No remote backup found");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("❌ Restore failed: {}", e);
            Err(e.into())
        }
    }
}

async fn run_backup(
    coordinator: &PersistenceCoordinator,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("📦 Backing up database to remote store...");

    match coordinator.backup_now(Utc::now()).await {
        Ok(report) => {
            println!("✅ Backup complete!");
            println!("  Generation: {}", report.label);
            println!("  Files uploaded: {}", report.files);
            println!("  Bytes uploaded: {}", report.bytes);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Backup failed: {}", e);
            Err(e.into())
        }
    }
}

async fn run_cleanup(
    coordinator: &PersistenceCoordinator,
    dry_run: bool,
    keep: usize,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if dry_run {
        println!("🔍 Cleanup dry run (pass --force to delete)...");
    } else {
        println!("🧹 Cleaning up old history generations...");
    }

    match coordinator.cleanup(keep, limit, dry_run).await {
        Ok(report) => {
            if report.dry_run {
                println!("✅ Dry run complete, nothing deleted");
                println!("  Generations present: {}", report.total);
                println!("  Over retention: {}", report.eligible);
                println!(
                    "  Would delete: {} generations ({} objects)",
                    report.deleted_backups, report.deleted_objects
                );
            } else {
                println!("✅ Cleanup complete!");
                println!("  Generations present: {}", report.total);
                println!(
                    "  Deleted: {} generations ({} objects)",
                    report.deleted_backups, report.deleted_objects
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Cleanup failed: {}", e);
            Err(e.into())
        }
    }
}

async fn run_status(
    coordinator: &PersistenceCoordinator,
    args: &StoreArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Backup status for prefix '{}'", args.prefix);

    match coordinator.current_manifest().await {
        Ok(Some(manifest)) => {
            println!("  Remote backup: {}", manifest.timestamp);
            println!("  Remote files: {}", manifest.file_count());
        }
        Ok(None) => println!("  Remote backup: none"),
        Err(e) => {
            eprintln!("❌ Failed to read remote manifest: {}", e);
            return Err(e.into());
        }
    }

    match local_manifest_timestamp(&args.db_dir) {
        Some(timestamp) => println!("  Local manifest: {}", timestamp),
        None => println!("  Local manifest: none"),
    }

    let history = coordinator.list_history().await?;
    println!("  History generations: {}", history.len());
    Ok(())
}

async fn run_list(
    coordinator: &PersistenceCoordinator,
) -> Result<(), Box<dyn std::error::Error>> {
    let objects = coordinator.list_current().await?;
    println!("📦 Current snapshot ({} objects):", objects.len());
    for object in &objects {
        println!("  {}  {} bytes", object.key, object.size_bytes);
    }

    let history = coordinator.list_history().await?;
    println!("🗂  History ({} generations):", history.len());
    for entry in &history {
        println!(
            "  {}  {} objects, {} bytes",
            entry.label, entry.object_count, entry.total_bytes
        );
    }
    Ok(())
}

/// Without `--force`, cleanup always reports instead of deleting.
fn effective_dry_run(dry_run: bool, force: bool) -> bool {
    dry_run || !force
}

/// Timestamp of the local manifest copy, when one is readable.
fn local_manifest_timestamp(db_dir: &Path) -> Option<DateTime<Utc>> {
    let data = std::fs::read(local_manifest_path(db_dir)).ok()?;
    serde_json::from_slice::<BackupManifest>(&data)
        .ok()
        .map(|manifest| manifest.timestamp)
}

/// Initialize logging
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(env_filter).with_target(false).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cleanup_defaults_to_dry_run() {
        assert!(effective_dry_run(false, false));
        assert!(effective_dry_run(true, false));
        assert!(effective_dry_run(true, true));
        assert!(!effective_dry_run(false, true));
    }

    #[test]
    fn test_local_manifest_timestamp() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_dir = dir.path().join("db");
        assert!(local_manifest_timestamp(&db_dir).is_none());

        // The manifest copy sits beside the database directory
        let timestamp = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let manifest = BackupManifest::new(timestamp, vec!["index.json".to_string()]);
        std::fs::write(
            local_manifest_path(&db_dir),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();

        assert_eq!(local_manifest_timestamp(&db_dir), Some(timestamp));
    }
}
