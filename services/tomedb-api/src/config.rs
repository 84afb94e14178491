//! Service configuration.
//!
//! Settings come from three layers, later layers winning: built-in
//! defaults, a TOML file (`config.toml`, or the path in `TOMEDB_CONFIG`),
//! and `TOMEDB_*` environment variables. Credentials are env-only and
//! never read from the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    TomlError {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            backup: BackupConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on a single document upload, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Local directory holding the index and document files.
    #[serde(default = "default_db_dir")]
    pub dir: String,
    /// Pull the latest remote backup into an empty database directory
    /// before serving.
    #[serde(default = "default_true")]
    pub restore_on_start: bool,
    /// Treat a failed startup restore as fatal instead of starting empty.
    #[serde(default)]
    pub strict_restore: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dir: default_db_dir(),
            restore_on_start: default_true(),
            strict_restore: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Key prefix for all remote objects belonging to this database.
    #[serde(default = "default_backup_prefix")]
    pub prefix: String,
    /// Minimum seconds between two scheduled backups.
    #[serde(default = "default_backup_interval")]
    pub interval_seconds: u64,
    /// Number of timestamped history snapshots to retain remotely.
    #[serde(default = "default_history_keep")]
    pub history_keep: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            prefix: default_backup_prefix(),
            interval_seconds: default_backup_interval(),
            history_keep: default_history_keep(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store backend: "s3", "local", or "memory".
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Root directory for the "local" backend.
    #[serde(default = "default_local_dir")]
    pub local_dir: String,
    #[serde(default)]
    pub s3: S3Config,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local_dir: default_local_dir(),
            s3: S3Config::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_s3_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default = "default_s3_bucket")]
    pub bucket: String,
    /// Set via TOMEDB_S3_ACCESS_KEY, never from the config file.
    #[serde(skip)]
    pub access_key: String,
    /// Set via TOMEDB_S3_SECRET_KEY, never from the config file.
    #[serde(skip)]
    pub secret_key: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: default_s3_endpoint(),
            region: default_s3_region(),
            bucket: default_s3_bucket(),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding backend: "openai" or "mock".
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_seconds: u64,
    /// Set via TOMEDB_EMBEDDING_API_KEY or OPENAI_API_KEY, never from
    /// the config file.
    #[serde(skip)]
    pub api_key: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_seconds: default_embedding_timeout(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target maximum characters per chunk.
    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,
    /// Characters of overlap between adjacent word-split chunks.
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_db_dir() -> String {
    "./data/tomedb".to_string()
}

fn default_true() -> bool {
    true
}

fn default_backup_prefix() -> String {
    "tomedb".to_string()
}

fn default_backup_interval() -> u64 {
    3600
}

fn default_history_keep() -> usize {
    24
}

fn default_storage_backend() -> String {
    "s3".to_string()
}

fn default_local_dir() -> String {
    "./data/objects".to_string()
}

fn default_s3_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_s3_bucket() -> String {
    "tomedb".to_string()
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> u32 {
    1536
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_chunk_max_chars() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load configuration from the conventional locations.
    ///
    /// A path in `TOMEDB_CONFIG` must exist and parse. Without it,
    /// `config.toml` in the working directory is used when present,
    /// defaults otherwise. Environment overrides apply on top either way.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("TOMEDB_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new("config.toml").exists() => Self::from_file("config.toml")?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("TOMEDB_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("TOMEDB_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(bytes) = std::env::var("TOMEDB_MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = bytes.parse() {
                self.server.max_upload_bytes = bytes;
            }
        }

        if let Ok(dir) = std::env::var("TOMEDB_DB_DIR") {
            self.database.dir = dir;
        }
        if let Ok(restore) = std::env::var("TOMEDB_RESTORE_ON_START") {
            if let Ok(restore) = restore.parse() {
                self.database.restore_on_start = restore;
            }
        }
        if let Ok(strict) = std::env::var("TOMEDB_STRICT_RESTORE") {
            if let Ok(strict) = strict.parse() {
                self.database.strict_restore = strict;
            }
        }

        if let Ok(enabled) = std::env::var("TOMEDB_BACKUP_ENABLED") {
            if let Ok(enabled) = enabled.parse() {
                self.backup.enabled = enabled;
            }
        }
        if let Ok(prefix) = std::env::var("TOMEDB_BACKUP_PREFIX") {
            self.backup.prefix = prefix;
        }
        if let Ok(interval) = std::env::var("TOMEDB_BACKUP_INTERVAL_SECONDS") {
            if let Ok(interval) = interval.parse() {
                self.backup.interval_seconds = interval;
            }
        }
        if let Ok(keep) = std::env::var("TOMEDB_BACKUP_HISTORY_KEEP") {
            if let Ok(keep) = keep.parse() {
                self.backup.history_keep = keep;
            }
        }

        if let Ok(backend) = std::env::var("TOMEDB_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }
        if let Ok(dir) = std::env::var("TOMEDB_LOCAL_DIR") {
            self.storage.local_dir = dir;
        }
        if let Ok(endpoint) = std::env::var("TOMEDB_S3_ENDPOINT") {
            self.storage.s3.endpoint = endpoint;
        }
        if let Ok(region) = std::env::var("TOMEDB_S3_REGION") {
            self.storage.s3.region = region;
        }
        if let Ok(bucket) = std::env::var("TOMEDB_S3_BUCKET") {
            self.storage.s3.bucket = bucket;
        }
        if let Ok(key) = std::env::var("TOMEDB_S3_ACCESS_KEY") {
            self.storage.s3.access_key = key;
        }
        if let Ok(key) = std::env::var("TOMEDB_S3_SECRET_KEY") {
            self.storage.s3.secret_key = key;
        }

        if let Ok(provider) = std::env::var("TOMEDB_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(url) = std::env::var("TOMEDB_EMBEDDING_BASE_URL") {
            self.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("TOMEDB_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(dimension) = std::env::var("TOMEDB_EMBEDDING_DIMENSION") {
            if let Ok(dimension) = dimension.parse() {
                self.embedding.dimension = dimension;
            }
        }
        if let Ok(timeout) = std::env::var("TOMEDB_EMBEDDING_TIMEOUT_SECONDS") {
            if let Ok(timeout) = timeout.parse() {
                self.embedding.timeout_seconds = timeout;
            }
        }
        if let Ok(key) = std::env::var("TOMEDB_EMBEDDING_API_KEY") {
            self.embedding.api_key = key;
        } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.embedding.api_key = key;
        }

        if let Ok(level) = std::env::var("TOMEDB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TOMEDB_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.database.dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.dir must not be empty".to_string(),
            ));
        }

        if self.backup.prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "backup.prefix must not be empty".to_string(),
            ));
        }
        if self.backup.enabled && self.backup.interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "backup.interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.backup.history_keep == 0 {
            return Err(ConfigError::ValidationError(
                "backup.history_keep must be at least 1".to_string(),
            ));
        }

        match self.storage.backend.as_str() {
            "s3" => {
                if self.storage.s3.bucket.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "storage.s3.bucket must not be empty".to_string(),
                    ));
                }
                if self.storage.s3.access_key.is_empty() || self.storage.s3.secret_key.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "TOMEDB_S3_ACCESS_KEY and TOMEDB_S3_SECRET_KEY must be set \
                         when storage.backend is \"s3\""
                            .to_string(),
                    ));
                }
            }
            "local" => {
                if self.storage.local_dir.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "storage.local_dir must not be empty".to_string(),
                    ));
                }
            }
            "memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "storage.backend must be \"s3\", \"local\", or \"memory\", got \"{other}\""
                )));
            }
        }

        match self.embedding.provider.as_str() {
            "openai" => {
                if self.embedding.api_key.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "TOMEDB_EMBEDDING_API_KEY or OPENAI_API_KEY must be set \
                         when embedding.provider is \"openai\""
                            .to_string(),
                    ));
                }
            }
            "mock" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "embedding.provider must be \"openai\" or \"mock\", got \"{other}\""
                )));
            }
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }

        if self.chunking.max_chars == 0 {
            return Err(ConfigError::ValidationError(
                "chunking.max_chars must be greater than zero".to_string(),
            ));
        }
        if self.chunking.overlap >= self.chunking.max_chars {
            return Err(ConfigError::ValidationError(
                "chunking.overlap must be smaller than chunking.max_chars".to_string(),
            ));
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "logging.format must be \"pretty\" or \"json\", got \"{other}\""
                )));
            }
        }

        Ok(())
    }
}
