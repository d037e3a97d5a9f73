//! Application configuration management.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration (staging store and job channel).
    pub redis: RedisConfig,
    /// Object storage configuration.
    pub storage: StorageSettings,
    /// Image pipeline configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Worker pool configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
}

/// Storage provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// S3-compatible storage: Cloudflare R2, Supabase, AWS S3, DigitalOcean Spaces
    S3 {
        /// S3 endpoint URL.
        endpoint: String,
        /// S3 bucket name.
        bucket: String,
        /// AWS access key ID.
        access_key_id: String,
        /// AWS secret access key.
        secret_access_key: String,
        /// AWS region.
        region: String,
    },
    /// Azure Blob Storage
    AzureBlob {
        /// Azure storage account name.
        account: String,
        /// Azure storage access key.
        access_key: String,
        /// Azure container name.
        container: String,
    },
    /// Local filesystem (development only)
    LocalFs {
        /// Root directory path.
        root: PathBuf,
    },
}

impl StorageProvider {
    /// Create local filesystem provider (development only).
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs { root: root.into() }
    }

    /// Provider name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::AzureBlob { .. } => "azure_blob",
            Self::LocalFs { .. } => "local",
        }
    }

    /// Bucket or container name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        match self {
            Self::S3 { bucket, .. } => bucket,
            Self::AzureBlob { container, .. } => container,
            Self::LocalFs { root } => root.to_str().unwrap_or("local"),
        }
    }
}

/// Object storage settings as loaded from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Storage provider configuration.
    pub provider: StorageProvider,
    /// Public base URL that uploaded keys are served from.
    pub public_base_url: String,
    /// Destination folder for post images.
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Maximum decoded image size in bytes.
    pub max_file_size: Option<u64>,
    /// Allowed image MIME types (defaults apply when absent).
    pub allowed_mime_types: Option<Vec<String>>,
    /// Optional CDN purge endpoint called after deletes.
    pub cdn_purge_url: Option<String>,
}

fn default_folder() -> String {
    "posts".to_string()
}

/// Image pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Prefix for every staging key and stream name.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// TTL of staged payloads in seconds.
    #[serde(default = "default_staging_ttl")]
    pub staging_ttl_secs: u64,
    /// TTL of pending counters in seconds.
    #[serde(default = "default_counter_ttl")]
    pub counter_ttl_secs: u64,
}

fn default_service_name() -> String {
    "post-service".to_string()
}

fn default_staging_ttl() -> u64 {
    60
}

fn default_counter_ttl() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            staging_ttl_secs: default_staging_ttl(),
            counter_ttl_secs: default_counter_ttl(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Consumer name inside the consumer group; defaults to `worker-<pid>`.
    pub consumer_name: Option<String>,
    /// Number of concurrent upload consumers.
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
    /// Number of concurrent delete consumers.
    #[serde(default = "default_delete_concurrency")]
    pub delete_concurrency: usize,
    /// Entries fetched per read.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Blocking read timeout in milliseconds.
    #[serde(default = "default_block_ms")]
    pub block_ms: usize,
    /// Idle time after which a pending entry is reclaimed, in milliseconds.
    #[serde(default = "default_reclaim_idle_ms")]
    pub reclaim_idle_ms: usize,
    /// Deliveries after which an entry is dead-lettered.
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: usize,
}

fn default_upload_concurrency() -> usize {
    4
}

fn default_delete_concurrency() -> usize {
    2
}

fn default_batch_size() -> usize {
    10
}

fn default_block_ms() -> usize {
    5_000
}

fn default_reclaim_idle_ms() -> usize {
    30_000
}

fn default_max_deliveries() -> usize {
    5
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumer_name: None,
            upload_concurrency: default_upload_concurrency(),
            delete_concurrency: default_delete_concurrency(),
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            reclaim_idle_ms: default_reclaim_idle_ms(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("SCRIBE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
