use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the photos service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Object store configuration
    pub s3: S3Config,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Ingestion and thumbnail rendering configuration
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Background reconciliation configuration
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket holding originals and thumbnails
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Presigned URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
    /// Multipart upload threshold in bytes (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Ingestion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Directory for staging uploads (OS temp dir when unset)
    pub staging_dir: Option<PathBuf>,
    /// Bounding box edge for thumbnails
    #[serde(default = "default_thumbnail_max_dimension")]
    pub thumbnail_max_dimension: u32,
    /// Stack blur radius for the BLUR variant
    #[serde(default = "default_blur_radius")]
    pub blur_radius: u32,
    /// JPEG quality for encoded thumbnails
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Reconciliation sweep configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Run the background sweep
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between sweeps
    #[serde(default = "default_reconcile_interval_secs")]
    pub interval_secs: u64,
    /// Minimum age before an unsettled photo is touched
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Largest accepted upload body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "photos-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_presigned_url_expiry_secs() -> u64 {
    3600
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024 // 50MB
}

fn default_true() -> bool {
    true
}

fn default_thumbnail_max_dimension() -> u32 {
    500
}

fn default_blur_radius() -> u32 {
    30
}

fn default_jpeg_quality() -> u8 {
    75
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

fn default_grace_period_secs() -> u64 {
    3600
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    4000
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "photos-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(config::File::with_name("config/photos").required(false))
            .add_source(config::File::with_name("/etc/shutter/photos").required(false))
            // PHOTOS__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("PHOTOS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        // tokio::time::interval panics on a zero period
        if self.reconcile.interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "reconcile.interval_secs".to_string(),
                message: "Interval must be greater than 0".to_string(),
            });
        }

        if self.ingest.thumbnail_max_dimension == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "ingest.thumbnail_max_dimension".to_string(),
                message: "Dimension must be greater than 0".to_string(),
            });
        }

        if !(1..=100).contains(&self.ingest.jpeg_quality) {
            return Err(ConfigValidationError::InvalidValue {
                field: "ingest.jpeg_quality".to_string(),
                message: format!("Quality must be in 1..=100, got {}", self.ingest.jpeg_quality),
            });
        }

        if self.api.max_upload_bytes == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "api.max_upload_bytes".to_string(),
                message: "Limit must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.presigned_url_expiry_secs)
    }

    /// Get reconciliation interval as Duration
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile.interval_secs)
    }

    /// Get reconciliation grace period as Duration
    pub fn reconcile_grace_period(&self) -> Duration {
        Duration::from_secs(self.reconcile.grace_period_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            staging_dir: None,
            thumbnail_max_dimension: default_thumbnail_max_dimension(),
            blur_radius: default_blur_radius(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconcile_interval_secs(),
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
