//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chunk store and working directory configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for chunk objects
    #[serde(default = "default_chunk_dir")]
    pub chunk_dir: String,

    /// Working directory for retention state (marker logs)
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
}

fn default_chunk_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("tidemark").join("chunks").to_string_lossy().to_string())
        .unwrap_or_else(|| "./tidemark_data/chunks".to_string())
}

fn default_working_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("tidemark").join("retention").to_string_lossy().to_string())
        .unwrap_or_else(|| "./tidemark_data/retention".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_dir: default_chunk_dir(),
            working_dir: default_working_dir(),
        }
    }
}

/// Retention engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Prefix of periodic index table names
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Table period in seconds (default: daily tables)
    #[serde(default = "default_table_period")]
    pub table_period_secs: u64,

    /// Default retention period in seconds (default: 31 days)
    #[serde(default = "default_retention_period")]
    pub retention_period_secs: u64,

    /// Per-tenant retention period overrides, in seconds
    #[serde(default)]
    pub per_user_retention_secs: HashMap<String, u64>,

    /// Number of parallel delete workers in the sweeper
    #[serde(default = "default_delete_workers")]
    pub delete_worker_count: usize,

    /// Minimum marker log age before the sweeper deletes its chunks
    #[serde(default = "default_delete_min_age")]
    pub delete_min_age_secs: u64,

    /// How often the sweeper scans for eligible marker logs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_table_prefix() -> String {
    "index_".to_string()
}

fn default_table_period() -> u64 {
    24 * 60 * 60 // daily tables
}

fn default_retention_period() -> u64 {
    31 * 24 * 60 * 60 // 31 days
}

fn default_delete_workers() -> usize {
    150
}

fn default_delete_min_age() -> u64 {
    2 * 60 * 60 // 2 hours
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            table_prefix: default_table_prefix(),
            table_period_secs: default_table_period(),
            retention_period_secs: default_retention_period(),
            per_user_retention_secs: HashMap::new(),
            delete_worker_count: default_delete_workers(),
            delete_min_age_secs: default_delete_min_age(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl RetentionConfig {
    /// Table naming schema derived from this config
    pub fn table_schema(&self) -> crate::index::TableSchema {
        crate::index::TableSchema::new(&self.table_prefix, self.table_period_secs as i64 * 1000)
    }

    /// Grace window before marked chunks may be deleted
    pub fn delete_min_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.delete_min_age_secs as i64)
    }

    /// Sweeper cycle interval
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    /// Expiration checker from the configured retention periods
    pub fn expiration_checker(&self) -> crate::retention::PeriodExpirationChecker {
        let mut checker = crate::retention::PeriodExpirationChecker::new(
            chrono::Duration::seconds(self.retention_period_secs as i64),
        );
        for (user, secs) in &self.per_user_retention_secs {
            checker = checker.with_user_period(user, chrono::Duration::seconds(*secs as i64));
        }
        checker
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("tidemark").join("config.toml")),
            Some(PathBuf::from("/etc/tidemark/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Storage overrides
        if let Ok(chunk_dir) = std::env::var("TIDEMARK_CHUNK_DIR") {
            self.storage.chunk_dir = chunk_dir;
        }
        if let Ok(working_dir) = std::env::var("TIDEMARK_WORKING_DIR") {
            self.storage.working_dir = working_dir;
        }

        // Retention overrides
        if let Ok(period) = std::env::var("TIDEMARK_RETENTION_PERIOD_SECS") {
            if let Ok(p) = period.parse() {
                self.retention.retention_period_secs = p;
            }
        }
        if let Ok(workers) = std::env::var("TIDEMARK_DELETE_WORKERS") {
            if let Ok(w) = workers.parse() {
                self.retention.delete_worker_count = w;
            }
        }
        if let Ok(min_age) = std::env::var("TIDEMARK_DELETE_MIN_AGE_SECS") {
            if let Ok(a) = min_age.parse() {
                self.retention.delete_min_age_secs = a;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("TIDEMARK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TIDEMARK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            retention: RetentionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Tidemark Configuration
#
# Environment variables override these settings:
# - TIDEMARK_CHUNK_DIR
# - TIDEMARK_WORKING_DIR
# - TIDEMARK_RETENTION_PERIOD_SECS
# - TIDEMARK_DELETE_WORKERS
# - TIDEMARK_DELETE_MIN_AGE_SECS
# - TIDEMARK_LOG_LEVEL
# - TIDEMARK_LOG_FORMAT

[storage]
# Root directory for chunk objects
chunk_dir = "~/.local/share/tidemark/chunks"

# Working directory for retention state (marker logs)
working_dir = "~/.local/share/tidemark/retention"

[retention]
# Prefix of periodic index table names
table_prefix = "index_"

# Table period in seconds (86400 = daily tables)
table_period_secs = 86400

# Default retention period in seconds (31 days)
retention_period_secs = 2678400

# Number of parallel delete workers in the sweeper
delete_worker_count = 150

# Minimum marker log age before chunks are deleted (2 hours)
delete_min_age_secs = 7200

# How often the sweeper scans for eligible marker logs
sweep_interval_secs = 60

# Per-tenant retention overrides
# [retention.per_user_retention_secs]
# "tenant-a" = 604800

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/tidemark/tidemark.log"
"#
    .to_string()
}
