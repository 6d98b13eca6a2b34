//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//!
//! The resulting `Config` is injected into `CubeEngine`, `Scheduler` and
//! `StepCache` constructors and never changes afterwards.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub table: TableConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub query_timeout_ms: Option<u64>,

    #[serde(default)]
    pub unknown_measures_are_empty: bool,
}

fn default_max_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            query_timeout_ms: None,
            unknown_measures_are_empty: false,
        }
    }
}

impl EngineConfig {
    /// Query timeout, if any
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

/// How step outputs are weighed for the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeigherKind {
    /// Weight is the number of slices
    #[default]
    Slices,
    /// Weight is the number of slices; expensive outputs are admitted even when small
    CostAware,
}

/// Step cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    #[serde(default = "default_max_weight")]
    pub max_weight: usize,

    #[serde(default = "default_min_weight")]
    pub min_weight: usize,

    #[serde(default)]
    pub weigher: WeigherKind,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_weight() -> usize {
    1_000_000 // slices
}

fn default_min_weight() -> usize {
    16
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_weight: default_max_weight(),
            min_weight: default_min_weight(),
            weigher: WeigherKind::default(),
        }
    }
}

/// Table connector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    1024
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
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
            dirs::config_dir().map(|p| p.join("cubedag").join("config.toml")),
            Some(PathBuf::from("/etc/cubedag/config.toml")),
            Some(PathBuf::from("./cubedag.toml")),
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
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Engine overrides
        if let Some(n) = lookup("CUBEDAG_MAX_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.engine.max_concurrency = n;
        }
        if let Some(ms) = lookup("CUBEDAG_QUERY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.engine.query_timeout_ms = Some(ms);
        }

        // Cache overrides
        if let Some(weight) = lookup("CUBEDAG_CACHE_MAX_WEIGHT").and_then(|v| v.parse().ok()) {
            self.cache.max_weight = weight;
        }
        if let Some(enabled) = lookup("CUBEDAG_CACHE_ENABLED").and_then(|v| parse_bool(&v)) {
            self.cache.enabled = enabled;
        }

        // Logging overrides
        if let Some(level) = lookup("CUBEDAG_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CUBEDAG_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
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
    r#"# cubedag Configuration
#
# Environment variables override these settings:
# - CUBEDAG_MAX_CONCURRENCY
# - CUBEDAG_QUERY_TIMEOUT_MS
# - CUBEDAG_CACHE_MAX_WEIGHT
# - CUBEDAG_CACHE_ENABLED
# - CUBEDAG_LOG_LEVEL
# - CUBEDAG_LOG_FORMAT

[engine]
# Maximum number of steps evaluated at once (defaults to the number of CPUs)
# max_concurrency = 8

# Cancel queries running longer than this (ms)
# query_timeout_ms = 30000

# Resolve unknown measures to empty measures instead of failing
unknown_measures_are_empty = false

[cache]
# Cache step outputs across queries
enabled = true

# Total cache weight (slices)
max_weight = 1000000

# Outputs lighter than this are not cached (slices)
min_weight = 16

# Weighing policy: slices or cost_aware
weigher = "slices"

[table]
# Rows streamed between two cancellation checks
batch_size = 1024

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
