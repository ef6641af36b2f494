//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::cache::{DEFAULT_MAX_SIZE, DEFAULT_TTL};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Analytics data location
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_analytics_root")]
    pub analytics_root: String,

    #[serde(default = "default_use_rollups")]
    pub use_rollups: bool,
}

fn default_analytics_root() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("almanac").to_string_lossy().to_string())
        .unwrap_or_else(|| "./analytics".to_string())
}

fn default_use_rollups() -> bool {
    true
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            analytics_root: default_analytics_root(),
            use_rollups: default_use_rollups(),
        }
    }
}

impl DataConfig {
    pub fn analytics_root(&self) -> PathBuf {
        expand_home(&self.analytics_root)
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default = "default_prewarm")]
    pub prewarm: bool,
}

fn default_max_size() -> usize {
    DEFAULT_MAX_SIZE
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

fn default_prewarm() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            default_ttl_secs: default_ttl_secs(),
            prewarm: default_prewarm(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
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

/// `~/` prefix resolved against the home directory
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
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
            dirs::config_dir().map(|p| p.join("almanac").join("config.toml")),
            Some(PathBuf::from("/etc/almanac/config.toml")),
            Some(PathBuf::from("./almanac.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Data overrides
        if let Some(root) = var("ALMANAC_ANALYTICS_ROOT") {
            self.data.analytics_root = root;
        }
        if let Some(enabled) = var("ALMANAC_USE_ROLLUPS").and_then(|v| parse_bool(&v)) {
            self.data.use_rollups = enabled;
        }

        // Cache overrides
        if let Some(size) = var("ALMANAC_CACHE_MAX_SIZE").and_then(|v| v.parse().ok()) {
            self.cache.max_size = size;
        }
        if let Some(ttl) = var("ALMANAC_CACHE_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.cache.default_ttl_secs = ttl;
        }

        // Logging overrides
        if let Some(level) = var("ALMANAC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("ALMANAC_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
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
    r#"# Almanac Configuration
#
# Environment variables override these settings:
# - ALMANAC_ANALYTICS_ROOT
# - ALMANAC_USE_ROLLUPS
# - ALMANAC_CACHE_MAX_SIZE
# - ALMANAC_CACHE_TTL_SECS
# - ALMANAC_LOG_LEVEL
# - ALMANAC_LOG_FORMAT

[data]
# Directory holding log/ (entry log + manifest.json) and rollups/
analytics_root = "~/.local/share/almanac"

# Answer eligible queries from the presence rollup when it exists
use_rollups = true

[cache]
# Maximum number of cached query results
max_size = 1024

# Time-to-live of a cached result (seconds)
default_ttl_secs = 300

# Prewarm the next day after a day listing
prewarm = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert!(config.data.use_rollups);
        assert_eq!(config.cache.max_size, 1024);
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.logging.format, "pretty");
        assert!(!config.data.analytics_root().starts_with("~"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("almanac.toml");
        std::fs::write(&path, "[cache]\nmax_size = 8\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache.max_size, 8);
        assert!(config.cache.prewarm);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[cache\nmax_size = ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ALMANAC_ANALYTICS_ROOT", "/srv/analytics"),
            ("ALMANAC_USE_ROLLUPS", "false"),
            ("ALMANAC_CACHE_MAX_SIZE", "16"),
            ("ALMANAC_CACHE_TTL_SECS", "not-a-number"),
            ("ALMANAC_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.data.analytics_root(), PathBuf::from("/srv/analytics"));
        assert!(!config.data.use_rollups);
        assert_eq!(config.cache.max_size, 16);
        assert_eq!(config.cache.default_ttl_secs, 300);
        assert_eq!(config.logging.format, "json");
    }
}
