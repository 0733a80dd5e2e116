//! Loader configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::args::CliArgs;
use crate::domain::entities::{CachePolicy, Precision};
use crate::infrastructure::cache::{disk_cache, memory_cache};

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "imagepipe";
const APP_NAME: &str = "imagepipe";
const CONFIG_FILE_NAME: &str = "config.toml";
const DISK_CACHE_DIR_NAME: &str = "image_cache";

/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Settings a loader is built from.
///
/// Every field is optional in the file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLoaderConfig {
    /// Memory cache budget in bytes.
    pub memory_cache_max_bytes: u64,
    /// Disk cache directory. `None` disables the disk cache.
    pub disk_cache_dir: Option<PathBuf>,
    /// Disk cache budget in bytes.
    pub disk_cache_max_bytes: u64,
    /// Concurrent fetch and decode operations.
    pub max_parallelism: usize,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Default precision.
    pub precision: Precision,
    /// Default crossfade duration; zero disables transitions.
    pub crossfade_millis: u32,
    /// Default memory cache policy.
    pub memory_cache_policy: CachePolicy,
    /// Default disk cache policy.
    pub disk_cache_policy: CachePolicy,
    /// Default network policy.
    pub network_cache_policy: CachePolicy,
    /// Log verbosity.
    pub log_level: LogLevel,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            memory_cache_max_bytes: memory_cache::DEFAULT_MAX_BYTES,
            disk_cache_dir: default_disk_cache_dir(),
            disk_cache_max_bytes: disk_cache::DEFAULT_MAX_SIZE,
            max_parallelism: crate::application::DEFAULT_PARALLELISM,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            precision: Precision::default(),
            crossfade_millis: 0,
            memory_cache_policy: CachePolicy::Enabled,
            disk_cache_policy: CachePolicy::Enabled,
            network_cache_policy: CachePolicy::Enabled,
            log_level: LogLevel::Info,
        }
    }
}

impl ImageLoaderConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    /// Returns `ConfigError` if the document is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads the configuration at `path`, or the default location if `None`.
    /// A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            debug!("No configuration directory, using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }
        info!(path = %path.display(), "Loading configuration");
        Self::from_toml_str(&fs::read_to_string(&path)?)
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(megabytes) = args.memory_cache_mb {
            self.memory_cache_max_bytes = megabytes * 1024 * 1024;
        }
        if let Some(dir) = &args.disk_cache_dir {
            self.disk_cache_dir = Some(dir.clone());
        }
        if args.no_disk_cache {
            self.disk_cache_dir = None;
        }
        if let Some(parallelism) = args.parallelism {
            self.max_parallelism = parallelism;
        }
    }
}

/// Returns the default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Returns the default disk cache directory.
#[must_use]
pub fn default_disk_cache_dir() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.cache_dir().join(DISK_CACHE_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = ImageLoaderConfig::from_toml_str(
            r#"
            memory_cache_max_bytes = 1024
            precision = "exact"
            disk_cache_policy = "read_only"
            "#,
        )
        .unwrap();

        assert_eq!(config.memory_cache_max_bytes, 1024);
        assert_eq!(config.precision, Precision::Exact);
        assert_eq!(config.disk_cache_policy, CachePolicy::ReadOnly);
        assert_eq!(config.disk_cache_max_bytes, disk_cache::DEFAULT_MAX_SIZE);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        assert!(matches!(
            ImageLoaderConfig::from_toml_str("max_parallelism = \"many\""),
            Err(ConfigError::TomlDe(_))
        ));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ImageLoaderConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, ImageLoaderConfig::default());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_parallelism = 8\ncrossfade_millis = 200\n").unwrap();

        let config = ImageLoaderConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_parallelism, 8);
        assert_eq!(config.crossfade_millis, 200);
    }

    #[test]
    fn test_args_override_file() {
        let mut config = ImageLoaderConfig::default();
        let args = CliArgs::parse_from([
            "imagepipe",
            "--memory-cache-mb",
            "2",
            "--no-disk-cache",
            "--log-level",
            "debug",
            "https://example.com/a.png",
        ]);

        config.merge_with_args(&args);

        assert_eq!(config.memory_cache_max_bytes, 2 * 1024 * 1024);
        assert_eq!(config.disk_cache_dir, None);
        assert_eq!(config.log_level, LogLevel::Debug);
    }
}
