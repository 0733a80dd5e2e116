//! Loader configuration.

pub mod args;
pub mod loader_config;

pub use args::CliArgs;
pub use loader_config::{
    ConfigError, DEFAULT_TIMEOUT_SECS, ImageLoaderConfig, LogLevel, default_config_path,
    default_disk_cache_dir,
};
