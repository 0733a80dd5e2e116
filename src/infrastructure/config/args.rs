use super::loader_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "imagepipe",
    version,
    about = "Loads images through a cached, deduplicating pipeline",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Memory cache budget in MiB.
    #[arg(long, value_name = "MIB")]
    pub memory_cache_mb: Option<u64>,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH")]
    pub disk_cache_dir: Option<PathBuf>,

    /// Disable the disk cache.
    #[arg(long)]
    pub no_disk_cache: bool,

    /// Concurrent fetch and decode operations.
    #[arg(long, value_name = "N")]
    pub parallelism: Option<usize>,

    /// URIs or file paths to load.
    #[arg(required = true, value_name = "DATA")]
    pub data: Vec<String>,
}
