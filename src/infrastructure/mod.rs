//! Infrastructure layer: cache tiers, built-in components and configuration.

/// Memory and disk caches.
pub mod cache;
/// Loader configuration.
pub mod config;
/// Built-in decoders.
pub mod decode;
/// Built-in fetchers.
pub mod fetch;

pub use cache::{CacheEntry, CacheStats, DiskCache, DiskMetadata, Editor, MemoryCache, PinGuard, Snapshot};
pub use config::{CliArgs, ImageLoaderConfig, LogLevel};
