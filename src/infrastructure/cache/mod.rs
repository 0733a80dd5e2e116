//! Memory and disk cache tiers.

pub mod disk_cache;
pub mod memory_cache;

pub use disk_cache::{DiskCache, DiskMetadata, Editor, Snapshot};
pub use memory_cache::{CacheEntry, CacheStats, MemoryCache, PinGuard};
