//! Cache policies and data source classification.

use serde::{Deserialize, Serialize};

/// Read/write policy for one cache tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Read from and write to the tier.
    #[default]
    Enabled,
    /// Only read from the tier.
    ReadOnly,
    /// Only write to the tier.
    WriteOnly,
    /// Neither read nor write.
    Disabled,
}

impl CachePolicy {
    /// Returns true if reads are allowed.
    #[must_use]
    pub const fn read_enabled(self) -> bool {
        matches!(self, Self::Enabled | Self::ReadOnly)
    }

    /// Returns true if writes are allowed.
    #[must_use]
    pub const fn write_enabled(self) -> bool {
        matches!(self, Self::Enabled | Self::WriteOnly)
    }
}

/// Where a result's image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// Served from the in-memory image cache.
    MemoryCache,
    /// Read from memory, e.g. an in-memory blob.
    Memory,
    /// Read from disk, including the disk cache.
    Disk,
    /// Fetched over the network.
    Network,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory-cache"),
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}
