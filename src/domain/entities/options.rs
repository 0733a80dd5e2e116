//! Resolved execution parameters for one request.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{CachePolicy, Extras, Precision, Scale, Size};
use crate::domain::ports::FileSystem;

/// Preferred pixel layout for decoded output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorConfig {
    /// Keep whatever layout the decoder produces.
    #[default]
    Auto,
    /// 8-bit RGBA.
    Rgba8,
    /// 8-bit RGB, dropping alpha.
    Rgb8,
    /// 8-bit grayscale.
    Luma8,
}

/// Request parameters resolved against the loader defaults.
///
/// Built once per chain stage from the current request and size, and never
/// mutated afterwards.
#[derive(Clone)]
pub struct Options {
    /// Resolved target size.
    pub size: Size,
    /// How the image is fit into `size`.
    pub scale: Scale,
    /// Resolved precision.
    pub precision: Precision,
    /// Whether the output may be larger than `size`.
    pub allow_inexact_size: bool,
    /// Preferred pixel layout.
    pub color_config: ColorConfig,
    /// Key under which source bytes are stored in the disk cache.
    pub disk_cache_key: Option<String>,
    /// Memory cache policy.
    pub memory_cache_policy: CachePolicy,
    /// Disk cache policy.
    pub disk_cache_policy: CachePolicy,
    /// Network policy. Disabling writes has no effect.
    pub network_cache_policy: CachePolicy,
    /// File system used by local fetchers and keyers.
    pub file_system: Arc<dyn FileSystem>,
    /// Loader extras overlaid with request extras.
    pub extras: Extras,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("size", &self.size)
            .field("scale", &self.scale)
            .field("precision", &self.precision)
            .field("allow_inexact_size", &self.allow_inexact_size)
            .field("color_config", &self.color_config)
            .field("disk_cache_key", &self.disk_cache_key)
            .field("memory_cache_policy", &self.memory_cache_policy)
            .field("disk_cache_policy", &self.disk_cache_policy)
            .field("network_cache_policy", &self.network_cache_policy)
            .field("extras", &self.extras)
            .finish_non_exhaustive()
    }
}
