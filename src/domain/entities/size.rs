//! Target size, scale and precision.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One axis of a requested size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// An exact number of pixels.
    Pixels(u32),
    /// No constraint on this axis.
    Undefined,
}

impl Dimension {
    /// Returns the pixel value, if defined.
    #[must_use]
    pub const fn pixels(self) -> Option<u32> {
        match self {
            Self::Pixels(px) => Some(px),
            Self::Undefined => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pixels(px) => write!(f, "{px}"),
            Self::Undefined => write!(f, "-"),
        }
    }
}

/// Requested output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    /// Requested width.
    pub width: Dimension,
    /// Requested height.
    pub height: Dimension,
}

impl Size {
    /// Load at the image's original size.
    pub const ORIGINAL: Self = Self {
        width: Dimension::Undefined,
        height: Dimension::Undefined,
    };

    /// Creates a size with both axes defined.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width: Dimension::Pixels(width),
            height: Dimension::Pixels(height),
        }
    }

    /// Returns true if neither axis is constrained.
    #[must_use]
    pub const fn is_original(&self) -> bool {
        matches!(
            (self.width, self.height),
            (Dimension::Undefined, Dimension::Undefined)
        )
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::ORIGINAL
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_original() {
            write!(f, "original")
        } else {
            write!(f, "{}x{}", self.width, self.height)
        }
    }
}

/// How an image is fit into the requested size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    /// Scale so both axes are at least the requested size.
    #[default]
    Fill,
    /// Scale so both axes fit inside the requested size.
    Fit,
}

/// Whether the output must match the requested size exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Output must match the requested size.
    Exact,
    /// Output may be larger than the requested size.
    Inexact,
    /// Exact when the request carries an explicit size, inexact otherwise.
    #[default]
    Automatic,
}

/// Scale factor to apply to a `src` image to satisfy a `dst` size.
///
/// Undefined destination axes take the source value, so only constrained axes
/// influence the multiplier.
#[must_use]
pub fn compute_size_multiplier(src_width: u32, src_height: u32, dst: Size, scale: Scale) -> f64 {
    if src_width == 0 || src_height == 0 {
        return 1.0;
    }
    let dst_width = dst.width.pixels().unwrap_or(src_width);
    let dst_height = dst.height.pixels().unwrap_or(src_height);
    let width_percent = f64::from(dst_width) / f64::from(src_width);
    let height_percent = f64::from(dst_height) / f64::from(src_height);

    match (dst.width, dst.height) {
        (Dimension::Undefined, Dimension::Undefined) => 1.0,
        (Dimension::Pixels(_), Dimension::Undefined) => width_percent,
        (Dimension::Undefined, Dimension::Pixels(_)) => height_percent,
        (Dimension::Pixels(_), Dimension::Pixels(_)) => match scale {
            Scale::Fill => width_percent.max(height_percent),
            Scale::Fit => width_percent.min(height_percent),
        },
    }
}
