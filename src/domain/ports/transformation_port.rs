//! Port definition for post-decode transformations.

use async_trait::async_trait;

use crate::domain::entities::{ImageHandle, Size};
use crate::domain::errors::ImageError;

/// Rewrites a decoded image, e.g. cropping or rounding corners.
#[async_trait]
pub trait Transformation: Send + Sync {
    /// Stable identity of this transformation and its parameters. Part of the
    /// memory cache key.
    fn cache_key(&self) -> String;

    /// Applies the transformation for the resolved `size`.
    async fn transform(&self, image: ImageHandle, size: Size) -> Result<ImageHandle, ImageError>;
}
