//! The decoded image abstraction.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// A decoded image.
///
/// The pipeline never looks inside an image; it only needs its dimensions for
/// size validation and its byte size for memory cache accounting.
pub trait Image: Send + Sync + Debug {
    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Approximate number of bytes the image occupies in memory.
    fn byte_size(&self) -> u64;

    /// Access to the concrete type for consumers that want to downcast.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a decoded image. Identity (`Arc::ptr_eq`) is preserved
/// across memory cache hits.
pub type ImageHandle = Arc<dyn Image>;

#[cfg(feature = "image")]
impl Image for image::DynamicImage {
    fn width(&self) -> u32 {
        image::GenericImageView::width(self)
    }

    fn height(&self) -> u32 {
        image::GenericImageView::height(self)
    }

    fn byte_size(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
