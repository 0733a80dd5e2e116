//! Request outcomes.

use std::sync::Arc;

use super::{CacheKey, DataSource, ImageHandle, ImageRequest};
use crate::domain::errors::ImageError;

/// Outcome of executing a request. Produced exactly once per execution.
#[derive(Debug, Clone)]
pub enum ImageResult {
    /// The image was loaded.
    Success(SuccessResult),
    /// The request failed.
    Error(ErrorResult),
}

impl ImageResult {
    /// The success or error image, if any.
    #[must_use]
    pub fn image(&self) -> Option<&ImageHandle> {
        match self {
            Self::Success(success) => Some(&success.image),
            Self::Error(error) => error.image.as_ref(),
        }
    }

    /// The request that produced this result.
    #[must_use]
    pub fn request(&self) -> &ImageRequest {
        match self {
            Self::Success(success) => &success.request,
            Self::Error(error) => &error.request,
        }
    }

    /// Returns true for [`ImageResult::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the success payload, if any.
    #[must_use]
    pub const fn as_success(&self) -> Option<&SuccessResult> {
        match self {
            Self::Success(success) => Some(success),
            Self::Error(_) => None,
        }
    }

    /// Returns the error payload, if any.
    #[must_use]
    pub const fn as_error(&self) -> Option<&ErrorResult> {
        match self {
            Self::Success(_) => None,
            Self::Error(error) => Some(error),
        }
    }
}

/// A successfully loaded image.
#[derive(Debug, Clone)]
pub struct SuccessResult {
    /// The decoded image.
    pub image: ImageHandle,
    /// The request as it reached the stage that produced the result.
    pub request: ImageRequest,
    /// Where the image came from.
    pub data_source: DataSource,
    /// Memory cache key the image is stored under, if any.
    pub memory_cache_key: Option<CacheKey>,
    /// Disk cache key of the source bytes, if any.
    pub disk_cache_key: Option<String>,
    /// True if the image was decoded below its original size.
    pub is_sampled: bool,
    /// True if a memory cached placeholder was shown while loading.
    pub is_placeholder_cached: bool,
}

/// A failed request.
#[derive(Debug, Clone)]
pub struct ErrorResult {
    /// Error or fallback image to show, if configured.
    pub image: Option<ImageHandle>,
    /// The failed request.
    pub request: ImageRequest,
    /// The originating cause.
    pub error: Arc<ImageError>,
}
