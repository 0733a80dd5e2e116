//! Port definition for decoders.

use async_trait::async_trait;

use super::SourceResult;
use crate::application::ImageLoader;
use crate::domain::entities::{ImageHandle, Options};
use crate::domain::errors::ImageError;

/// A decoded image and whether it was sampled below its original size.
#[derive(Debug, Clone)]
pub struct DecodeResult {
    /// The decoded image.
    pub image: ImageHandle,
    /// True if decoded below the original size.
    pub is_sampled: bool,
}

/// Turns encoded bytes into an image.
#[async_trait]
pub trait Decoder: Send + Sync {
    /// Performs the decode.
    async fn decode(&self) -> Result<DecodeResult, ImageError>;
}

/// Creates a [`Decoder`] for sources it supports.
pub trait DecoderFactory: Send + Sync {
    /// Returns a decoder if this factory handles `source`.
    fn create(
        &self,
        source: &SourceResult,
        options: &Options,
        loader: &ImageLoader,
    ) -> Option<Box<dyn Decoder>>;
}

impl<F> DecoderFactory for F
where
    F: Fn(&SourceResult, &Options, &ImageLoader) -> Option<Box<dyn Decoder>> + Send + Sync,
{
    fn create(
        &self,
        source: &SourceResult,
        options: &Options,
        loader: &ImageLoader,
    ) -> Option<Box<dyn Decoder>> {
        self(source, options, loader)
    }
}
