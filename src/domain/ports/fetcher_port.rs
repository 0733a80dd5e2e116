//! Port definition for fetchers.

use async_trait::async_trait;
use bytes::Bytes;

use crate::application::ImageLoader;
use crate::domain::entities::{Data, DataSource, ImageHandle, Options};
use crate::domain::errors::ImageError;

/// Raw encoded bytes produced by a fetcher.
#[derive(Debug, Clone)]
pub struct SourceResult {
    /// Encoded image bytes.
    pub source: Bytes,
    /// Mime type, if known.
    pub mime_type: Option<String>,
    /// Where the bytes came from.
    pub data_source: DataSource,
}

/// An already decoded image produced by a fetcher.
#[derive(Debug, Clone)]
pub struct ImageFetchResult {
    /// The image.
    pub image: ImageHandle,
    /// True if the image is below its original size.
    pub is_sampled: bool,
    /// Where the image came from.
    pub data_source: DataSource,
}

/// What a fetcher produced.
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// Bytes that still need a decoder.
    Source(SourceResult),
    /// A decoded image; no decoder runs.
    Image(ImageFetchResult),
}

/// Turns a data reference into bytes or an image.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs the fetch.
    async fn fetch(&self) -> Result<FetchResult, ImageError>;
}

/// Creates a [`Fetcher`] for data it supports.
///
/// Returning `None` means "not applicable"; the registry then tries the next
/// factory in registration order.
pub trait FetcherFactory: Send + Sync {
    /// Returns a fetcher if this factory handles `data`.
    fn create(&self, data: &Data, options: &Options, loader: &ImageLoader)
    -> Option<Box<dyn Fetcher>>;
}

impl<F> FetcherFactory for F
where
    F: Fn(&Data, &Options, &ImageLoader) -> Option<Box<dyn Fetcher>> + Send + Sync,
{
    fn create(
        &self,
        data: &Data,
        options: &Options,
        loader: &ImageLoader,
    ) -> Option<Box<dyn Fetcher>> {
        self(data, options, loader)
    }
}
