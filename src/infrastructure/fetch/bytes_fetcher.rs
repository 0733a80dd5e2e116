use async_trait::async_trait;
use bytes::Bytes;

use crate::application::ImageLoader;
use crate::domain::entities::{Data, DataSource, Options};
use crate::domain::errors::ImageError;
use crate::domain::ports::{FetchResult, Fetcher, FetcherFactory, SourceResult};

/// Serves in-memory blobs.
#[derive(Debug, Clone)]
pub struct BytesFetcher {
    bytes: Bytes,
}

impl BytesFetcher {
    /// Creates a fetcher over `bytes`.
    #[must_use]
    pub const fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

#[async_trait]
impl Fetcher for BytesFetcher {
    async fn fetch(&self) -> Result<FetchResult, ImageError> {
        Ok(FetchResult::Source(SourceResult {
            source: self.bytes.clone(),
            mime_type: None,
            data_source: DataSource::Memory,
        }))
    }
}

/// Accepts [`Data::Bytes`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesFetcherFactory;

impl FetcherFactory for BytesFetcherFactory {
    fn create(&self, data: &Data, _: &Options, _: &ImageLoader) -> Option<Box<dyn Fetcher>> {
        match data {
            Data::Bytes(bytes) => Some(Box::new(BytesFetcher::new(bytes.clone()))),
            _ => None,
        }
    }
}
