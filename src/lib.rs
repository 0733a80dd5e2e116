//! imagepipe - an image loading pipeline.
//!
//! Requests flow through an ordered interceptor chain that resolves them from a
//! bounded in-memory cache, then a persistent disk cache, and finally from a
//! pluggable fetcher/decoder pair. Concurrent requests for the same image share a
//! single fetch, and every request can be cancelled on its own.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Request coordination: registry, interceptor chain, deduplication and the loader.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer: caches, built-in fetchers and decoders, configuration.
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod test_support;

pub use application::{
    Attachment, AttachmentState, Chain, ComponentRegistry, ComponentRegistryBuilder,
    Deduplicator, DefaultRequestOptions, Dispatcher, Disposable, ImageLoader, ImageLoaderBuilder,
    Interceptor,
};
pub use domain::entities::{
    CacheKey, CachePolicy, ColorConfig, Data, DataSource, Dimension, ErrorResult, Extras, Image,
    ImageHandle, ImageRequest, ImageRequestBuilder, ImageResult, Options, Precision, Scale, Size,
    SuccessResult, Transition,
};
pub use domain::errors::{CacheError, CacheResult, Cancelled, ImageError};
pub use domain::ports::{
    DecodeResult, Decoder, DecoderFactory, EventListener, EventListenerFactory, FetchResult,
    Fetcher, FetcherFactory, FileSystem, ImageFetchResult, SourceResult, Target, Transformation,
};
pub use infrastructure::{CacheEntry, CacheStats, DiskCache, Editor, MemoryCache, Snapshot};

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = "imagepipe";
