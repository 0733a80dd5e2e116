//! Terminal stage: disk cache, deduplicated fetch and decode, memory write.

use std::convert::identity;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::new_cache_key;
use crate::application::deduplicator::FlightError;
use crate::application::{Chain, ImageLoader, Interceptor};
use crate::domain::entities::{
    CacheKey, DataSource, ErrorResult, ImageHandle, ImageRequest, ImageResult, Options, Size,
    SuccessResult,
};
use crate::domain::errors::{CacheResult, ImageError};
use crate::domain::ports::{DecodeResult, EventListener, FetchResult, SourceResult};
use crate::infrastructure::cache::{CacheEntry, DiskMetadata, Editor};

const FLIGHT_EXTRA: &str = "imagepipe#flight";

/// What one run of the fetch/decode pipeline produced.
#[derive(Debug, Clone)]
pub(crate) struct PipelineOutput {
    image: ImageHandle,
    data_source: DataSource,
    is_sampled: bool,
    disk_cache_key: Option<String>,
}

/// Shared by every caller joined to the same producer.
pub(crate) type PipelineOutcome = Result<PipelineOutput, Arc<ImageError>>;

/// Resolves the request from the disk cache or a fetcher and decoder, and
/// writes the decoded image to the memory cache.
pub(crate) struct EngineInterceptor;

#[async_trait]
impl Interceptor for EngineInterceptor {
    async fn intercept(&self, chain: Chain) -> ImageResult {
        let request = chain.request().clone();
        let options = chain.options();
        let size = chain.size();
        let loader = chain.loader().clone();
        let listener = Arc::clone(chain.listener());

        let key = match chain.memory_cache_key() {
            Some(key) => key.clone(),
            None => new_cache_key(&request, &options, size, listener.as_ref()).await,
        };

        let outcome = match &key {
            Some(key) => {
                let producer = {
                    let loader = loader.clone();
                    let request = request.clone();
                    let options = options.clone();
                    let listener = Arc::clone(&listener);
                    move || async move {
                        run_pipeline(&loader, &request, &options, size, listener.as_ref()).await
                    }
                };
                let flight = flight_key(key, &options, size);
                match loader.deduplicator().execute(flight, producer).await {
                    Ok(outcome) => outcome,
                    Err(FlightError::Cancelled) => Err(Arc::new(ImageError::internal(
                        "in-flight request was cancelled",
                    ))),
                    Err(FlightError::Panicked) => {
                        Err(Arc::new(ImageError::internal("image pipeline panicked")))
                    }
                }
            }
            None => run_pipeline(&loader, &request, &options, size, listener.as_ref()).await,
        };

        match outcome {
            Ok(output) => {
                let mut memory_cache_key = None;
                if let Some(key) = key
                    && options.memory_cache_policy.write_enabled()
                    && let Some(cache) = loader.memory_cache()
                {
                    let entry =
                        CacheEntry::new(output.image.clone(), output.data_source, output.is_sampled)
                            .with_disk_cache_key(output.disk_cache_key.clone());
                    cache.set(key.clone(), entry);
                    if cache.contains(&key) {
                        memory_cache_key = Some(key);
                    }
                }
                ImageResult::Success(SuccessResult {
                    image: output.image,
                    request,
                    data_source: output.data_source,
                    memory_cache_key,
                    disk_cache_key: output.disk_cache_key,
                    is_sampled: output.is_sampled,
                    is_placeholder_cached: chain.is_placeholder_cached(),
                })
            }
            Err(error) => {
                debug!(data = %request.data(), error = %error, "Image request failed");
                ImageResult::Error(ErrorResult {
                    image: loader.error_image(&request),
                    request,
                    error,
                })
            }
        }
    }
}

/// Requests only share a producer when they would decode to the same output.
/// A memory cache key alone does not pin the decode size unless the request
/// has transformations.
fn flight_key(key: &CacheKey, options: &Options, size: Size) -> CacheKey {
    key.clone().with_extra(
        FLIGHT_EXTRA,
        format!(
            "{size}|{:?}|{:?}|{}|{:?}",
            options.scale, options.precision, options.allow_inexact_size, options.color_config
        ),
    )
}

/// Runs disk read, fetch, disk write, decode and transformations once.
async fn run_pipeline(
    loader: &ImageLoader,
    request: &ImageRequest,
    options: &Options,
    size: Size,
    listener: &dyn EventListener,
) -> PipelineOutcome {
    let fetched = match read_disk_cache(loader, options).await {
        Some(source) => FetchResult::Source(source),
        None => {
            let fetched = fetch(loader, request, options, listener).await?;
            if let FetchResult::Source(source) = &fetched {
                write_disk_cache(loader, options, source).await;
            }
            fetched
        }
    };

    let (image, is_sampled, data_source) = match fetched {
        FetchResult::Image(result) => (result.image, result.is_sampled, result.data_source),
        FetchResult::Source(source) => {
            let data_source = source.data_source;
            let decoded = decode(loader, request, options, source, listener).await?;
            (decoded.image, decoded.is_sampled, data_source)
        }
    };

    let image = transform(loader, request, size, image, listener).await?;

    Ok(PipelineOutput {
        image,
        data_source,
        is_sampled,
        disk_cache_key: options.disk_cache_key.clone(),
    })
}

async fn read_disk_cache(loader: &ImageLoader, options: &Options) -> Option<SourceResult> {
    if !options.disk_cache_policy.read_enabled() {
        return None;
    }
    let key = options.disk_cache_key.as_deref()?;
    let mut snapshot = loader.disk_cache()?.get(key).await?;

    let source = match snapshot.read_data().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read disk cache entry");
            return None;
        }
    };
    let mime_type = match snapshot.read_metadata().await {
        Ok(metadata) => metadata.and_then(|m| m.mime_type),
        Err(e) => {
            trace!(key = %key, error = %e, "Ignoring unreadable disk cache metadata");
            None
        }
    };

    debug!(key = %key, size = source.len(), "Serving source from disk cache");
    Some(SourceResult {
        source,
        mime_type,
        data_source: DataSource::Disk,
    })
}

async fn write_disk_cache(loader: &ImageLoader, options: &Options, source: &SourceResult) {
    if source.data_source != DataSource::Network || !options.disk_cache_policy.write_enabled() {
        return;
    }
    let Some(key) = options.disk_cache_key.as_deref() else {
        return;
    };
    let Some(disk_cache) = loader.disk_cache() else {
        return;
    };
    let Some(editor) = disk_cache.edit(key) else {
        debug!(key = %key, "Disk cache entry is being written elsewhere, skipping");
        return;
    };

    let metadata = DiskMetadata::new(key, source.mime_type.clone());
    if let Err(e) = commit_to_disk(editor, &source.source, &metadata).await {
        warn!(key = %key, error = %e, "Failed to write disk cache entry");
    }
}

/// Dropping the editor on any error path aborts the edit.
async fn commit_to_disk(
    mut editor: Editor,
    bytes: &Bytes,
    metadata: &DiskMetadata,
) -> CacheResult<()> {
    editor.write_data(bytes).await?;
    editor.write_metadata(metadata).await?;
    editor.commit().await
}

async fn fetch(
    loader: &ImageLoader,
    request: &ImageRequest,
    options: &Options,
    listener: &dyn EventListener,
) -> Result<FetchResult, Arc<ImageError>> {
    let Some((fetcher, index)) = loader
        .components()
        .new_fetcher(request.data(), options, loader, 0)
    else {
        return Err(Arc::new(ImageError::no_fetcher(request.data())));
    };
    trace!(data = %request.data(), factory = index, "Fetching");

    listener.fetch_start(request, options);
    let result = loader
        .defaults()
        .fetcher_dispatcher
        .run(async move { fetcher.fetch().await })
        .await
        .and_then(identity);
    listener.fetch_end(request, options, result.as_ref().ok());
    result.map_err(Arc::new)
}

async fn decode(
    loader: &ImageLoader,
    request: &ImageRequest,
    options: &Options,
    source: SourceResult,
    listener: &dyn EventListener,
) -> Result<DecodeResult, Arc<ImageError>> {
    let Some((decoder, index)) = loader
        .components()
        .new_decoder(&source, options, loader, 0)
    else {
        return Err(Arc::new(ImageError::no_decoder(source.mime_type.as_deref())));
    };
    trace!(data = %request.data(), factory = index, "Decoding");

    listener.decode_start(request, options);
    let result = loader
        .defaults()
        .decoder_dispatcher
        .run(async move { decoder.decode().await })
        .await
        .and_then(identity);
    listener.decode_end(request, options, result.as_ref().ok());
    result.map_err(Arc::new)
}

async fn transform(
    loader: &ImageLoader,
    request: &ImageRequest,
    size: Size,
    image: ImageHandle,
    listener: &dyn EventListener,
) -> Result<ImageHandle, Arc<ImageError>> {
    if request.transformations().is_empty() {
        return Ok(image);
    }

    listener.transform_start(request, &image);
    let mut image = image;
    for transformation in request.transformations() {
        let transformation = Arc::clone(transformation);
        let input = image;
        image = loader
            .defaults()
            .transformation_dispatcher
            .run(async move { transformation.transform(input, size).await })
            .await
            .and_then(identity)
            .map_err(Arc::new)?;
    }
    listener.transform_end(request, &image);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Precision;
    use crate::test_support::test_loader_builder;

    fn key_for(request: &ImageRequest, size: Size) -> CacheKey {
        let loader = test_loader_builder().build();
        let options = loader.options_for(request, size);
        flight_key(&CacheKey::new("a"), &options, size)
    }

    #[test]
    fn test_flight_key_separates_sizes() {
        let original = ImageRequest::new("a");
        let small = ImageRequest::builder("a").size(Size::new(10, 10)).build();

        assert_ne!(
            key_for(&original, Size::ORIGINAL),
            key_for(&small, Size::new(10, 10))
        );
        assert_eq!(
            key_for(&small, Size::new(10, 10)),
            key_for(&small, Size::new(10, 10))
        );
    }

    #[test]
    fn test_flight_key_separates_precision() {
        let exact = ImageRequest::builder("a")
            .size(Size::new(10, 10))
            .precision(Precision::Exact)
            .build();
        let inexact = ImageRequest::builder("a")
            .size(Size::new(10, 10))
            .precision(Precision::Inexact)
            .build();

        assert_ne!(
            key_for(&exact, Size::new(10, 10)),
            key_for(&inexact, Size::new(10, 10))
        );
    }
}
