//! Memory cache stage, cache key computation and hit validation.

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::application::{Chain, Interceptor};
use crate::domain::entities::{
    CacheKey, Data, DataSource, Dimension, ImageRequest, ImageResult, Options, Size,
    SuccessResult, compute_size_multiplier,
};
use crate::domain::entities::{SIZE_EXTRA, TRANSFORMATIONS_EXTRA};
use crate::domain::ports::EventListener;
use crate::infrastructure::cache::CacheEntry;

/// Short-circuits with a cached image when one satisfies the request.
pub(crate) struct MemoryCacheInterceptor;

#[async_trait]
impl Interceptor for MemoryCacheInterceptor {
    async fn intercept(&self, chain: Chain) -> ImageResult {
        let request = chain.request().clone();
        let options = chain.options();
        let size = chain.size();
        let key = new_cache_key(&request, &options, size, chain.listener().as_ref()).await;

        if let Some(key) = &key
            && options.memory_cache_policy.read_enabled()
            && let Some(cache) = chain.loader().memory_cache()
            && let Some(entry) = cache.get(key)
        {
            if is_cache_value_valid(&entry, key, &options, size) {
                debug!(key = %key, "Serving image from memory cache");
                return ImageResult::Success(SuccessResult {
                    image: entry.image,
                    request,
                    data_source: DataSource::MemoryCache,
                    memory_cache_key: Some(key.clone()),
                    disk_cache_key: entry.disk_cache_key,
                    is_sampled: entry.is_sampled,
                    is_placeholder_cached: chain.is_placeholder_cached(),
                });
            }
            trace!(key = %key, "Cached image does not satisfy the requested size");
        }

        chain.with_memory_cache_key(key).proceed(request).await
    }
}

/// Computes the memory cache key of `request`, or `None` if it must not be
/// cached in memory.
///
/// An explicit request key wins. Otherwise URIs key on the URI string and
/// local files on their path plus modification time; in-memory blobs have no
/// key. Transformations add their keys and the resolved size as extras.
pub(crate) async fn new_cache_key(
    request: &ImageRequest,
    options: &Options,
    size: Size,
    listener: &dyn EventListener,
) -> Option<CacheKey> {
    listener.key_start(request);
    let key = match request.memory_cache_key() {
        Some(key) => Some(key.clone()),
        None => base_key(request.data(), options).await.map(|base| {
            let mut key = CacheKey::new(base);
            let transformations = request.transformations();
            if !transformations.is_empty() {
                let keys: Vec<String> = transformations.iter().map(|t| t.cache_key()).collect();
                key = key
                    .with_extra(TRANSFORMATIONS_EXTRA, keys.join("|"))
                    .with_extra(SIZE_EXTRA, size.to_string());
            }
            key
        }),
    };
    listener.key_end(request, key.as_ref());
    key
}

async fn base_key(data: &Data, options: &Options) -> Option<String> {
    if let Some(path) = data.local_path() {
        return match options.file_system.modified_millis(path).await {
            Ok(millis) => Some(format!("{}:{millis}", path.display())),
            Err(e) => {
                trace!(path = %path.display(), error = %e, "Cannot key local file");
                None
            }
        };
    }
    match data {
        Data::Uri(uri) => Some(uri.clone()),
        Data::Path(_) | Data::Bytes(_) | Data::None => None,
    }
}

/// Returns true if a cached image can serve a request for `size`.
///
/// An original size request needs an image that was not sampled. A
/// transformed image must have been produced for exactly this size.
/// Otherwise the image must be within one pixel of the target on the
/// constrained axes, or, for inexact requests, at least as large as needed
/// without having been sampled down past it.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn is_cache_value_valid(
    entry: &CacheEntry,
    key: &CacheKey,
    options: &Options,
    size: Size,
) -> bool {
    if size.is_original() {
        return !entry.is_sampled;
    }

    if let Some(transformation_size) = key.extras().get(SIZE_EXTRA) {
        return *transformation_size == size.to_string();
    }

    let src_width = entry.image.width();
    let src_height = entry.image.height();
    let multiplier = compute_size_multiplier(src_width, src_height, size, options.scale);

    let within_one = |dst: Dimension, src: f64| {
        dst.pixels()
            .is_some_and(|px| (f64::from(px) - src).abs() <= 1.0)
    };

    if options.allow_inexact_size {
        let down = multiplier.min(1.0);
        if within_one(size.width, down * f64::from(src_width))
            || within_one(size.height, down * f64::from(src_height))
        {
            return true;
        }
    } else {
        let width_ok = matches!(size.width, Dimension::Undefined)
            || within_one(size.width, f64::from(src_width));
        let height_ok = matches!(size.height, Dimension::Undefined)
            || within_one(size.height, f64::from(src_height));
        if width_ok && height_ok {
            return true;
        }
    }

    if (multiplier - 1.0).abs() > f64::EPSILON && !options.allow_inexact_size {
        return false;
    }
    if multiplier > 1.0 && entry.is_sampled {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Precision;
    use crate::test_support::{image, test_loader_builder};
    use test_case::test_case;

    fn options(precision: Precision, size: Option<Size>) -> Options {
        let loader = test_loader_builder().build();
        let mut builder = ImageRequest::builder("x").precision(precision);
        if let Some(size) = size {
            builder = builder.size(size);
        }
        let request = builder.build();
        loader.options_for(&request, size.unwrap_or_default())
    }

    fn entry(width: u32, height: u32, is_sampled: bool) -> CacheEntry {
        CacheEntry::new(image(width, height), DataSource::Network, is_sampled)
    }

    #[test_case(100, 100, false, Size::ORIGINAL, Precision::Exact, true ; "original unsampled")]
    #[test_case(100, 100, true, Size::ORIGINAL, Precision::Exact, false ; "original sampled")]
    #[test_case(100, 100, true, Size::new(100, 100), Precision::Exact, true ; "exact match")]
    #[test_case(100, 100, true, Size::new(101, 99), Precision::Exact, true ; "off by one")]
    #[test_case(100, 100, false, Size::new(50, 50), Precision::Exact, false ; "exact needs downscale")]
    #[test_case(100, 100, false, Size::new(50, 50), Precision::Inexact, true ; "inexact larger ok")]
    #[test_case(50, 50, true, Size::new(100, 100), Precision::Inexact, false ; "sampled never upscaled")]
    #[test_case(50, 50, false, Size::new(100, 100), Precision::Inexact, true ; "unsampled upscale inexact")]
    fn test_cache_value_validity(
        width: u32,
        height: u32,
        sampled: bool,
        size: Size,
        precision: Precision,
        expected: bool,
    ) {
        let opts = options(precision, Some(size));
        assert_eq!(
            is_cache_value_valid(&entry(width, height, sampled), &CacheKey::new("x"), &opts, size),
            expected
        );
    }

    #[test]
    fn test_transformation_size_must_match() {
        let key = CacheKey::new("x").with_extra(SIZE_EXTRA, "10x10");
        let opts = options(Precision::Inexact, Some(Size::new(10, 10)));

        assert!(is_cache_value_valid(&entry(10, 10, false), &key, &opts, Size::new(10, 10)));
        assert!(!is_cache_value_valid(&entry(10, 10, false), &key, &opts, Size::new(20, 20)));
    }
}
