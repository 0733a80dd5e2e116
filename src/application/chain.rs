//! The interceptor chain a request runs through.

use std::sync::Arc;

use async_trait::async_trait;

use super::ImageLoader;
use crate::domain::entities::{CacheKey, ErrorResult, ImageRequest, ImageResult, Options, Size};
use crate::domain::errors::ImageError;
use crate::domain::ports::EventListener;

/// A chain stage.
///
/// An interceptor either returns a result directly or calls
/// [`Chain::proceed`] once to run the remaining stages, optionally with a
/// rewritten request. `proceed` consumes the chain, so a stage cannot continue
/// twice.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Runs this stage.
    async fn intercept(&self, chain: Chain) -> ImageResult;
}

/// The continuation handed to an [`Interceptor`].
///
/// A chain cannot be duplicated to continue twice:
///
/// ```compile_fail
/// fn continue_twice(chain: imagepipe::Chain) -> (imagepipe::Chain, imagepipe::Chain) {
///     (chain.clone(), chain)
/// }
/// ```
pub struct Chain {
    loader: ImageLoader,
    initial_request: ImageRequest,
    request: ImageRequest,
    size: Size,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    listener: Arc<dyn EventListener>,
    is_placeholder_cached: bool,
    memory_cache_key: Option<Option<CacheKey>>,
}

impl Chain {
    pub(crate) fn new(
        loader: ImageLoader,
        request: ImageRequest,
        interceptors: Arc<[Arc<dyn Interceptor>]>,
        listener: Arc<dyn EventListener>,
        is_placeholder_cached: bool,
    ) -> Self {
        Self {
            size: request.size().unwrap_or_default(),
            loader,
            initial_request: request.clone(),
            request,
            interceptors,
            index: 0,
            listener,
            is_placeholder_cached,
            memory_cache_key: None,
        }
    }

    /// The request as the caller submitted it.
    #[must_use]
    pub fn initial_request(&self) -> &ImageRequest {
        &self.initial_request
    }

    /// The request as it reached this stage.
    #[must_use]
    pub fn request(&self) -> &ImageRequest {
        &self.request
    }

    /// The resolved target size.
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Replaces the target size for the remaining stages.
    #[must_use]
    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self.memory_cache_key = None;
        self
    }

    /// Options resolved from the current request and size.
    #[must_use]
    pub fn options(&self) -> Options {
        self.loader.options_for(&self.request, self.size)
    }

    /// The loader running this chain.
    #[must_use]
    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    /// The request's event listener.
    #[must_use]
    pub fn listener(&self) -> &Arc<dyn EventListener> {
        &self.listener
    }

    /// True if a memory cached placeholder was shown for this request.
    #[must_use]
    pub fn is_placeholder_cached(&self) -> bool {
        self.is_placeholder_cached
    }

    /// Memory cache key already computed for the current request, if any.
    pub(crate) fn memory_cache_key(&self) -> Option<&Option<CacheKey>> {
        self.memory_cache_key.as_ref()
    }

    pub(crate) fn with_memory_cache_key(mut self, key: Option<CacheKey>) -> Self {
        self.memory_cache_key = Some(key);
        self
    }

    /// Runs the remaining stages with `request`.
    pub async fn proceed(self, request: ImageRequest) -> ImageResult {
        let Some(interceptor) = self.interceptors.get(self.index).cloned() else {
            return ImageResult::Error(ErrorResult {
                image: None,
                request,
                error: Arc::new(ImageError::internal("interceptor chain ended without a result")),
            });
        };
        let memory_cache_key = if same_request(&self.request, &request) {
            self.memory_cache_key
        } else {
            None
        };
        let next = Self {
            request,
            index: self.index + 1,
            memory_cache_key,
            ..self
        };
        interceptor.intercept(next).await
    }

    /// Runs the whole chain with the initial request.
    pub(crate) async fn run(self) -> ImageResult {
        let request = self.request.clone();
        self.proceed(request).await
    }
}

/// A rewritten request drops any key computed for the previous one.
fn same_request(a: &ImageRequest, b: &ImageRequest) -> bool {
    a.data() == b.data()
        && a.memory_cache_key() == b.memory_cache_key()
        && a.size() == b.size()
        && a.transformations().len() == b.transformations().len()
        && a
            .transformations()
            .iter()
            .zip(b.transformations())
            .all(|(x, y)| Arc::ptr_eq(x, y))
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("request", &self.request)
            .field("size", &self.size)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
