//! The loader: request entry point and owner of the shared resources.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::builder::{DefaultRequestOptions, ImageLoaderBuilder};
use super::interceptors::{
    EngineInterceptor, EventTrackingInterceptor, MemoryCacheInterceptor, PipelineOutcome,
};
use super::lazy::Lazy;
use super::{Chain, ComponentRegistry, Deduplicator, Disposable, Interceptor};
use crate::domain::entities::{
    CacheKey, DataSource, ErrorResult, ImageHandle, ImageRequest, ImageResult, Options, Precision,
    Size, SuccessResult, Transition,
};
use crate::domain::errors::{Cancelled, ImageError};
use crate::domain::ports::{EventListener, EventListenerFactory, FileSystem, NoopEventListener};
use crate::infrastructure::cache::{DiskCache, MemoryCache};

struct LoaderInner {
    defaults: DefaultRequestOptions,
    components: ComponentRegistry,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    memory_cache: Lazy<Option<Arc<MemoryCache>>>,
    disk_cache: Lazy<Option<DiskCache>>,
    #[cfg(feature = "network")]
    http_client: Lazy<Option<reqwest::Client>>,
    listener_factory: Option<Arc<dyn EventListenerFactory>>,
    file_system: Arc<dyn FileSystem>,
    deduplicator: Deduplicator<CacheKey, PipelineOutcome>,
    shutdown: CancellationToken,
    is_shut_down: AtomicBool,
}

/// Loads images through the interceptor chain.
///
/// Cloning is cheap; clones share caches, components and in-flight work.
#[derive(Clone)]
pub struct ImageLoader {
    inner: Arc<LoaderInner>,
}

impl ImageLoader {
    /// Starts configuring a loader.
    pub fn builder() -> ImageLoaderBuilder {
        ImageLoaderBuilder::new()
    }

    /// Returns a builder sharing this loader's caches, components and
    /// defaults.
    pub fn new_builder(&self) -> ImageLoaderBuilder {
        ImageLoaderBuilder::from_loader(self)
    }

    pub(super) fn from_builder(builder: ImageLoaderBuilder) -> Self {
        let mut interceptors: Vec<Arc<dyn Interceptor>> = Vec::new();
        interceptors.push(Arc::new(EventTrackingInterceptor));
        interceptors.extend(builder.components.interceptors().iter().cloned());
        interceptors.push(Arc::new(MemoryCacheInterceptor));
        interceptors.push(Arc::new(EngineInterceptor));

        Self {
            inner: Arc::new(LoaderInner {
                defaults: builder.defaults,
                components: builder.components,
                interceptors: interceptors.into(),
                memory_cache: builder.memory_cache,
                disk_cache: builder.disk_cache,
                #[cfg(feature = "network")]
                http_client: builder.http_client,
                listener_factory: builder.listener_factory,
                file_system: builder.file_system,
                deduplicator: Deduplicator::new(),
                shutdown: CancellationToken::new(),
                is_shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Starts `request` in the background.
    ///
    /// The request keeps running when the handle is dropped. If it is bound
    /// to an [`Attachment`](super::Attachment), detaching the attachment or
    /// binding a newer request cancels it.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn enqueue(&self, request: ImageRequest) -> Disposable {
        let token = self.inner.shutdown.child_token();
        let binding = request
            .attachment()
            .map(|attachment| (attachment.clone(), attachment.bind(&token)));
        let generation = binding.as_ref().map(|(_, generation)| *generation);
        let finished = Arc::new(AtomicBool::new(false));

        let task = {
            let loader = self.clone();
            let token = token.clone();
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                let result = loader.run_cancellable(request, &token, generation).await;
                finished.store(true, Ordering::Release);
                result
            })
        };

        let job = async move {
            task.await.unwrap_or_else(|e| {
                error!(error = %e, "Request task failed");
                Err(Cancelled)
            })
        }
        .boxed()
        .shared();

        Disposable::new(token, job, finished, binding)
    }

    /// Runs `request` on the calling task and returns its result.
    ///
    /// Dropping the returned future cancels the request.
    ///
    /// # Errors
    /// Returns [`Cancelled`] if the request was cancelled through its
    /// attachment or the loader was shut down.
    pub async fn execute(&self, request: ImageRequest) -> Result<ImageResult, Cancelled> {
        let token = self.inner.shutdown.child_token();
        let generation = request.attachment().map(|attachment| attachment.bind(&token));
        self.run_cancellable(request, &token, generation).await
    }

    async fn run_cancellable(
        &self,
        request: ImageRequest,
        token: &CancellationToken,
        generation: Option<u64>,
    ) -> Result<ImageResult, Cancelled> {
        let listener = self.listener_for(&request);
        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(data = %request.data(), "Request cancelled");
                listener.on_cancel(&request);
                Err(Cancelled)
            }
            result = self.run_request(&request, Arc::clone(&listener), generation) => Ok(result),
        }
    }

    async fn run_request(
        &self,
        request: &ImageRequest,
        listener: Arc<dyn EventListener>,
        generation: Option<u64>,
    ) -> ImageResult {
        listener.on_start(request);

        if request.data().is_none() {
            let result = ImageResult::Error(ErrorResult {
                image: self.fallback_image(request),
                request: request.clone(),
                error: Arc::new(ImageError::NullData),
            });
            self.deliver(request, &result, listener.as_ref());
            return result;
        }

        if let Some(attachment) = request.attachment()
            && !attachment.wait_until_active().await
        {
            // Detaching cancelled the token; the select observes it.
            std::future::pending::<()>().await;
        }

        let cached_placeholder = request
            .placeholder_memory_cache_key()
            .and_then(|key| self.memory_cache()?.peek(key))
            .map(|entry| entry.image);
        let is_placeholder_cached = cached_placeholder.is_some();
        if let Some(target) = request.target() {
            let placeholder = cached_placeholder.or_else(|| {
                request
                    .placeholder()
                    .or(self.inner.defaults.placeholder.as_ref())
                    .cloned()
            });
            target.on_start(placeholder.as_ref());
        }

        let chain = Chain::new(
            self.clone(),
            request.clone(),
            Arc::clone(&self.inner.interceptors),
            Arc::clone(&listener),
            is_placeholder_cached,
        );
        let run = AssertUnwindSafe(chain.run()).catch_unwind();
        let result = match self.inner.defaults.interceptor_dispatcher.run(run).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                error!(data = %request.data(), "Interceptor chain panicked");
                self.internal_error(request, ImageError::internal("interceptor chain panicked"))
            }
            Err(e) => self.internal_error(request, e),
        };

        if let (Some(generation), Some(attachment), ImageResult::Success(success)) =
            (generation, request.attachment(), &result)
        {
            let pins = success
                .memory_cache_key
                .as_ref()
                .and_then(|key| self.memory_cache()?.pin_guard(key))
                .into_iter()
                .collect();
            attachment.retain(generation, pins);
        }

        self.deliver(request, &result, listener.as_ref());
        result
    }

    fn deliver(&self, request: &ImageRequest, result: &ImageResult, listener: &dyn EventListener) {
        match result {
            ImageResult::Success(success) => {
                if let Some(target) = request.target() {
                    target.on_success(&success.image, self.transition_for(request, success));
                }
                listener.on_success(request, success);
            }
            ImageResult::Error(failure) => {
                if let Some(target) = request.target() {
                    target.on_error(failure.image.as_ref());
                }
                listener.on_error(request, failure);
            }
        }
    }

    /// Memory cache hits are shown without a transition.
    fn transition_for(&self, request: &ImageRequest, success: &SuccessResult) -> Transition {
        if success.data_source == DataSource::MemoryCache {
            return Transition::None;
        }
        request
            .transition()
            .unwrap_or(self.inner.defaults.transition)
    }

    fn internal_error(&self, request: &ImageRequest, error: ImageError) -> ImageResult {
        ImageResult::Error(ErrorResult {
            image: self.error_image(request),
            request: request.clone(),
            error: Arc::new(error),
        })
    }

    fn listener_for(&self, request: &ImageRequest) -> Arc<dyn EventListener> {
        if let Some(listener) = request.listener() {
            return Arc::clone(listener);
        }
        match &self.inner.listener_factory {
            Some(factory) => factory.create(request),
            None => Arc::new(NoopEventListener),
        }
    }

    pub(crate) fn error_image(&self, request: &ImageRequest) -> Option<ImageHandle> {
        request
            .error()
            .or(self.inner.defaults.error.as_ref())
            .cloned()
    }

    fn fallback_image(&self, request: &ImageRequest) -> Option<ImageHandle> {
        request
            .fallback()
            .or(self.inner.defaults.fallback.as_ref())
            .cloned()
            .or_else(|| self.error_image(request))
    }

    /// Resolves `request` against the loader defaults for `size`.
    #[must_use]
    pub fn options_for(&self, request: &ImageRequest, size: Size) -> Options {
        let defaults = &self.inner.defaults;
        let precision = request.precision().unwrap_or(defaults.precision);
        let allow_inexact_size = match precision {
            Precision::Exact => false,
            Precision::Inexact => true,
            Precision::Automatic => request.size().is_none(),
        };

        Options {
            size,
            scale: request.scale(),
            precision,
            allow_inexact_size,
            color_config: request.color_config().unwrap_or(defaults.color_config),
            disk_cache_key: request
                .disk_cache_key()
                .map(str::to_owned)
                .or_else(|| request.data().disk_cache_key()),
            memory_cache_policy: request
                .memory_cache_policy()
                .unwrap_or(defaults.memory_cache_policy),
            disk_cache_policy: request
                .disk_cache_policy()
                .unwrap_or(defaults.disk_cache_policy),
            network_cache_policy: request
                .network_cache_policy()
                .unwrap_or(defaults.network_cache_policy),
            file_system: Arc::clone(&self.inner.file_system),
            extras: request.extras().merged_over(&defaults.extras),
        }
    }

    /// Cancels all outstanding work, clears the memory cache and releases the
    /// HTTP client. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.inner.is_shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.deduplicator.cancel_all();
        if let Some(Some(cache)) = self.inner.memory_cache.peek() {
            cache.clear();
        }
        #[cfg(feature = "network")]
        self.inner.http_client.release();
        info!("Image loader shut down");
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shut_down.load(Ordering::Acquire)
    }

    /// The memory cache, created on first access.
    #[must_use]
    pub fn memory_cache(&self) -> Option<Arc<MemoryCache>> {
        self.inner.memory_cache.get()
    }

    /// The disk cache, opened on first access.
    #[must_use]
    pub fn disk_cache(&self) -> Option<DiskCache> {
        self.inner.disk_cache.get()
    }

    /// The HTTP client, created on first access. `None` after shutdown.
    #[cfg(feature = "network")]
    #[must_use]
    pub fn http_client(&self) -> Option<reqwest::Client> {
        self.inner.http_client.get()
    }

    /// File system used for local files.
    #[must_use]
    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.inner.file_system
    }

    /// Registered components, built-ins included.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.inner.components
    }

    /// Loader-level request defaults.
    #[must_use]
    pub fn defaults(&self) -> &DefaultRequestOptions {
        &self.inner.defaults
    }

    pub(super) fn listener_factory(&self) -> Option<Arc<dyn EventListenerFactory>> {
        self.inner.listener_factory.clone()
    }

    pub(crate) fn deduplicator(&self) -> &Deduplicator<CacheKey, PipelineOutcome> {
        &self.inner.deduplicator
    }

    #[cfg(test)]
    pub(crate) fn in_flight_count(&self) -> usize {
        self.inner.deduplicator.in_flight()
    }
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("defaults", &self.inner.defaults)
            .field("components", &self.inner.components)
            .field("is_shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
