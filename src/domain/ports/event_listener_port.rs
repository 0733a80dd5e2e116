//! Port for request lifecycle events.

use std::sync::Arc;

use crate::domain::entities::{CacheKey, ErrorResult, ImageHandle, ImageRequest, ImageResult, Options, SuccessResult};
use crate::domain::ports::{DecodeResult, FetchResult};

/// Observes the stages of a request. Every callback defaults to a no-op.
///
/// Fetch and decode callbacks fire only for the request whose execution
/// started the shared work; requests that joined an in-flight load see just
/// their start and end events.
#[allow(unused_variables)]
pub trait EventListener: Send + Sync {
    /// The request was accepted.
    fn on_start(&self, request: &ImageRequest) {}

    /// The interceptor chain started.
    fn chain_start(&self, request: &ImageRequest) {}

    /// The interceptor chain returned.
    fn chain_end(&self, request: &ImageRequest, result: &ImageResult) {}

    /// Memory cache key computation started.
    fn key_start(&self, request: &ImageRequest) {}

    /// Memory cache key computation finished.
    fn key_end(&self, request: &ImageRequest, key: Option<&CacheKey>) {}

    /// A fetcher is about to run.
    fn fetch_start(&self, request: &ImageRequest, options: &Options) {}

    /// A fetcher returned.
    fn fetch_end(&self, request: &ImageRequest, options: &Options, result: Option<&FetchResult>) {}

    /// A decoder is about to run.
    fn decode_start(&self, request: &ImageRequest, options: &Options) {}

    /// A decoder returned.
    fn decode_end(&self, request: &ImageRequest, options: &Options, result: Option<&DecodeResult>) {}

    /// Transformations are about to run.
    fn transform_start(&self, request: &ImageRequest, input: &ImageHandle) {}

    /// Transformations finished.
    fn transform_end(&self, request: &ImageRequest, output: &ImageHandle) {}

    /// The request was cancelled.
    fn on_cancel(&self, request: &ImageRequest) {}

    /// The request failed.
    fn on_error(&self, request: &ImageRequest, result: &ErrorResult) {}

    /// The request succeeded.
    fn on_success(&self, request: &ImageRequest, result: &SuccessResult) {}
}

/// Listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventListener;

impl EventListener for NoopEventListener {}

/// Creates one listener per request.
pub trait EventListenerFactory: Send + Sync {
    /// Returns the listener for `request`.
    fn create(&self, request: &ImageRequest) -> Arc<dyn EventListener>;
}

impl<F> EventListenerFactory for F
where
    F: Fn(&ImageRequest) -> Arc<dyn EventListener> + Send + Sync,
{
    fn create(&self, request: &ImageRequest) -> Arc<dyn EventListener> {
        self(request)
    }
}
