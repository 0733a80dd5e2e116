//! Stub components shared by unit tests.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::application::{ComponentRegistry, ImageLoader, ImageLoaderBuilder};
use crate::domain::entities::{
    Data, DataSource, ErrorResult, Image, ImageHandle, ImageRequest, Options, SuccessResult,
    Transition,
};
use crate::domain::errors::ImageError;
use crate::domain::ports::{
    DecodeResult, Decoder, DecoderFactory, EventListener, FetchResult, Fetcher, FetcherFactory,
    SourceResult, Target,
};

/// Decoded image stand-in with fixed dimensions.
#[derive(Debug)]
pub(crate) struct TestImage {
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

impl Image for TestImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn byte_size(&self) -> u64 {
        self.bytes
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An RGBA-sized image.
pub(crate) fn image(width: u32, height: u32) -> ImageHandle {
    Arc::new(TestImage {
        width,
        height,
        bytes: u64::from(width) * u64::from(height) * 4,
    })
}

/// A 1x1 image accounted as `bytes` bytes.
pub(crate) fn image_with_bytes(bytes: u64) -> ImageHandle {
    Arc::new(TestImage {
        width: 1,
        height: 1,
        bytes,
    })
}

/// Returns empty network bytes.
#[derive(Debug, Default)]
pub(crate) struct StubFetcher {
    pub source: Bytes,
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self) -> Result<FetchResult, ImageError> {
        Ok(FetchResult::Source(SourceResult {
            source: self.source.clone(),
            mime_type: Some("image/test".into()),
            data_source: DataSource::Network,
        }))
    }
}

/// Fetches any non-file URI, returning the URI itself as source bytes.
#[derive(Clone, Default)]
pub(crate) struct CountingFetcherFactory {
    pub started: Arc<AtomicUsize>,
    pub completed: Arc<AtomicUsize>,
    pub delay: Option<Duration>,
}

impl CountingFetcherFactory {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

struct CountingFetcher {
    uri: String,
    factory: CountingFetcherFactory,
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self) -> Result<FetchResult, ImageError> {
        self.factory.started.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.factory.delay {
            tokio::time::sleep(delay).await;
        }
        self.factory.completed.fetch_add(1, Ordering::SeqCst);
        Ok(FetchResult::Source(SourceResult {
            source: Bytes::from(self.uri.clone()),
            mime_type: Some("image/test".into()),
            data_source: DataSource::Network,
        }))
    }
}

impl FetcherFactory for CountingFetcherFactory {
    fn create(&self, data: &Data, _: &Options, _: &ImageLoader) -> Option<Box<dyn Fetcher>> {
        match data {
            Data::Uri(uri) if data.local_path().is_none() => Some(Box::new(CountingFetcher {
                uri: uri.clone(),
                factory: self.clone(),
            })),
            _ => None,
        }
    }
}

/// Decodes anything to a 100x100 image, except sources starting with
/// `corrupt`.
#[derive(Clone, Default)]
pub(crate) struct CountingDecoderFactory {
    pub calls: Arc<AtomicUsize>,
}

impl CountingDecoderFactory {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct CountingDecoder {
    source: Bytes,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Decoder for CountingDecoder {
    async fn decode(&self) -> Result<DecodeResult, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.source.starts_with(b"corrupt") {
            return Err(ImageError::decode("corrupt source"));
        }
        Ok(DecodeResult {
            image: image(100, 100),
            is_sampled: false,
        })
    }
}

impl DecoderFactory for CountingDecoderFactory {
    fn create(
        &self,
        source: &SourceResult,
        _: &Options,
        _: &ImageLoader,
    ) -> Option<Box<dyn Decoder>> {
        Some(Box::new(CountingDecoder {
            source: source.source.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

/// What a [`RecordingTarget`] was called with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TargetEvent {
    Start { has_placeholder: bool },
    Success { transition: Transition },
    Error { has_image: bool },
}

#[derive(Default)]
pub(crate) struct RecordingTarget {
    pub events: Mutex<Vec<TargetEvent>>,
}

impl RecordingTarget {
    pub fn events(&self) -> Vec<TargetEvent> {
        self.events.lock().clone()
    }
}

impl Target for RecordingTarget {
    fn on_start(&self, placeholder: Option<&ImageHandle>) {
        self.events.lock().push(TargetEvent::Start {
            has_placeholder: placeholder.is_some(),
        });
    }

    fn on_success(&self, _: &ImageHandle, transition: Transition) {
        self.events.lock().push(TargetEvent::Success { transition });
    }

    fn on_error(&self, error: Option<&ImageHandle>) {
        self.events.lock().push(TargetEvent::Error {
            has_image: error.is_some(),
        });
    }
}

/// Records the names of the listener callbacks in order.
#[derive(Default)]
pub(crate) struct RecordingListener {
    pub events: Mutex<Vec<&'static str>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().clone()
    }

    fn push(&self, event: &'static str) {
        self.events.lock().push(event);
    }
}

impl EventListener for RecordingListener {
    fn on_start(&self, _: &ImageRequest) {
        self.push("start");
    }

    fn chain_start(&self, _: &ImageRequest) {
        self.push("chain_start");
    }

    fn fetch_start(&self, _: &ImageRequest, _: &Options) {
        self.push("fetch_start");
    }

    fn fetch_end(&self, _: &ImageRequest, _: &Options, _: Option<&FetchResult>) {
        self.push("fetch_end");
    }

    fn decode_start(&self, _: &ImageRequest, _: &Options) {
        self.push("decode_start");
    }

    fn decode_end(&self, _: &ImageRequest, _: &Options, _: Option<&DecodeResult>) {
        self.push("decode_end");
    }

    fn on_cancel(&self, _: &ImageRequest) {
        self.push("cancel");
    }

    fn on_error(&self, _: &ImageRequest, _: &ErrorResult) {
        self.push("error");
    }

    fn on_success(&self, _: &ImageRequest, _: &SuccessResult) {
        self.push("success");
    }
}

/// A loader builder without disk cache or built-in components.
pub(crate) fn test_loader_builder() -> ImageLoaderBuilder {
    ImageLoaderBuilder::new()
        .no_disk_cache()
        .add_builtin_components(false)
}

/// A test loader builder using the counting stubs.
pub(crate) fn stub_loader_builder(
    fetcher: &CountingFetcherFactory,
    decoder: &CountingDecoderFactory,
) -> ImageLoaderBuilder {
    test_loader_builder().components(
        ComponentRegistry::builder()
            .register_fetcher(fetcher.clone())
            .register_decoder(decoder.clone())
            .build(),
    )
}
