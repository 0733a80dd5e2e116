//! Ports implemented by pluggable components and consumers.

mod decoder_port;
mod event_listener_port;
mod fetcher_port;
mod file_system_port;
mod target_port;
mod transformation_port;

pub use decoder_port::{DecodeResult, Decoder, DecoderFactory};
pub use event_listener_port::{EventListener, EventListenerFactory, NoopEventListener};
pub use fetcher_port::{FetchResult, Fetcher, FetcherFactory, ImageFetchResult, SourceResult};
pub use file_system_port::{FileSystem, LocalFileSystem};
pub use target_port::Target;
pub use transformation_port::Transformation;
