//! Application layer: request coordination around the caches and components.

mod attachment;
mod builder;
mod chain;
pub(crate) mod deduplicator;
mod dispatcher;
mod disposable;
mod interceptors;
mod lazy;
mod loader;
mod registry;


pub use attachment::{Attachment, AttachmentState};
pub use builder::{DefaultRequestOptions, ImageLoaderBuilder};
pub use chain::{Chain, Interceptor};
pub use deduplicator::{Deduplicator, FlightError};
pub use dispatcher::{DEFAULT_PARALLELISM, Dispatcher};
pub use disposable::{Disposable, Job};
pub use loader::ImageLoader;
pub use registry::{ComponentRegistry, ComponentRegistryBuilder};
