//! Built-in fetchers.

mod bytes_fetcher;
mod file_fetcher;
#[cfg(feature = "network")]
mod http_fetcher;

pub use bytes_fetcher::{BytesFetcher, BytesFetcherFactory};
pub use file_fetcher::{FileFetcher, FileFetcherFactory, mime_type_for_path};
#[cfg(feature = "network")]
pub use http_fetcher::{HttpFetcher, HttpFetcherFactory};

use crate::application::ComponentRegistryBuilder;

/// Appends the built-in fetchers after any already registered.
pub fn register_builtin_fetchers(builder: ComponentRegistryBuilder) -> ComponentRegistryBuilder {
    let builder = builder
        .register_fetcher(BytesFetcherFactory)
        .register_fetcher(FileFetcherFactory);
    #[cfg(feature = "network")]
    let builder = builder.register_fetcher(HttpFetcherFactory);
    builder
}
