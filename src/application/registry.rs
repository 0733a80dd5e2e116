//! Ordered tables of pluggable components.

use std::sync::Arc;

use super::{ImageLoader, Interceptor};
use crate::domain::entities::{Data, Options};
use crate::domain::ports::{Decoder, DecoderFactory, Fetcher, FetcherFactory, SourceResult};

/// Interceptors and fetcher/decoder factories, in registration order.
///
/// Resolution walks the factories in order and the first one that accepts the
/// input wins, so more specific factories must be registered first.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    interceptors: Vec<Arc<dyn Interceptor>>,
    fetcher_factories: Vec<Arc<dyn FetcherFactory>>,
    decoder_factories: Vec<Arc<dyn DecoderFactory>>,
}

impl ComponentRegistry {
    /// Starts an empty registry.
    #[must_use]
    pub fn builder() -> ComponentRegistryBuilder {
        ComponentRegistryBuilder::default()
    }

    /// Returns a builder pre-filled with this registry's components.
    #[must_use]
    pub fn new_builder(&self) -> ComponentRegistryBuilder {
        ComponentRegistryBuilder {
            registry: self.clone(),
        }
    }

    /// Registered interceptors.
    #[must_use]
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    /// Number of registered fetcher factories.
    #[must_use]
    pub fn fetcher_count(&self) -> usize {
        self.fetcher_factories.len()
    }

    /// Number of registered decoder factories.
    #[must_use]
    pub fn decoder_count(&self) -> usize {
        self.decoder_factories.len()
    }

    /// Creates a fetcher with the first factory at or after `start` that
    /// accepts `data`. Returns the fetcher and the index of its factory.
    #[must_use]
    pub fn new_fetcher(
        &self,
        data: &Data,
        options: &Options,
        loader: &ImageLoader,
        start: usize,
    ) -> Option<(Box<dyn Fetcher>, usize)> {
        self.fetcher_factories
            .iter()
            .enumerate()
            .skip(start)
            .find_map(|(index, factory)| {
                factory
                    .create(data, options, loader)
                    .map(|fetcher| (fetcher, index))
            })
    }

    /// Creates a decoder with the first factory at or after `start` that
    /// accepts `source`. Returns the decoder and the index of its factory.
    #[must_use]
    pub fn new_decoder(
        &self,
        source: &SourceResult,
        options: &Options,
        loader: &ImageLoader,
        start: usize,
    ) -> Option<(Box<dyn Decoder>, usize)> {
        self.decoder_factories
            .iter()
            .enumerate()
            .skip(start)
            .find_map(|(index, factory)| {
                factory
                    .create(source, options, loader)
                    .map(|decoder| (decoder, index))
            })
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("interceptors", &self.interceptors.len())
            .field("fetcher_factories", &self.fetcher_factories.len())
            .field("decoder_factories", &self.decoder_factories.len())
            .finish()
    }
}

/// Builder for [`ComponentRegistry`].
#[derive(Default)]
#[must_use]
pub struct ComponentRegistryBuilder {
    registry: ComponentRegistry,
}

impl ComponentRegistryBuilder {
    /// Appends a fetcher factory.
    pub fn register_fetcher(mut self, factory: impl FetcherFactory + 'static) -> Self {
        self.registry.fetcher_factories.push(Arc::new(factory));
        self
    }

    /// Appends a decoder factory.
    pub fn register_decoder(mut self, factory: impl DecoderFactory + 'static) -> Self {
        self.registry.decoder_factories.push(Arc::new(factory));
        self
    }

    /// Appends an interceptor. Interceptors run after event tracking and before
    /// the memory cache, in registration order.
    pub fn register_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.registry.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Builds the registry.
    #[must_use]
    pub fn build(self) -> ComponentRegistry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubFetcher, test_loader_builder};
    use mockall::mock;

    mock! {
        Factory {}
        impl FetcherFactory for Factory {
            fn create(
                &self,
                data: &Data,
                options: &Options,
                loader: &ImageLoader,
            ) -> Option<Box<dyn Fetcher>>;
        }
    }

    #[tokio::test]
    async fn test_first_accepting_factory_wins() {
        let mut declines = MockFactory::new();
        declines.expect_create().times(1).returning(|_, _, _| None);
        let mut accepts = MockFactory::new();
        accepts
            .expect_create()
            .times(1)
            .returning(|_, _, _| Some(Box::new(StubFetcher::default()) as Box<dyn Fetcher>));
        let mut never = MockFactory::new();
        never.expect_create().times(0);

        let registry = ComponentRegistry::builder()
            .register_fetcher(declines)
            .register_fetcher(accepts)
            .register_fetcher(never)
            .build();
        let loader = test_loader_builder().build();
        let request = crate::domain::entities::ImageRequest::new("x");
        let options = loader.options_for(&request, request.size().unwrap_or_default());

        let (_, index) = registry
            .new_fetcher(request.data(), &options, &loader, 0)
            .unwrap();
        assert_eq!(index, 1);
    }

    #[tokio::test]
    async fn test_no_factory_is_none() {
        let registry = ComponentRegistry::builder()
            .register_fetcher(|_: &Data, _: &Options, _: &ImageLoader| -> Option<Box<dyn Fetcher>> {
                None
            })
            .build();
        let loader = test_loader_builder().build();
        let request = crate::domain::entities::ImageRequest::new("x");
        let options = loader.options_for(&request, request.size().unwrap_or_default());

        assert!(
            registry
                .new_fetcher(request.data(), &options, &loader, 0)
                .is_none()
        );
        assert!(
            ComponentRegistry::default()
                .new_fetcher(request.data(), &options, &loader, 0)
                .is_none()
        );
    }

    #[test]
    fn test_new_builder_keeps_order() {
        let registry = ComponentRegistry::builder()
            .register_fetcher(|_: &Data, _: &Options, _: &ImageLoader| -> Option<Box<dyn Fetcher>> {
                None
            })
            .build();
        let extended = registry
            .new_builder()
            .register_fetcher(|_: &Data, _: &Options, _: &ImageLoader| -> Option<Box<dyn Fetcher>> {
                None
            })
            .build();

        assert_eq!(registry.fetcher_count(), 1);
        assert_eq!(extended.fetcher_count(), 2);
    }
}
