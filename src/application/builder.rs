//! Loader configuration.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use super::lazy::Lazy;
use super::loader::ImageLoader;
use super::{ComponentRegistry, DEFAULT_PARALLELISM, Dispatcher};
use crate::domain::entities::{
    CachePolicy, ColorConfig, Extras, ImageHandle, ImageRequest, Precision, Transition,
};
use crate::domain::ports::{EventListener, EventListenerFactory, FileSystem, LocalFileSystem};
use crate::infrastructure::cache::{DiskCache, MemoryCache, disk_cache};
use crate::infrastructure::config::{ImageLoaderConfig, default_disk_cache_dir};
use crate::infrastructure::decode::register_builtin_decoders;
use crate::infrastructure::fetch::register_builtin_fetchers;

/// Loader-level defaults that unset request fields resolve against.
#[derive(Clone)]
pub struct DefaultRequestOptions {
    /// Where the interceptor chain runs.
    pub interceptor_dispatcher: Dispatcher,
    /// Where fetchers run.
    pub fetcher_dispatcher: Dispatcher,
    /// Where decoders run.
    pub decoder_dispatcher: Dispatcher,
    /// Where transformations run.
    pub transformation_dispatcher: Dispatcher,
    /// Default precision.
    pub precision: Precision,
    /// Default pixel layout.
    pub color_config: ColorConfig,
    /// Shown while a request runs.
    pub placeholder: Option<ImageHandle>,
    /// Shown when a request fails.
    pub error: Option<ImageHandle>,
    /// Shown when a request has no data.
    pub fallback: Option<ImageHandle>,
    /// Memory cache policy.
    pub memory_cache_policy: CachePolicy,
    /// Disk cache policy.
    pub disk_cache_policy: CachePolicy,
    /// Network policy.
    pub network_cache_policy: CachePolicy,
    /// Transition handed to targets on success.
    pub transition: Transition,
    /// Extras that request extras are overlaid on.
    pub extras: Extras,
}

impl Default for DefaultRequestOptions {
    fn default() -> Self {
        let pool = Dispatcher::pool(DEFAULT_PARALLELISM);
        Self {
            interceptor_dispatcher: Dispatcher::Current,
            fetcher_dispatcher: pool.clone(),
            decoder_dispatcher: pool.clone(),
            transformation_dispatcher: pool,
            precision: Precision::default(),
            color_config: ColorConfig::default(),
            placeholder: None,
            error: None,
            fallback: None,
            memory_cache_policy: CachePolicy::Enabled,
            disk_cache_policy: CachePolicy::Enabled,
            network_cache_policy: CachePolicy::Enabled,
            transition: Transition::None,
            extras: Extras::new(),
        }
    }
}

impl std::fmt::Debug for DefaultRequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultRequestOptions")
            .field("fetcher_dispatcher", &self.fetcher_dispatcher)
            .field("decoder_dispatcher", &self.decoder_dispatcher)
            .field("precision", &self.precision)
            .field("memory_cache_policy", &self.memory_cache_policy)
            .field("disk_cache_policy", &self.disk_cache_policy)
            .field("network_cache_policy", &self.network_cache_policy)
            .field("transition", &self.transition)
            .finish_non_exhaustive()
    }
}

/// Builds an [`ImageLoader`].
///
/// Caches and the HTTP client can be given directly or as factories; a
/// factory runs at most once, the first time the loader needs the resource.
#[must_use]
pub struct ImageLoaderBuilder {
    pub(super) defaults: DefaultRequestOptions,
    pub(super) memory_cache: Lazy<Option<Arc<MemoryCache>>>,
    pub(super) disk_cache: Lazy<Option<DiskCache>>,
    #[cfg(feature = "network")]
    pub(super) http_client: Lazy<Option<reqwest::Client>>,
    pub(super) components: ComponentRegistry,
    pub(super) listener_factory: Option<Arc<dyn EventListenerFactory>>,
    pub(super) file_system: Arc<dyn FileSystem>,
    pub(super) add_builtin_components: bool,
}

impl ImageLoaderBuilder {
    /// Creates a builder with default caches and built-in components.
    pub fn new() -> Self {
        Self {
            defaults: DefaultRequestOptions::default(),
            memory_cache: Lazy::deferred(|| Some(Arc::new(MemoryCache::default()))),
            disk_cache: Lazy::deferred(|| {
                default_disk_cache_dir()
                    .and_then(|dir| open_disk_cache(dir, disk_cache::DEFAULT_MAX_SIZE))
            }),
            #[cfg(feature = "network")]
            http_client: Lazy::deferred(|| {
                build_http_client(crate::infrastructure::config::DEFAULT_TIMEOUT_SECS)
            }),
            components: ComponentRegistry::default(),
            listener_factory: None,
            file_system: Arc::new(LocalFileSystem),
            add_builtin_components: true,
        }
    }

    /// Creates a builder from a loaded configuration.
    pub fn from_config(config: &ImageLoaderConfig) -> Self {
        let mut builder = Self::new()
            .memory_cache(MemoryCache::new(config.memory_cache_max_bytes))
            .dispatcher(Dispatcher::pool(config.max_parallelism))
            .precision(config.precision)
            .crossfade_millis(config.crossfade_millis)
            .memory_cache_policy(config.memory_cache_policy)
            .disk_cache_policy(config.disk_cache_policy)
            .network_cache_policy(config.network_cache_policy);

        builder = match config.disk_cache_dir.clone() {
            Some(dir) => {
                let max_size = config.disk_cache_max_bytes;
                builder.disk_cache_factory(move || open_disk_cache(dir, max_size))
            }
            None => builder.no_disk_cache(),
        };

        #[cfg(feature = "network")]
        {
            let timeout_secs = config.timeout_secs;
            builder = builder.http_client_factory(move || build_http_client(timeout_secs));
        }

        builder
    }

    pub(super) fn from_loader(loader: &ImageLoader) -> Self {
        Self {
            defaults: loader.defaults().clone(),
            memory_cache: Lazy::ready(loader.memory_cache()),
            disk_cache: Lazy::ready(loader.disk_cache()),
            #[cfg(feature = "network")]
            http_client: Lazy::ready(loader.http_client()),
            components: loader.components().clone(),
            listener_factory: loader.listener_factory(),
            file_system: Arc::clone(loader.file_system()),
            add_builtin_components: false,
        }
    }

    /// Uses `cache` as the memory cache.
    pub fn memory_cache(mut self, cache: MemoryCache) -> Self {
        self.memory_cache = Lazy::ready(Some(Arc::new(cache)));
        self
    }

    /// Shares an existing memory cache.
    pub fn shared_memory_cache(mut self, cache: Arc<MemoryCache>) -> Self {
        self.memory_cache = Lazy::ready(Some(cache));
        self
    }

    /// Creates the memory cache on first use.
    pub fn memory_cache_factory(
        mut self,
        factory: impl FnOnce() -> MemoryCache + Send + 'static,
    ) -> Self {
        self.memory_cache = Lazy::deferred(move || Some(Arc::new(factory())));
        self
    }

    /// Disables the memory cache.
    pub fn no_memory_cache(mut self) -> Self {
        self.memory_cache = Lazy::ready(None);
        self
    }

    /// Uses `cache` as the disk cache.
    pub fn disk_cache(mut self, cache: DiskCache) -> Self {
        self.disk_cache = Lazy::ready(Some(cache));
        self
    }

    /// Creates the disk cache on first use. Returning `None` disables it.
    pub fn disk_cache_factory(
        mut self,
        factory: impl FnOnce() -> Option<DiskCache> + Send + 'static,
    ) -> Self {
        self.disk_cache = Lazy::deferred(factory);
        self
    }

    /// Disables the disk cache.
    pub fn no_disk_cache(mut self) -> Self {
        self.disk_cache = Lazy::ready(None);
        self
    }

    /// Uses `client` for HTTP fetches.
    #[cfg(feature = "network")]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Lazy::ready(Some(client));
        self
    }

    /// Creates the HTTP client on first use.
    #[cfg(feature = "network")]
    pub fn http_client_factory(
        mut self,
        factory: impl FnOnce() -> Option<reqwest::Client> + Send + 'static,
    ) -> Self {
        self.http_client = Lazy::deferred(factory);
        self
    }

    /// Replaces the component registry. Built-in components are still
    /// appended unless disabled.
    pub fn components(mut self, components: ComponentRegistry) -> Self {
        self.components = components;
        self
    }

    /// Whether to append the built-in fetchers and decoders after the
    /// registered ones.
    pub fn add_builtin_components(mut self, enable: bool) -> Self {
        self.add_builtin_components = enable;
        self
    }

    /// Runs the interceptor chain on `dispatcher`.
    pub fn interceptor_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.defaults.interceptor_dispatcher = dispatcher;
        self
    }

    /// Runs fetchers on `dispatcher`.
    pub fn fetcher_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.defaults.fetcher_dispatcher = dispatcher;
        self
    }

    /// Runs decoders on `dispatcher`.
    pub fn decoder_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.defaults.decoder_dispatcher = dispatcher;
        self
    }

    /// Runs transformations on `dispatcher`.
    pub fn transformation_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.defaults.transformation_dispatcher = dispatcher;
        self
    }

    /// Runs fetchers, decoders and transformations on `dispatcher`.
    pub fn dispatcher(self, dispatcher: Dispatcher) -> Self {
        self.fetcher_dispatcher(dispatcher.clone())
            .decoder_dispatcher(dispatcher.clone())
            .transformation_dispatcher(dispatcher)
    }

    /// Default precision.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.defaults.precision = precision;
        self
    }

    /// Default pixel layout.
    pub fn color_config(mut self, color_config: ColorConfig) -> Self {
        self.defaults.color_config = color_config;
        self
    }

    /// Default placeholder image.
    pub fn placeholder(mut self, image: ImageHandle) -> Self {
        self.defaults.placeholder = Some(image);
        self
    }

    /// Default error image.
    pub fn error(mut self, image: ImageHandle) -> Self {
        self.defaults.error = Some(image);
        self
    }

    /// Default fallback image.
    pub fn fallback(mut self, image: ImageHandle) -> Self {
        self.defaults.fallback = Some(image);
        self
    }

    /// Default memory cache policy.
    pub fn memory_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.defaults.memory_cache_policy = policy;
        self
    }

    /// Default disk cache policy.
    pub fn disk_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.defaults.disk_cache_policy = policy;
        self
    }

    /// Default network policy.
    pub fn network_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.defaults.network_cache_policy = policy;
        self
    }

    /// Uses one listener for every request.
    pub fn event_listener(self, listener: Arc<dyn EventListener>) -> Self {
        self.event_listener_factory(move |_: &ImageRequest| Arc::clone(&listener))
    }

    /// Creates a listener per request.
    pub fn event_listener_factory(mut self, factory: impl EventListenerFactory + 'static) -> Self {
        self.listener_factory = Some(Arc::new(factory));
        self
    }

    /// Enables a crossfade of the default duration, or disables transitions.
    pub fn crossfade(self, enable: bool) -> Self {
        let millis = if enable {
            crate::domain::entities::DEFAULT_CROSSFADE_MILLIS
        } else {
            0
        };
        self.crossfade_millis(millis)
    }

    /// Default crossfade of `duration_millis`; zero disables transitions.
    pub fn crossfade_millis(self, duration_millis: u32) -> Self {
        self.transition(Transition::crossfade(duration_millis))
    }

    /// Default transition.
    pub fn transition(mut self, transition: Transition) -> Self {
        self.defaults.transition = transition;
        self
    }

    /// Sets a loader-level extra.
    pub fn extra<T: std::any::Any + Send + Sync>(
        mut self,
        key: impl Into<String>,
        value: T,
    ) -> Self {
        self.defaults.extras.insert(key, value);
        self
    }

    /// File system used for local files.
    pub fn file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = file_system;
        self
    }

    /// Builds the loader.
    pub fn build(mut self) -> ImageLoader {
        if self.add_builtin_components {
            let builder = register_builtin_fetchers(self.components.new_builder());
            self.components = register_builtin_decoders(builder).build();
        }
        debug!(
            fetchers = self.components.fetcher_count(),
            decoders = self.components.decoder_count(),
            interceptors = self.components.interceptors().len(),
            "Building image loader"
        );
        ImageLoader::from_builder(self)
    }
}

impl Default for ImageLoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn open_disk_cache(dir: PathBuf, max_size: u64) -> Option<DiskCache> {
    match DiskCache::shared(&dir, max_size) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Disk cache unavailable, continuing without it");
            None
        }
    }
}

#[cfg(feature = "network")]
fn build_http_client(timeout_secs: u64) -> Option<reqwest::Client> {
    match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
    {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "Failed to create HTTP client");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_sets_all_worker_stages() {
        let builder = ImageLoaderBuilder::new().dispatcher(Dispatcher::Current);
        assert!(matches!(builder.defaults.fetcher_dispatcher, Dispatcher::Current));
        assert!(matches!(builder.defaults.decoder_dispatcher, Dispatcher::Current));
        assert!(matches!(
            builder.defaults.transformation_dispatcher,
            Dispatcher::Current
        ));
    }

    #[test]
    fn test_crossfade_uses_default_duration() {
        let builder = ImageLoaderBuilder::new().crossfade(true);
        assert_eq!(
            builder.defaults.transition,
            Transition::Crossfade {
                duration_millis: crate::domain::entities::DEFAULT_CROSSFADE_MILLIS
            }
        );
        let builder = builder.crossfade(false);
        assert_eq!(builder.defaults.transition, Transition::None);
    }

    #[test]
    fn test_memory_cache_factory_is_lazy() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let created = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&created);
        let loader = ImageLoaderBuilder::new()
            .no_disk_cache()
            .add_builtin_components(false)
            .memory_cache_factory(move || {
                flag.store(true, Ordering::SeqCst);
                MemoryCache::new(1024)
            })
            .build();

        assert!(!created.load(Ordering::SeqCst));
        assert_eq!(loader.memory_cache().map(|c| c.max_size()), Some(1024));
        assert!(created.load(Ordering::SeqCst));
    }

    #[test]
    fn test_loader_extras_are_defaults() {
        let loader = crate::test_support::test_loader_builder()
            .extra("quality", 80_u8)
            .build();
        let request = ImageRequest::builder("x").extra("other", 1_u8).build();
        let options = loader.options_for(&request, request.size().unwrap_or_default());

        assert_eq!(options.extras.get::<u8>("quality"), Some(&80));
        assert_eq!(options.extras.get::<u8>("other"), Some(&1));
    }
}
