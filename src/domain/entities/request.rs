//! Immutable image request descriptor.

use std::fmt;
use std::sync::Arc;

use super::{
    CacheKey, CachePolicy, ColorConfig, Data, Extras, ImageHandle, Precision, Scale, Size,
    Transition,
};
use crate::application::Attachment;
use crate::domain::ports::{EventListener, Target, Transformation};

/// Describes one image to load.
///
/// Every `Option` field left unset resolves against the loader's
/// [`DefaultRequestOptions`](crate::application::DefaultRequestOptions) when the
/// request runs. Requests are immutable; interceptors rewrite them through
/// [`new_builder`](Self::new_builder).
#[derive(Clone)]
pub struct ImageRequest {
    data: Data,
    size: Option<Size>,
    scale: Scale,
    precision: Option<Precision>,
    color_config: Option<ColorConfig>,
    memory_cache_policy: Option<CachePolicy>,
    disk_cache_policy: Option<CachePolicy>,
    network_cache_policy: Option<CachePolicy>,
    memory_cache_key: Option<CacheKey>,
    disk_cache_key: Option<String>,
    placeholder_memory_cache_key: Option<CacheKey>,
    transformations: Vec<Arc<dyn Transformation>>,
    placeholder: Option<ImageHandle>,
    error: Option<ImageHandle>,
    fallback: Option<ImageHandle>,
    transition: Option<Transition>,
    extras: Extras,
    attachment: Option<Attachment>,
    target: Option<Arc<dyn Target>>,
    listener: Option<Arc<dyn EventListener>>,
}

impl ImageRequest {
    /// Creates a request with every option left to the loader defaults.
    #[must_use]
    pub fn new(data: impl Into<Data>) -> Self {
        Self::builder(data).build()
    }

    /// Starts building a request for `data`.
    #[must_use]
    pub fn builder(data: impl Into<Data>) -> ImageRequestBuilder {
        ImageRequestBuilder {
            request: Self {
                data: data.into(),
                size: None,
                scale: Scale::default(),
                precision: None,
                color_config: None,
                memory_cache_policy: None,
                disk_cache_policy: None,
                network_cache_policy: None,
                memory_cache_key: None,
                disk_cache_key: None,
                placeholder_memory_cache_key: None,
                transformations: Vec::new(),
                placeholder: None,
                error: None,
                fallback: None,
                transition: None,
                extras: Extras::new(),
                attachment: None,
                target: None,
                listener: None,
            },
        }
    }

    /// Returns a builder pre-filled with this request.
    #[must_use]
    pub fn new_builder(&self) -> ImageRequestBuilder {
        ImageRequestBuilder {
            request: self.clone(),
        }
    }

    /// The data reference.
    #[must_use]
    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Explicit target size, if any.
    #[must_use]
    pub fn size(&self) -> Option<Size> {
        self.size
    }

    /// Scale mode.
    #[must_use]
    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Precision override.
    #[must_use]
    pub fn precision(&self) -> Option<Precision> {
        self.precision
    }

    /// Pixel layout override.
    #[must_use]
    pub fn color_config(&self) -> Option<ColorConfig> {
        self.color_config
    }

    /// Memory cache policy override.
    #[must_use]
    pub fn memory_cache_policy(&self) -> Option<CachePolicy> {
        self.memory_cache_policy
    }

    /// Disk cache policy override.
    #[must_use]
    pub fn disk_cache_policy(&self) -> Option<CachePolicy> {
        self.disk_cache_policy
    }

    /// Network policy override.
    #[must_use]
    pub fn network_cache_policy(&self) -> Option<CachePolicy> {
        self.network_cache_policy
    }

    /// Explicit memory cache key, replacing the computed one.
    #[must_use]
    pub fn memory_cache_key(&self) -> Option<&CacheKey> {
        self.memory_cache_key.as_ref()
    }

    /// Explicit disk cache key, replacing the one derived from the data.
    #[must_use]
    pub fn disk_cache_key(&self) -> Option<&str> {
        self.disk_cache_key.as_deref()
    }

    /// Memory cache key of an image to show as placeholder while loading.
    #[must_use]
    pub fn placeholder_memory_cache_key(&self) -> Option<&CacheKey> {
        self.placeholder_memory_cache_key.as_ref()
    }

    /// Transformations applied in order after decoding.
    #[must_use]
    pub fn transformations(&self) -> &[Arc<dyn Transformation>] {
        &self.transformations
    }

    /// Placeholder override.
    #[must_use]
    pub fn placeholder(&self) -> Option<&ImageHandle> {
        self.placeholder.as_ref()
    }

    /// Error image override.
    #[must_use]
    pub fn error(&self) -> Option<&ImageHandle> {
        self.error.as_ref()
    }

    /// Fallback image override, used when the data is [`Data::None`].
    #[must_use]
    pub fn fallback(&self) -> Option<&ImageHandle> {
        self.fallback.as_ref()
    }

    /// Transition override.
    #[must_use]
    pub fn transition(&self) -> Option<Transition> {
        self.transition
    }

    /// Request extras.
    #[must_use]
    pub fn extras(&self) -> &Extras {
        &self.extras
    }

    /// Lifetime scope the request is bound to.
    #[must_use]
    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Result sink.
    #[must_use]
    pub fn target(&self) -> Option<&Arc<dyn Target>> {
        self.target.as_ref()
    }

    /// Per-request listener, replacing the loader's listener factory.
    #[must_use]
    pub fn listener(&self) -> Option<&Arc<dyn EventListener>> {
        self.listener.as_ref()
    }
}

impl fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRequest")
            .field("data", &self.data)
            .field("size", &self.size)
            .field("scale", &self.scale)
            .field("precision", &self.precision)
            .field("memory_cache_key", &self.memory_cache_key)
            .field("disk_cache_key", &self.disk_cache_key)
            .field("transformations", &self.transformations.len())
            .field("attachment", &self.attachment.is_some())
            .field("target", &self.target.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ImageRequest`].
#[must_use]
pub struct ImageRequestBuilder {
    request: ImageRequest,
}

impl ImageRequestBuilder {
    /// Replaces the data reference.
    pub fn data(mut self, data: impl Into<Data>) -> Self {
        self.request.data = data.into();
        self
    }

    /// Sets an explicit target size.
    pub fn size(mut self, size: Size) -> Self {
        self.request.size = Some(size);
        self
    }

    /// Sets the scale mode.
    pub fn scale(mut self, scale: Scale) -> Self {
        self.request.scale = scale;
        self
    }

    /// Sets the precision.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.request.precision = Some(precision);
        self
    }

    /// Sets the preferred pixel layout.
    pub fn color_config(mut self, config: ColorConfig) -> Self {
        self.request.color_config = Some(config);
        self
    }

    /// Sets the memory cache policy.
    pub fn memory_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.request.memory_cache_policy = Some(policy);
        self
    }

    /// Sets the disk cache policy.
    pub fn disk_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.request.disk_cache_policy = Some(policy);
        self
    }

    /// Sets the network policy.
    pub fn network_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.request.network_cache_policy = Some(policy);
        self
    }

    /// Overrides the computed memory cache key.
    pub fn memory_cache_key(mut self, key: impl Into<CacheKey>) -> Self {
        self.request.memory_cache_key = Some(key.into());
        self
    }

    /// Overrides the disk cache key derived from the data.
    pub fn disk_cache_key(mut self, key: impl Into<String>) -> Self {
        self.request.disk_cache_key = Some(key.into());
        self
    }

    /// Shows the memory cached image under `key` as placeholder, if present.
    pub fn placeholder_memory_cache_key(mut self, key: impl Into<CacheKey>) -> Self {
        self.request.placeholder_memory_cache_key = Some(key.into());
        self
    }

    /// Appends a transformation.
    pub fn transformation(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.request.transformations.push(transformation);
        self
    }

    /// Replaces the transformation list.
    pub fn transformations(mut self, transformations: Vec<Arc<dyn Transformation>>) -> Self {
        self.request.transformations = transformations;
        self
    }

    /// Sets the placeholder image.
    pub fn placeholder(mut self, image: ImageHandle) -> Self {
        self.request.placeholder = Some(image);
        self
    }

    /// Sets the error image.
    pub fn error(mut self, image: ImageHandle) -> Self {
        self.request.error = Some(image);
        self
    }

    /// Sets the fallback image.
    pub fn fallback(mut self, image: ImageHandle) -> Self {
        self.request.fallback = Some(image);
        self
    }

    /// Enables a crossfade of the default duration, or disables transitions.
    pub fn crossfade(self, enable: bool) -> Self {
        let millis = if enable {
            super::DEFAULT_CROSSFADE_MILLIS
        } else {
            0
        };
        self.crossfade_millis(millis)
    }

    /// Enables a crossfade of `duration_millis`.
    pub fn crossfade_millis(mut self, duration_millis: u32) -> Self {
        self.request.transition = Some(Transition::crossfade(duration_millis));
        self
    }

    /// Sets an extra.
    pub fn extra<T: std::any::Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.request.extras.insert(key, value);
        self
    }

    /// Binds the request to a lifetime scope.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.request.attachment = Some(attachment);
        self
    }

    /// Sets the result sink.
    pub fn target(mut self, target: Arc<dyn Target>) -> Self {
        self.request.target = Some(target);
        self
    }

    /// Sets a per-request listener.
    pub fn listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.request.listener = Some(listener);
        self
    }

    /// Builds the request.
    #[must_use]
    pub fn build(self) -> ImageRequest {
        self.request
    }
}
