//! Built-in decoders.

#[cfg(feature = "image")]
mod image_decoder;

#[cfg(feature = "image")]
pub use image_decoder::{ImageDecoder, ImageDecoderFactory};

use crate::application::ComponentRegistryBuilder;

/// Appends the built-in decoders after any already registered.
pub fn register_builtin_decoders(builder: ComponentRegistryBuilder) -> ComponentRegistryBuilder {
    #[cfg(feature = "image")]
    let builder = builder.register_decoder(ImageDecoderFactory);
    builder
}
