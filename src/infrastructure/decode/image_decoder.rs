use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, error};

use crate::application::ImageLoader;
use crate::domain::entities::{ColorConfig, Options, Scale, Size, compute_size_multiplier};
use crate::domain::errors::ImageError;
use crate::domain::ports::{DecodeResult, Decoder, DecoderFactory, SourceResult};

/// Decodes PNG, JPEG and WebP with the `image` crate on the blocking pool,
/// downsampling to the requested size.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    source: Bytes,
    format: ImageFormat,
    size: Size,
    scale: Scale,
    color_config: ColorConfig,
}

impl ImageDecoder {
    /// Creates a decoder for `source` in `format`.
    #[must_use]
    pub fn new(source: Bytes, format: ImageFormat, options: &Options) -> Self {
        Self {
            source,
            format,
            size: options.size,
            scale: options.scale,
            color_config: options.color_config,
        }
    }
}

#[async_trait]
impl Decoder for ImageDecoder {
    async fn decode(&self) -> Result<DecodeResult, ImageError> {
        let decoder = self.clone();
        tokio::task::spawn_blocking(move || decoder.decode_blocking())
            .await
            .map_err(|e| {
                error!(error = %e, "Decode task failed");
                ImageError::internal(format!("decode task failed: {e}"))
            })?
    }
}

impl ImageDecoder {
    fn decode_blocking(&self) -> Result<DecodeResult, ImageError> {
        let decoded = image::load_from_memory_with_format(&self.source, self.format)
            .map_err(|e| ImageError::decode(e.to_string()))?;
        let (width, height) = (decoded.width(), decoded.height());

        let mut is_sampled = false;
        let mut image = decoded;
        if !self.size.is_original() {
            let multiplier = compute_size_multiplier(width, height, self.size, self.scale);
            if multiplier < 1.0 {
                let target_width = scaled(width, multiplier);
                let target_height = scaled(height, multiplier);
                debug!(
                    from = %format!("{width}x{height}"),
                    to = %format!("{target_width}x{target_height}"),
                    "Downsampling decoded image"
                );
                image = image.resize_exact(target_width, target_height, FilterType::Triangle);
                is_sampled = true;
            }
        }

        Ok(DecodeResult {
            image: Arc::new(convert(image, self.color_config)),
            is_sampled,
        })
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scaled(value: u32, multiplier: f64) -> u32 {
    ((f64::from(value) * multiplier).round() as u32).max(1)
}

fn convert(image: DynamicImage, color_config: ColorConfig) -> DynamicImage {
    match color_config {
        ColorConfig::Auto => image,
        ColorConfig::Rgba8 => DynamicImage::ImageRgba8(image.into_rgba8()),
        ColorConfig::Rgb8 => DynamicImage::ImageRgb8(image.into_rgb8()),
        ColorConfig::Luma8 => DynamicImage::ImageLuma8(image.into_luma8()),
    }
}

/// Accepts sources whose leading bytes identify a supported format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoderFactory;

impl DecoderFactory for ImageDecoderFactory {
    fn create(
        &self,
        source: &SourceResult,
        options: &Options,
        _: &ImageLoader,
    ) -> Option<Box<dyn Decoder>> {
        let format = image::guess_format(&source.source).ok()?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP) {
            return None;
        }
        Some(Box::new(ImageDecoder::new(
            source.source.clone(),
            format,
            options,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{DataSource, ImageRequest};
    use crate::test_support::test_loader_builder;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Bytes {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::new_rgba8(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        Bytes::from(out.into_inner())
    }

    fn options(size: Option<Size>) -> Options {
        let loader = test_loader_builder().build();
        let mut builder = ImageRequest::builder("x").color_config(ColorConfig::Rgb8);
        if let Some(size) = size {
            builder = builder.size(size);
        }
        let request = builder.build();
        loader.options_for(&request, size.unwrap_or_default())
    }

    fn source(bytes: Bytes) -> SourceResult {
        SourceResult {
            source: bytes,
            mime_type: Some("image/png".into()),
            data_source: DataSource::Network,
        }
    }

    #[tokio::test]
    async fn test_decodes_at_original_size() {
        let loader = test_loader_builder().build();
        let decoder = ImageDecoderFactory
            .create(&source(png(40, 20)), &options(None), &loader)
            .unwrap();

        let result = decoder.decode().await.unwrap();
        assert_eq!((result.image.width(), result.image.height()), (40, 20));
        assert!(!result.is_sampled);
        assert_eq!(result.image.byte_size(), 40 * 20 * 3);
    }

    #[tokio::test]
    async fn test_downsamples_to_requested_size() {
        let loader = test_loader_builder().build();
        let decoder = ImageDecoderFactory
            .create(&source(png(40, 20)), &options(Some(Size::new(20, 10))), &loader)
            .unwrap();

        let result = decoder.decode().await.unwrap();
        assert_eq!((result.image.width(), result.image.height()), (20, 10));
        assert!(result.is_sampled);
    }

    #[tokio::test]
    async fn test_truncated_png_is_decode_error() {
        let loader = test_loader_builder().build();
        let bytes = png(8, 8).slice(..24);
        let decoder = ImageDecoderFactory
            .create(&source(bytes), &options(None), &loader)
            .unwrap();

        assert!(decoder.decode().await.unwrap_err().is_decode_failure());
    }

    #[test]
    fn test_unknown_format_is_not_accepted() {
        let loader = test_loader_builder().build();
        assert!(
            ImageDecoderFactory
                .create(&source(Bytes::from_static(b"plain text")), &options(None), &loader)
                .is_none()
        );
    }
}
