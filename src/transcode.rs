//! Page image conversion between container formats
//!
//! Conversion keeps pixel dimensions; only the encoding changes. When the
//! source is already in the requested format the original bytes are
//! returned untouched.

use crate::config::ThumbnailConfig;
use crate::error::{Result, TranscodeError};
use crate::types::{OutputFormat, RawImage};
use image::{DynamicImage, GenericImageView, ImageError, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Converts extracted page images to the negotiated output format
pub struct ImageTranscoder;

impl ImageTranscoder {
    /// Detect the encoding of a page image from its leading bytes
    pub fn source_format(image: &RawImage) -> Result<ImageFormat> {
        image::guess_format(&image.bytes).map_err(|_| {
            TranscodeError::UnsupportedSourceFormat {
                name: image.name.clone(),
            }
            .into()
        })
    }

    /// Whether `transcode` would return the input bytes unchanged
    pub fn is_pass_through(image: &RawImage, target: OutputFormat) -> bool {
        matches!(Self::source_format(image), Ok(format) if format == target.image_format())
    }

    /// Encode `image` as `target`
    ///
    /// Returns the original bytes when the source already is `target`.
    pub fn transcode(image: &RawImage, target: OutputFormat) -> Result<Vec<u8>> {
        let source = Self::source_format(image)?;
        if source == target.image_format() {
            debug!(name = %image.name, format = %target, "source already in target format");
            return Ok(image.bytes.clone());
        }

        let decoded = Self::decode(image, source)?;
        let (width, height) = decoded.dimensions();
        let encoded = Self::encode(decoded, target, &image.name)?;

        debug!(
            name = %image.name,
            from = ?source,
            to = %target,
            width,
            height,
            in_bytes = image.bytes.len(),
            out_bytes = encoded.len(),
            "transcoded page image"
        );
        Ok(encoded)
    }

    /// Render a thumbnail that fits the configured bounding box
    ///
    /// Aspect ratio is preserved and images already inside the box are not
    /// enlarged.
    pub fn thumbnail(image: &RawImage, config: &ThumbnailConfig) -> Result<Vec<u8>> {
        let source = Self::source_format(image)?;
        let decoded = Self::decode(image, source)?;
        let (width, height) = decoded.dimensions();

        let resized = if width > config.max_width || height > config.max_height {
            decoded.thumbnail(config.max_width, config.max_height)
        } else {
            decoded
        };

        debug!(
            name = %image.name,
            width = resized.width(),
            height = resized.height(),
            format = %config.format,
            "rendered thumbnail"
        );
        Self::encode(resized, config.format, &image.name)
    }

    fn decode(image: &RawImage, source: ImageFormat) -> Result<DynamicImage> {
        image::load_from_memory_with_format(&image.bytes, source).map_err(|e| match e {
            ImageError::Unsupported(_) => TranscodeError::UnsupportedSourceFormat {
                name: image.name.clone(),
            }
            .into(),
            other => TranscodeError::CorruptImageData {
                name: image.name.clone(),
                reason: other.to_string(),
            }
            .into(),
        })
    }

    fn encode(img: DynamicImage, target: OutputFormat, name: &str) -> Result<Vec<u8>> {
        // JPEG has no alpha and the WebP encoder takes 8-bit L/LA/RGB/RGBA only
        let img = match target {
            OutputFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
            OutputFormat::Webp if img.color().has_alpha() => {
                DynamicImage::ImageRgba8(img.to_rgba8())
            }
            OutputFormat::Webp => DynamicImage::ImageRgb8(img.to_rgb8()),
            OutputFormat::Png => img,
        };

        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, target.image_format())
            .map_err(|e| TranscodeError::CorruptImageData {
                name: name.to_string(),
                reason: format!("failed to encode {}: {}", target, e),
            })?;
        Ok(buffer.into_inner())
    }
}
