//! Decode and encode seams, and the `image`-backed default codec.

use crate::detect::{detect_format, SourceFormat};
use crate::error::{invalid_params, Result};
use crate::pixmap::Pixmap;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Target format of an encoded blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless PNG
    Png,
    /// Lossy JPEG, alpha flattened
    Jpeg,
    /// Lossless WebP
    WebP,
    /// SVG from the vector reducer
    Svg,
}

impl OutputFormat {
    /// MIME type of blobs in this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Svg => "image/svg+xml",
        }
    }

    /// Usual file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
            OutputFormat::Svg => "svg",
        }
    }
}

/// Compressed output bytes with their declared format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    bytes: Vec<u8>,
    format: OutputFormat,
}

impl EncodedBlob {
    /// Wrap already-encoded bytes.
    pub fn new(bytes: Vec<u8>, format: OutputFormat) -> Self {
        Self { bytes, format }
    }

    /// Format of the bytes.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// MIME type of the bytes.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when no bytes were produced.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Take the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// `data:<mime>;base64,<payload>` for inline embedding.
    pub fn to_data_url(&self) -> String {
        let payload = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{payload}", self.mime_type())
    }
}

/// Turns source bytes into a pixel buffer.
pub trait Decoder: Send + Sync {
    /// Decode `bytes`. `declared` is the MIME-derived format, used when the
    /// bytes themselves are not recognised.
    fn decode(&self, bytes: &[u8], declared: Option<SourceFormat>) -> Result<Pixmap>;
}

/// Turns a pixel buffer into encoded bytes.
pub trait Encoder: Send + Sync {
    /// Encode at `quality` in `0.0..=1.0`; lossless formats ignore it.
    fn encode(&self, buffer: &Pixmap, format: OutputFormat, quality: f32) -> Result<EncodedBlob>;
}

/// Map `0.0..=1.0` onto the encoder's `1..=100` scale.
pub fn quality_percent(quality: f32) -> Result<u8> {
    if !quality.is_finite() || !(0.0..=1.0).contains(&quality) {
        return Err(invalid_params(format!("quality must be within 0.0-1.0, got {quality}")));
    }
    Ok(((quality * 100.0).round() as u8).max(1))
}

/// Resolve the format to decode: sniffed bytes first, then the declared type.
pub fn resolve_source_format(bytes: &[u8], declared: Option<SourceFormat>) -> Result<SourceFormat> {
    match (detect_format(bytes), declared) {
        (Ok(sniffed), Some(declared)) if sniffed != declared => {
            tracing::warn!(?sniffed, ?declared, "Declared type disagrees with content, using content");
            Ok(sniffed)
        }
        (Ok(sniffed), _) => Ok(sniffed),
        (Err(_), Some(declared)) if !bytes.is_empty() => Ok(declared),
        (Err(e), _) => Err(e),
    }
}

#[cfg(feature = "processing")]
pub use self::image_codec::ImageCodec;

#[cfg(feature = "processing")]
mod image_codec {
    use super::*;
    use crate::alpha::flatten;
    use crate::color::Color;
    use crate::error::RasterError;
    use crate::services::HeicDecoder;
    use image::{DynamicImage, ImageOutputFormat};
    use std::io::Cursor;
    use std::sync::Arc;
    use tracing::debug;

    /// Default codec backed by the `image` crate.
    ///
    /// Decodes JPEG, PNG, GIF, WebP and BMP, and HEIC through an optional
    /// external decoder. Encodes PNG, JPEG and WebP. WebP output is lossless,
    /// so `quality` only affects JPEG.
    #[derive(Clone)]
    pub struct ImageCodec {
        jpeg_background: Color,
        heic: Option<Arc<dyn HeicDecoder>>,
    }

    impl Default for ImageCodec {
        fn default() -> Self {
            Self::new(Color::WHITE)
        }
    }

    impl std::fmt::Debug for ImageCodec {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ImageCodec")
                .field("jpeg_background", &self.jpeg_background)
                .field("heic", &self.heic.is_some())
                .finish()
        }
    }

    impl ImageCodec {
        /// Codec that flattens JPEG output onto `jpeg_background`.
        pub fn new(jpeg_background: Color) -> Self {
            Self { jpeg_background, heic: None }
        }

        /// Route HEIC sources to `decoder`.
        pub fn with_heic_decoder(mut self, decoder: Arc<dyn HeicDecoder>) -> Self {
            self.heic = Some(decoder);
            self
        }
    }

    fn builtin_format(format: SourceFormat) -> Option<image::ImageFormat> {
        Some(match format {
            SourceFormat::Jpeg => image::ImageFormat::Jpeg,
            SourceFormat::Png => image::ImageFormat::Png,
            SourceFormat::Gif => image::ImageFormat::Gif,
            SourceFormat::WebP => image::ImageFormat::WebP,
            SourceFormat::Bmp => image::ImageFormat::Bmp,
            _ => return None,
        })
    }

    impl Decoder for ImageCodec {
        fn decode(&self, bytes: &[u8], declared: Option<SourceFormat>) -> Result<Pixmap> {
            let format = resolve_source_format(bytes, declared)?;
            debug!(?format, len = bytes.len(), "Decoding source");

            if format == SourceFormat::Heic {
                let decoder = self
                    .heic
                    .as_ref()
                    .ok_or_else(|| RasterError::Decode("HEIC input needs a HEIC decoder".into()))?;
                return decoder.decode(bytes).map_err(|e| e.into_raster("HEIC decoder"));
            }

            let Some(image_format) = builtin_format(format) else {
                return Err(RasterError::Decode(format!(
                    "{} input is not supported",
                    format.mime_type()
                )));
            };

            let img = image::load_from_memory_with_format(bytes, image_format)
                .map_err(|e| RasterError::Decode(e.to_string()))?;
            Pixmap::try_from(img.to_rgba8())
        }
    }

    impl Encoder for ImageCodec {
        fn encode(&self, buffer: &Pixmap, format: OutputFormat, quality: f32) -> Result<EncodedBlob> {
            let mut bytes = Vec::new();
            let mut cursor = Cursor::new(&mut bytes);

            let written = match format {
                OutputFormat::Png => DynamicImage::ImageRgba8(buffer.clone().into())
                    .write_to(&mut cursor, ImageOutputFormat::Png),
                OutputFormat::Jpeg => {
                    let q = quality_percent(quality)?;
                    let opaque = flatten(buffer, self.jpeg_background);
                    let rgb = DynamicImage::ImageRgba8(opaque.into()).to_rgb8();
                    DynamicImage::ImageRgb8(rgb).write_to(&mut cursor, ImageOutputFormat::Jpeg(q))
                }
                OutputFormat::WebP => DynamicImage::ImageRgba8(buffer.clone().into())
                    .write_to(&mut cursor, ImageOutputFormat::WebP),
                OutputFormat::Svg => {
                    return Err(RasterError::Encode(
                        "SVG output comes from vectorization, not the raster encoder".into(),
                    ));
                }
            };
            written.map_err(|e| RasterError::Encode(e.to_string()))?;

            debug!(?format, len = bytes.len(), "Encoded output");
            Ok(EncodedBlob::new(bytes, format))
        }
    }
}
