//! Source format detection from magic bytes.

use crate::error::{RasterError, Result};

/// Formats recognised in source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// JPEG image
    Jpeg,
    /// PNG image
    Png,
    /// GIF image
    Gif,
    /// WebP image
    WebP,
    /// AVIF image
    Avif,
    /// BMP image
    Bmp,
    /// TIFF image
    Tiff,
    /// HEIC/HEIF image
    Heic,
    /// SVG document
    Svg,
}

impl SourceFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            SourceFormat::Jpeg => "image/jpeg",
            SourceFormat::Png => "image/png",
            SourceFormat::Gif => "image/gif",
            SourceFormat::WebP => "image/webp",
            SourceFormat::Avif => "image/avif",
            SourceFormat::Bmp => "image/bmp",
            SourceFormat::Tiff => "image/tiff",
            SourceFormat::Heic => "image/heic",
            SourceFormat::Svg => "image/svg+xml",
        }
    }

    /// Get common file extensions for this format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            SourceFormat::Jpeg => &["jpg", "jpeg"],
            SourceFormat::Png => &["png"],
            SourceFormat::Gif => &["gif"],
            SourceFormat::WebP => &["webp"],
            SourceFormat::Avif => &["avif"],
            SourceFormat::Bmp => &["bmp"],
            SourceFormat::Tiff => &["tiff", "tif"],
            SourceFormat::Heic => &["heic", "heif"],
            SourceFormat::Svg => &["svg"],
        }
    }

    /// Parse a declared MIME type. Parameters after `;` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        Some(match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => SourceFormat::Jpeg,
            "image/png" => SourceFormat::Png,
            "image/gif" => SourceFormat::Gif,
            "image/webp" => SourceFormat::WebP,
            "image/avif" => SourceFormat::Avif,
            "image/bmp" | "image/x-ms-bmp" => SourceFormat::Bmp,
            "image/tiff" => SourceFormat::Tiff,
            "image/heic" | "image/heif" | "image/heic-sequence" | "image/heif-sequence" => {
                SourceFormat::Heic
            }
            "image/svg+xml" => SourceFormat::Svg,
            _ => return None,
        })
    }
}

/// Fixed prefixes, checked in order.
const SIGNATURES: &[(&[u8], SourceFormat)] = &[
    (&[0xFF, 0xD8, 0xFF], SourceFormat::Jpeg),
    (b"\x89PNG\r\n\x1a\n", SourceFormat::Png),
    (b"GIF87a", SourceFormat::Gif),
    (b"GIF89a", SourceFormat::Gif),
    (b"II*\0", SourceFormat::Tiff),
    (b"MM\0*", SourceFormat::Tiff),
    (b"BM", SourceFormat::Bmp),
];

/// ISO base media brands (`....ftyp<brand>`).
fn iso_brand(brand: &[u8]) -> Option<SourceFormat> {
    match brand {
        b"avif" | b"avis" => Some(SourceFormat::Avif),
        b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" | b"mif1" | b"msf1" => {
            Some(SourceFormat::Heic)
        }
        _ => None,
    }
}

/// Sniff the source format from leading bytes.
///
/// # Example
/// ```
/// use pixelforge_raster::{detect_format, SourceFormat};
///
/// assert_eq!(detect_format(b"GIF89a\x01\x00").unwrap(), SourceFormat::Gif);
/// assert_eq!(detect_format(b"\x00\x00\x00\x1cftypavif").unwrap(), SourceFormat::Avif);
/// assert!(detect_format(b"plain text").is_err());
/// ```
pub fn detect_format(data: &[u8]) -> Result<SourceFormat> {
    if data.len() < 4 {
        return Err(RasterError::Decode(format!(
            "{} bytes are too few to identify an image",
            data.len()
        )));
    }

    if let Some((_, format)) = SIGNATURES.iter().find(|(magic, _)| data.starts_with(magic)) {
        return Ok(*format);
    }

    if data.len() >= 12 {
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Ok(SourceFormat::WebP);
        }
        if &data[4..8] == b"ftyp" {
            if let Some(format) = iso_brand(&data[8..12]) {
                return Ok(format);
            }
        }
    }

    if looks_like_svg(data) {
        return Ok(SourceFormat::Svg);
    }

    Err(RasterError::Decode("unrecognised image data".into()))
}

fn looks_like_svg(data: &[u8]) -> bool {
    let head = &data[..data.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    (text.starts_with("<?xml") || text.starts_with("<svg") || text.starts_with("<!--"))
        && text.contains("<svg")
}
