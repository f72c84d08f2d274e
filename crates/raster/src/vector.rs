//! Raster-to-vector reduction: palette extraction and block SVG output.
//!
//! This is a blocky approximation. Each `step x step` cell becomes one `<rect>`
//! coloured with the nearest palette entry; there is no edge tracing.

use crate::color::{dominant_colors, nearest_color, Color};
use crate::error::{invalid_params, Result};
use crate::pixmap::Pixmap;
use std::fmt::{self, Write as _};

/// Cells whose sampled opacity is at or below this are skipped.
const MIN_OPACITY: f64 = 0.1;

/// Reduce the image to at most `palette_size` representative colours.
///
/// Same bucketed frequency count as [`dominant_colors`], usually with a coarser
/// bucket so neighbouring shades merge.
pub fn extract_palette(
    buffer: &Pixmap,
    palette_size: usize,
    bucket_size: u8,
    sample_stride: usize,
) -> Result<Vec<Color>> {
    if palette_size == 0 {
        return Err(invalid_params("palette size must be at least 1"));
    }
    dominant_colors(buffer, sample_stride, bucket_size, palette_size)
}

/// A complete, standalone SVG document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvgDocument {
    width: u32,
    height: u32,
    markup: String,
}

impl SvgDocument {
    /// Width in user units, same as the source buffer.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in user units, same as the source buffer.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Full document text.
    pub fn as_str(&self) -> &str {
        &self.markup
    }

    /// Number of `<rect>` elements emitted.
    pub fn rect_count(&self) -> usize {
        self.markup.matches("<rect ").count()
    }

    /// UTF-8 bytes, ready to store as `image/svg+xml`.
    pub fn into_bytes(self) -> Vec<u8> {
        self.markup.into_bytes()
    }
}

impl fmt::Display for SvgDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.markup)
    }
}

/// Walk the buffer in `step` strides and emit one rect per visible sample.
///
/// The sample is the top-left pixel of each cell; its colour is snapped to the
/// nearest `palette` entry and its alpha becomes the rect's opacity.
pub fn raster_to_block_svg(buffer: &Pixmap, step: u32, palette: &[Color]) -> Result<SvgDocument> {
    if step == 0 {
        return Err(invalid_params("vectorize step must be at least 1"));
    }
    if palette.is_empty() {
        return Err(invalid_params("palette must not be empty"));
    }

    let (width, height) = buffer.dimensions();
    let mut markup = String::with_capacity(256);
    markup.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    // writing into a String cannot fail
    let _ = writeln!(
        markup,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">"
    );

    for y in (0..height).step_by(step as usize) {
        for x in (0..width).step_by(step as usize) {
            let px = buffer.pixel(x, y);
            let opacity = f64::from(px.a) / 255.0;
            if opacity <= MIN_OPACITY {
                continue;
            }
            let Some(fill) = nearest_color(px, palette) else {
                continue;
            };
            let _ = writeln!(
                markup,
                "  <rect x=\"{x}\" y=\"{y}\" width=\"{step}\" height=\"{step}\" fill=\"rgb({},{},{})\" opacity=\"{opacity:.2}\"/>",
                fill.r, fill.g, fill.b
            );
        }
    }
    markup.push_str("</svg>\n");

    Ok(SvgDocument { width, height, markup })
}
