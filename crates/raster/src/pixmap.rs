//! Owned RGBA pixel buffer.

use crate::alpha::blend_over;
use crate::color::Color;
use crate::error::{invalid_dims, RasterError, Result};
use crate::geometry::{CropRect, PixelRect};
use base64::Engine;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Row-major, straight-alpha RGBA8 buffer with explicit dimensions.
///
/// Invariant: `data.len() == width * height * 4` and both dimensions are
/// non-zero. Transforms take `&Pixmap` and return a new one, so a caller's
/// reference to an earlier buffer is never disturbed.
///
/// Serializes as `{ width, height, rgba }` with the bytes in base64, so a
/// watermark overlay can travel inside a JSON job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPixmap", into = "RawPixmap")]
pub struct Pixmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct RawPixmap {
    width: u32,
    height: u32,
    rgba: String,
}

impl From<Pixmap> for RawPixmap {
    fn from(pm: Pixmap) -> Self {
        let rgba = base64::engine::general_purpose::STANDARD.encode(&pm.data);
        Self { width: pm.width, height: pm.height, rgba }
    }
}

impl TryFrom<RawPixmap> for Pixmap {
    type Error = RasterError;

    fn try_from(raw: RawPixmap) -> Result<Self> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(raw.rgba.as_bytes())
            .map_err(|e| RasterError::Decode(format!("pixel data is not base64: {e}")))?;
        Pixmap::from_rgba(raw.width, raw.height, data)
    }
}

/// What sampling returns for coordinates outside the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMode {
    /// Repeat the nearest edge pixel
    Clamp,
    /// Fully transparent
    Transparent,
}

fn byte_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(invalid_dims(format!("{width}x{height} buffer has no pixels")));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| invalid_dims(format!("{width}x{height} buffer is too large")))
}

impl Pixmap {
    /// Transparent buffer.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let len = byte_len(width, height)?;
        Ok(Self { width, height, data: vec![0; len] })
    }

    /// Buffer filled with one colour.
    pub fn filled(width: u32, height: u32, color: Color) -> Result<Self> {
        let len = byte_len(width, height)?;
        let data = color.to_array().iter().copied().cycle().take(len).collect();
        Ok(Self { width, height, data })
    }

    /// Wrap raw RGBA bytes, checking the length invariant.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = byte_len(width, height)?;
        if data.len() != expected {
            return Err(invalid_dims(format!(
                "{width}x{height} buffer needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Raw RGBA bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning the raw bytes.
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Pixel at `(x, y)`.
    ///
    /// # Panics
    /// If the coordinate is outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        let i = self.offset(x, y);
        Color::from_slice(&self.data[i..i + 4])
    }

    /// Pixel at `(x, y)`, or `None` outside the buffer.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Color> {
        (x < self.width && y < self.height).then(|| self.pixel(x, y))
    }

    /// Overwrite the pixel at `(x, y)`. Out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        if x < self.width && y < self.height {
            let i = self.offset(x, y);
            self.data[i..i + 4].copy_from_slice(&color.to_array());
        }
    }

    /// Overwrite every pixel of `rect` (clipped to the buffer).
    pub fn fill_rect(&mut self, rect: PixelRect, color: Color) {
        let rect = rect.clamp_to(self.width, self.height);
        let px = color.to_array();
        for y in rect.y..rect.bottom() {
            let start = self.offset(rect.x, y);
            let end = start + rect.width as usize * 4;
            for chunk in self.data[start..end].chunks_exact_mut(4) {
                chunk.copy_from_slice(&px);
            }
        }
    }

    /// Copy `rect` into a new buffer.
    pub fn copy_rect(&self, rect: PixelRect) -> Result<Pixmap> {
        let rect = rect.clamp_to(self.width, self.height);
        let mut out = Vec::with_capacity(byte_len(rect.width, rect.height)?);
        for y in rect.y..rect.bottom() {
            let start = self.offset(rect.x, y);
            out.extend_from_slice(&self.data[start..start + rect.width as usize * 4]);
        }
        Pixmap::from_rgba(rect.width, rect.height, out)
    }

    /// Replace pixels with `src` placed at `(x, y)`, clipped to the buffer.
    pub fn paste(&mut self, src: &Pixmap, x: i64, y: i64) {
        self.combine(src, x, y, |_, s| s);
    }

    /// Alpha-blend `src` over this buffer at `(x, y)`, clipped to the buffer.
    pub fn draw_over(&mut self, src: &Pixmap, x: i64, y: i64) {
        self.combine(src, x, y, blend_over);
    }

    fn combine(&mut self, src: &Pixmap, x: i64, y: i64, op: impl Fn(Color, Color) -> Color) {
        for sy in 0..src.height {
            let dy = y + i64::from(sy);
            if dy < 0 || dy >= i64::from(self.height) {
                continue;
            }
            for sx in 0..src.width {
                let dx = x + i64::from(sx);
                if dx < 0 || dx >= i64::from(self.width) {
                    continue;
                }
                let (dx, dy) = (dx as u32, dy as u32);
                let merged = op(self.pixel(dx, dy), src.pixel(sx, sy));
                self.set_pixel(dx, dy, merged);
            }
        }
    }

    /// Bilinear sample at continuous coordinate `(u, v)`; pixel centres sit at
    /// half-integers. Interpolation is done on premultiplied values so
    /// transparent neighbours do not darken edges.
    pub fn sample_bilinear(&self, u: f64, v: f64, edge: EdgeMode) -> Color {
        let tx = u - 0.5;
        let ty = v - 0.5;
        let x0 = tx.floor();
        let y0 = ty.floor();
        let fx = tx - x0;
        let fy = ty - y0;

        let mut acc = [0.0_f64; 4];
        for (dx, dy, w) in [
            (0.0, 0.0, (1.0 - fx) * (1.0 - fy)),
            (1.0, 0.0, fx * (1.0 - fy)),
            (0.0, 1.0, (1.0 - fx) * fy),
            (1.0, 1.0, fx * fy),
        ] {
            if w == 0.0 {
                continue;
            }
            if let Some(c) = self.fetch(x0 + dx, y0 + dy, edge) {
                let a = f64::from(c.a);
                acc[0] += w * f64::from(c.r) * a;
                acc[1] += w * f64::from(c.g) * a;
                acc[2] += w * f64::from(c.b) * a;
                acc[3] += w * a;
            }
        }

        if acc[3] <= f64::EPSILON {
            return Color::TRANSPARENT;
        }
        let channel = |v: f64| (v / acc[3]).round().clamp(0.0, 255.0) as u8;
        Color::rgba(
            channel(acc[0]),
            channel(acc[1]),
            channel(acc[2]),
            acc[3].round().clamp(0.0, 255.0) as u8,
        )
    }

    fn fetch(&self, x: f64, y: f64, edge: EdgeMode) -> Option<Color> {
        let max_x = f64::from(self.width - 1);
        let max_y = f64::from(self.height - 1);
        let inside = (0.0..=max_x).contains(&x) && (0.0..=max_y).contains(&y);
        match (inside, edge) {
            (true, _) => Some(self.pixel(x as u32, y as u32)),
            (false, EdgeMode::Clamp) => {
                Some(self.pixel(x.clamp(0.0, max_x) as u32, y.clamp(0.0, max_y) as u32))
            }
            (false, EdgeMode::Transparent) => None,
        }
    }

    /// Scale the `crop` area of `src` into `dst` and blend it over this buffer.
    ///
    /// Sampling clamps to the source edges, so an opaque source leaves no
    /// transparent border inside `dst`.
    pub fn draw_scaled_over(&mut self, src: &Pixmap, crop: CropRect, dst: PixelRect) {
        let dst = dst.clamp_to(self.width, self.height);
        if dst.is_empty() {
            return;
        }
        let scale_x = crop.sw / f64::from(dst.width);
        let scale_y = crop.sh / f64::from(dst.height);
        for j in 0..dst.height {
            let v = crop.sy + (f64::from(j) + 0.5) * scale_y;
            for i in 0..dst.width {
                let u = crop.sx + (f64::from(i) + 0.5) * scale_x;
                let sample = src.sample_bilinear(u, v, EdgeMode::Clamp);
                let (x, y) = (dst.x + i, dst.y + j);
                let merged = blend_over(self.pixel(x, y), sample);
                self.set_pixel(x, y, merged);
            }
        }
    }

    /// Apply `f` to every pixel in place.
    pub(crate) fn map_pixels<F>(&mut self, f: F)
    where
        F: Fn(&mut [u8]) + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        self.data.par_chunks_exact_mut(4).for_each(f);

        #[cfg(not(feature = "parallel"))]
        self.data.chunks_exact_mut(4).for_each(f);
    }
}

#[cfg(feature = "processing")]
impl From<Pixmap> for image::RgbaImage {
    fn from(pm: Pixmap) -> Self {
        // dimensions and length are checked on construction
        image::RgbaImage::from_raw(pm.width, pm.height, pm.data)
            .unwrap_or_else(|| image::RgbaImage::new(0, 0))
    }
}

#[cfg(feature = "processing")]
impl TryFrom<image::RgbaImage> for Pixmap {
    type Error = crate::error::RasterError;

    fn try_from(img: image::RgbaImage) -> Result<Self> {
        let (w, h) = img.dimensions();
        Pixmap::from_rgba(w, h, img.into_raw())
    }
}
