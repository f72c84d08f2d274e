//! Pure geometric and point transforms over [`Pixmap`].
//!
//! Every function borrows its input and returns a new buffer.

use crate::color::Color;
use crate::error::{invalid_params, Result};
use crate::geometry::{ceil_snapped, rotated_canvas_size, skewed_canvas_size, Region};
use crate::pixmap::{EdgeMode, Pixmap};

/// 2x3 affine matrix mapping `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)`,
/// the same layout as a 2D canvas `transform(a, b, c, d, e, f)` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    /// x scale
    pub a: f64,
    /// y shear from x
    pub b: f64,
    /// x shear from y
    pub c: f64,
    /// y scale
    pub d: f64,
    /// x translation
    pub e: f64,
    /// y translation
    pub f: f64,
}

impl Affine {
    /// No-op transform.
    pub const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    /// Translation by `(tx, ty)`.
    pub fn translate(tx: f64, ty: f64) -> Self {
        Affine { e: tx, f: ty, ..Self::IDENTITY }
    }

    /// Clockwise rotation (y axis pointing down) by `radians`.
    pub fn rotate(radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Affine { a: cos, b: sin, c: -sin, d: cos, e: 0.0, f: 0.0 }
    }

    /// Shear by `tan_x` horizontally and `tan_y` vertically.
    pub fn skew(tan_x: f64, tan_y: f64) -> Self {
        Affine { a: 1.0, b: tan_y, c: tan_x, d: 1.0, e: 0.0, f: 0.0 }
    }

    /// `self` applied after `other`.
    pub fn then(self, other: Affine) -> Affine {
        Affine {
            a: other.a * self.a + other.c * self.b,
            b: other.b * self.a + other.d * self.b,
            c: other.a * self.c + other.c * self.d,
            d: other.b * self.c + other.d * self.d,
            e: other.a * self.e + other.c * self.f + other.e,
            f: other.b * self.e + other.d * self.f + other.f,
        }
    }

    /// Map a point.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// Inverse matrix, or `None` when singular.
    pub fn invert(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }
}

/// Draw `src` through `matrix` onto a transparent `width x height` canvas.
///
/// Each destination pixel centre is mapped back into the source and
/// bilinearly sampled; points that land outside the source are transparent.
pub fn warp(src: &Pixmap, matrix: Affine, width: u32, height: u32) -> Result<Pixmap> {
    let inverse = matrix
        .invert()
        .ok_or_else(|| invalid_params("transform matrix is not invertible"))?;

    let mut out = Pixmap::new(width, height)?;
    for y in 0..height {
        for x in 0..width {
            let (u, v) = inverse.apply(f64::from(x) + 0.5, f64::from(y) + 0.5);
            let sample = src.sample_bilinear(u, v, EdgeMode::Transparent);
            if sample.a != 0 {
                out.set_pixel(x, y, sample);
            }
        }
    }
    Ok(out)
}

/// Rotate clockwise by `degrees` onto a canvas sized to the rotated bounds.
///
/// Multiples of 90 degrees are exact pixel remaps; other angles are resampled.
pub fn rotate(src: &Pixmap, degrees: f64) -> Result<Pixmap> {
    let (w, h) = src.dimensions();
    let size = rotated_canvas_size(f64::from(w), f64::from(h), degrees)?;

    let normalized = degrees.rem_euclid(360.0);
    if normalized.fract() == 0.0 && (normalized as u32) % 90 == 0 {
        return rotate_quadrant(src, (normalized as u32) / 90);
    }

    let (cw, ch) = size.to_pixels();
    let matrix = Affine::translate(-f64::from(w) / 2.0, -f64::from(h) / 2.0)
        .then(Affine::rotate(degrees.to_radians()))
        .then(Affine::translate(f64::from(cw) / 2.0, f64::from(ch) / 2.0));
    warp(src, matrix, cw, ch)
}

fn rotate_quadrant(src: &Pixmap, quarter_turns: u32) -> Result<Pixmap> {
    let (w, h) = src.dimensions();
    if quarter_turns % 4 == 0 {
        return Ok(src.clone());
    }
    let (ow, oh) = if quarter_turns % 2 == 1 { (h, w) } else { (w, h) };
    let mut out = Pixmap::new(ow, oh)?;
    for y in 0..h {
        for x in 0..w {
            let (ox, oy) = match quarter_turns % 4 {
                1 => (h - 1 - y, x),
                2 => (w - 1 - x, h - 1 - y),
                _ => (y, w - 1 - x),
            };
            out.set_pixel(ox, oy, src.pixel(x, y));
        }
    }
    Ok(out)
}

/// Shear by `skew_x_deg` / `skew_y_deg` onto a canvas that holds the result.
pub fn skew(src: &Pixmap, skew_x_deg: f64, skew_y_deg: f64) -> Result<Pixmap> {
    let (w, h) = src.dimensions();
    let canvas = skewed_canvas_size(f64::from(w), f64::from(h), skew_x_deg, skew_y_deg)?;
    if skew_x_deg == 0.0 && skew_y_deg == 0.0 {
        return Ok(src.clone());
    }

    let matrix = Affine::skew(skew_x_deg.to_radians().tan(), skew_y_deg.to_radians().tan())
        .then(Affine::translate(canvas.offset_x, canvas.offset_y));
    warp(src, matrix, ceil_snapped(canvas.width), ceil_snapped(canvas.height))
}

/// Mirror horizontally and/or vertically.
pub fn flip(src: &Pixmap, horizontal: bool, vertical: bool) -> Pixmap {
    let (w, h) = src.dimensions();
    let mut out = src.clone();
    if !horizontal && !vertical {
        return out;
    }
    for y in 0..h {
        for x in 0..w {
            let sx = if horizontal { w - 1 - x } else { x };
            let sy = if vertical { h - 1 - y } else { y };
            out.set_pixel(x, y, src.pixel(sx, sy));
        }
    }
    out
}

/// Cut `region` out of the image.
pub fn crop(src: &Pixmap, region: &Region) -> Result<Pixmap> {
    let rect = region.resolve(src.width(), src.height())?;
    src.copy_rect(rect)
}

/// Push RGB channels away from mid-grey: `v + (v - 128) * amount`.
///
/// A cheap contrast boost standing in for real sharpening after upscaling.
pub fn sharpen(src: &Pixmap, amount: f32) -> Result<Pixmap> {
    if !amount.is_finite() || !(0.0..=1.0).contains(&amount) {
        return Err(invalid_params(format!("sharpen amount must be within 0-1, got {amount}")));
    }
    let mut out = src.clone();
    out.map_pixels(|px| {
        for c in &mut px[..3] {
            let v = f32::from(*c);
            *c = (v + (v - 128.0) * amount).round().clamp(0.0, 255.0) as u8;
        }
    });
    Ok(out)
}

/// Fill every pixel with `color` under the image (background-then-draw).
pub fn fill_background(src: &Pixmap, color: Color) -> Result<Pixmap> {
    let mut out = Pixmap::filled(src.width(), src.height(), color)?;
    out.draw_over(src, 0, 0);
    Ok(out)
}
