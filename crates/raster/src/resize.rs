//! Image resizing with the image crate.

use crate::error::{invalid_dims, invalid_params, Result};
use crate::geometry::fit_within_dimensions;
use crate::pixmap::Pixmap;
use crate::transform::sharpen;
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Contrast push applied after upscaling.
const UPSCALE_SHARPEN: f32 = 0.1;

/// Resize to exactly `width x height` with a Lanczos3 filter.
pub fn resize(src: &Pixmap, width: u32, height: u32) -> Result<Pixmap> {
    resize_with(src, width, height, FilterType::Lanczos3)
}

fn resize_with(src: &Pixmap, width: u32, height: u32, filter: FilterType) -> Result<Pixmap> {
    if width == 0 || height == 0 {
        return Err(invalid_dims(format!("cannot resize to {width}x{height}")));
    }
    if src.dimensions() == (width, height) {
        return Ok(src.clone());
    }
    let img: RgbaImage = src.clone().into();
    Pixmap::try_from(imageops::resize(&img, width, height, filter))
}

/// Shrink so the longest side is at most `max_dimension`. Never upscales.
pub fn fit_within(src: &Pixmap, max_dimension: u32) -> Result<Pixmap> {
    if max_dimension == 0 {
        return Err(invalid_dims("max dimension must be at least 1"));
    }
    let (w, h) = fit_within_dimensions(src.width(), src.height(), max_dimension);
    resize(src, w.max(1), h.max(1))
}

/// Enlarge by an integer `factor` (2-4) with Catmull-Rom, then apply a light
/// contrast push.
///
/// This is a plain bicubic upscale, not super-resolution.
pub fn upscale(src: &Pixmap, factor: u32) -> Result<Pixmap> {
    if !(2..=4).contains(&factor) {
        return Err(invalid_params(format!("upscale factor must be 2, 3 or 4, got {factor}")));
    }
    let width = src
        .width()
        .checked_mul(factor)
        .ok_or_else(|| invalid_dims("upscaled width overflows"))?;
    let height = src
        .height()
        .checked_mul(factor)
        .ok_or_else(|| invalid_dims("upscaled height overflows"))?;

    let enlarged = resize_with(src, width, height, FilterType::CatmullRom)?;
    sharpen(&enlarged, UPSCALE_SHARPEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[test]
    fn test_resize_dimensions() {
        let src = Pixmap::filled(40, 20, Color::rgb(10, 200, 30)).unwrap();
        let out = resize(&src, 10, 5).unwrap();
        assert_eq!(out.dimensions(), (10, 5));
        assert_eq!(out.pixel(5, 2), Color::rgb(10, 200, 30));
        assert!(resize(&src, 0, 5).is_err());
    }

    #[test]
    fn test_fit_within_never_upscales() {
        let small = Pixmap::new(100, 50).unwrap();
        assert_eq!(fit_within(&small, 500).unwrap().dimensions(), (100, 50));

        let large = Pixmap::new(4000, 2000).unwrap();
        assert_eq!(fit_within(&large, 1000).unwrap().dimensions(), (1000, 500));
    }

    #[test]
    fn test_upscale_factor() {
        let src = Pixmap::filled(8, 6, Color::rgb(128, 128, 128)).unwrap();
        let out = upscale(&src, 3).unwrap();
        assert_eq!(out.dimensions(), (24, 18));
        // mid grey is the fixed point of the contrast push
        assert_eq!(out.pixel(12, 9), Color::rgb(128, 128, 128));
        assert!(upscale(&src, 1).is_err());
        assert!(upscale(&src, 5).is_err());
    }
}
