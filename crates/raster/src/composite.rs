//! Region compositing: pixelation, mosaic blur, circular masks and grid collages.

use crate::color::Color;
use crate::error::{invalid_params, RasterError, Result};
use crate::geometry::{cover_fit_crop, PixelRect, Region};
use crate::pixmap::Pixmap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Replace each `block_size` square inside `region` with the colour of the
/// pixel nearest the block's centre.
///
/// Blocks are anchored at the region's top-left corner; blocks running past
/// the region edge are clipped, and their sample is taken from inside the
/// clipped block.
pub fn pixelate(buffer: &Pixmap, region: &Region, block_size: u32) -> Result<Pixmap> {
    if block_size == 0 {
        return Err(invalid_params("block size must be at least 1"));
    }
    let rect = region.resolve(buffer.width(), buffer.height())?;
    let mut out = buffer.clone();
    if block_size == 1 {
        return Ok(out);
    }

    let half = block_size / 2;
    for by in (rect.y..rect.bottom()).step_by(block_size as usize) {
        let bh = block_size.min(rect.bottom() - by);
        for bx in (rect.x..rect.right()).step_by(block_size as usize) {
            let bw = block_size.min(rect.right() - bx);
            let sample = buffer.pixel(bx + half.min(bw - 1), by + half.min(bh - 1));
            out.fill_rect(PixelRect::new(bx, by, bw, bh), sample);
        }
    }
    Ok(out)
}

/// Mosaic blur: shrink `region` by `intensity` with box averaging, then scale
/// it back up with nearest-neighbour sampling.
///
/// This is deliberately not a Gaussian blur; the result is deterministic and
/// hides detail the same way on every run.
pub fn blur_region(buffer: &Pixmap, region: &Region, intensity: f64) -> Result<Pixmap> {
    if !intensity.is_finite() || intensity < 1.0 {
        return Err(invalid_params(format!("blur intensity must be at least 1, got {intensity}")));
    }
    let rect = region.resolve(buffer.width(), buffer.height())?;
    let mut out = buffer.clone();

    let small_w = ((f64::from(rect.width) / intensity).floor() as u32).max(1);
    let small_h = ((f64::from(rect.height) / intensity).floor() as u32).max(1);
    debug!(?rect, small_w, small_h, "Mosaic blur");

    let small = downsample_box(buffer, rect, small_w, small_h)?;

    for y in 0..rect.height {
        let sy = scaled_index(y, rect.height, small_h);
        for x in 0..rect.width {
            let sx = scaled_index(x, rect.width, small_w);
            out.set_pixel(rect.x + x, rect.y + y, small.pixel(sx, sy));
        }
    }
    Ok(out)
}

/// Index of the cell containing pixel `i` when `len` pixels map onto `cells`.
fn scaled_index(i: u32, len: u32, cells: u32) -> u32 {
    ((u64::from(i) * u64::from(cells)) / u64::from(len)).min(u64::from(cells - 1)) as u32
}

fn downsample_box(buffer: &Pixmap, rect: PixelRect, small_w: u32, small_h: u32) -> Result<Pixmap> {
    let cells = small_w as usize * small_h as usize;
    let mut sums = vec![[0_u64; 5]; cells];

    for y in 0..rect.height {
        let cy = scaled_index(y, rect.height, small_h) as usize;
        for x in 0..rect.width {
            let cx = scaled_index(x, rect.width, small_w) as usize;
            let px = buffer.pixel(rect.x + x, rect.y + y);
            let a = u64::from(px.a);
            let cell = &mut sums[cy * small_w as usize + cx];
            cell[0] += u64::from(px.r) * a;
            cell[1] += u64::from(px.g) * a;
            cell[2] += u64::from(px.b) * a;
            cell[3] += a;
            cell[4] += 1;
        }
    }

    let mut small = Pixmap::new(small_w, small_h)?;
    for (i, cell) in sums.iter().enumerate() {
        let (alpha_sum, n) = (cell[3], cell[4].max(1));
        let color = if alpha_sum == 0 {
            Color::TRANSPARENT
        } else {
            let avg = |v: u64| ((v + alpha_sum / 2) / alpha_sum).min(255) as u8;
            Color::rgba(avg(cell[0]), avg(cell[1]), avg(cell[2]), ((alpha_sum + n / 2) / n) as u8)
        };
        small.set_pixel((i % small_w as usize) as u32, (i / small_w as usize) as u32, color);
    }
    Ok(small)
}

/// Center-crop to a square, scale to `diameter`, and clear everything outside
/// the inscribed circle.
pub fn circular_mask(buffer: &Pixmap, diameter: u32) -> Result<Pixmap> {
    if diameter == 0 {
        return Err(invalid_params("diameter must be at least 1"));
    }
    let d = f64::from(diameter);
    let crop = cover_fit_crop(f64::from(buffer.width()), f64::from(buffer.height()), d, d)?;

    let mut out = Pixmap::new(diameter, diameter)?;
    out.draw_scaled_over(buffer, crop, PixelRect::new(0, 0, diameter, diameter));

    let radius = d / 2.0;
    let radius_sq = radius * radius;
    for y in 0..diameter {
        let dy = f64::from(y) + 0.5 - radius;
        for x in 0..diameter {
            let dx = f64::from(x) + 0.5 - radius;
            if dx * dx + dy * dy > radius_sq {
                out.set_pixel(x, y, Color::TRANSPARENT);
            }
        }
    }
    Ok(out)
}

/// Layout for [`composite_grid`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollageParams {
    /// Images per row
    pub columns: u32,
    /// Gap between cells in pixels
    pub gap_px: u32,
    /// Side length of every square cell
    pub cell_size: u32,
    /// Fill drawn beneath all cells
    pub background: Color,
}

impl CollageParams {
    /// Output `(width, height)` for `count` images.
    ///
    /// Columns are capped at `count`, so a single image yields one cell.
    pub fn canvas_size(&self, count: usize) -> Result<(u32, u32)> {
        if count == 0 {
            return Err(RasterError::EmptyInput);
        }
        if self.columns == 0 || self.cell_size == 0 {
            return Err(invalid_params("columns and cell size must be at least 1"));
        }
        let columns = self.columns.min(u32::try_from(count).unwrap_or(u32::MAX));
        let rows = u32::try_from(count.div_ceil(columns as usize))
            .map_err(|_| invalid_params("too many images"))?;
        let extent = |n: u32| -> Result<u32> {
            n.checked_mul(self.cell_size)
                .and_then(|v| v.checked_add((n - 1).checked_mul(self.gap_px)?))
                .ok_or_else(|| invalid_params("collage is too large"))
        };
        Ok((extent(columns)?, extent(rows)?))
    }

    fn effective_columns(&self, count: usize) -> u32 {
        self.columns.min(u32::try_from(count).unwrap_or(u32::MAX)).max(1)
    }
}

/// Lay images out left-to-right, top-to-bottom, each cover-fit into its cell.
///
/// The background is filled before any image is drawn, so transparent source
/// regions show it.
pub fn composite_grid(images: &[Pixmap], layout: &CollageParams) -> Result<Pixmap> {
    let (width, height) = layout.canvas_size(images.len())?;
    let columns = layout.effective_columns(images.len());
    let cell = layout.cell_size;
    // one image never steps, and larger grids were bounded by canvas_size
    let stride = if images.len() > 1 {
        cell.checked_add(layout.gap_px).ok_or_else(|| invalid_params("collage gap is too large"))?
    } else {
        cell
    };

    let mut out = Pixmap::filled(width, height, layout.background)?;
    for (i, img) in images.iter().enumerate() {
        let col = i as u32 % columns;
        let row = i as u32 / columns;
        let crop = cover_fit_crop(
            f64::from(img.width()),
            f64::from(img.height()),
            f64::from(cell),
            f64::from(cell),
        )?;
        out.draw_scaled_over(img, crop, PixelRect::new(col * stride, row * stride, cell, cell));
    }
    debug!(count = images.len(), width, height, "Collage composed");
    Ok(out)
}

/// Where [`watermark`] places the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    /// Top-left corner, inset by the padding
    TopLeft,
    /// Top-right corner, inset by the padding
    TopRight,
    /// Centred
    Center,
    /// Bottom-left corner, inset by the padding
    BottomLeft,
    /// Bottom-right corner, inset by the padding
    #[default]
    BottomRight,
    /// Repeated across the whole image
    Tile,
}

/// Inset from the edges for corner placements.
pub const WATERMARK_PADDING: u32 = 20;

const TILE_GAP: u32 = 100;

/// Blend `overlay` onto a copy of `buffer` with its alpha scaled by `opacity`.
///
/// Corner placements sit [`WATERMARK_PADDING`] pixels in from the edges.
/// `Tile` repeats the overlay from the top-left, stepping `overlay width + 100`
/// across and `4 x overlay height` down. Parts of the overlay that fall
/// outside the image are clipped.
pub fn watermark(
    buffer: &Pixmap,
    overlay: &Pixmap,
    opacity: f32,
    position: WatermarkPosition,
) -> Result<Pixmap> {
    if !opacity.is_finite() || opacity <= 0.0 || opacity > 1.0 {
        return Err(invalid_params(format!("watermark opacity must be within (0, 1], got {opacity}")));
    }

    let mut mark = overlay.clone();
    if opacity < 1.0 {
        mark.map_pixels(|px| px[3] = (f32::from(px[3]) * opacity).round() as u8);
    }

    let mut out = buffer.clone();
    if position == WatermarkPosition::Tile {
        let step_x = mark.width().saturating_add(TILE_GAP) as usize;
        let step_y = mark.height().saturating_mul(4) as usize;
        for y in (0..out.height()).step_by(step_y) {
            for x in (0..out.width()).step_by(step_x) {
                out.draw_over(&mark, i64::from(x), i64::from(y));
            }
        }
        return Ok(out);
    }

    let (w, h) = (i64::from(out.width()), i64::from(out.height()));
    let (ow, oh) = (i64::from(mark.width()), i64::from(mark.height()));
    let pad = i64::from(WATERMARK_PADDING);
    let (x, y) = match position {
        WatermarkPosition::TopLeft => (pad, pad),
        WatermarkPosition::TopRight => (w - pad - ow, pad),
        WatermarkPosition::Center => ((w - ow) / 2, (h - oh) / 2),
        WatermarkPosition::BottomLeft => (pad, h - pad - oh),
        WatermarkPosition::BottomRight | WatermarkPosition::Tile => (w - pad - ow, h - pad - oh),
    };
    out.draw_over(&mark, x, y);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn noise(w: u32, h: u32) -> Pixmap {
        let mut pm = Pixmap::new(w, h).unwrap();
        for y in 0..h {
            for x in 0..w {
                let v = (x * 31 + y * 17) as u8;
                pm.set_pixel(x, y, Color::rgb(v, v.wrapping_mul(3), 255 - v));
            }
        }
        pm
    }

    #[test]
    fn test_pixelate_solid_red_unchanged() {
        let src = Pixmap::filled(100, 100, Color::rgb(255, 0, 0)).unwrap();
        let out = pixelate(&src, &Region::full(), 10).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn test_pixelate_blocks_are_uniform() {
        let src = noise(23, 17);
        let out = pixelate(&src, &Region::full(), 5).unwrap();
        for by in (0..17).step_by(5) {
            for bx in (0..23).step_by(5) {
                let mut colors = HashSet::new();
                for y in by..(by + 5).min(17) {
                    for x in bx..(bx + 5).min(23) {
                        colors.insert(out.pixel(x, y));
                    }
                }
                assert_eq!(colors.len(), 1, "block at ({bx}, {by})");
            }
        }
    }

    #[test]
    fn test_pixelate_samples_block_centre() {
        let src = noise(10, 10);
        let out = pixelate(&src, &Region::full(), 4).unwrap();
        assert_eq!(out.pixel(0, 0), src.pixel(2, 2));
        // clipped edge block 8..10 samples inside the clip
        assert_eq!(out.pixel(9, 9), src.pixel(9, 9));
    }

    #[test]
    fn test_pixelate_region_only() {
        let src = noise(20, 20);
        let out = pixelate(&src, &Region::pixels(10.0, 10.0, 10.0, 10.0), 5).unwrap();
        assert_eq!(out.pixel(3, 3), src.pixel(3, 3));
        assert_eq!(out.pixel(10, 10), src.pixel(12, 12));
    }

    #[test]
    fn test_pixelate_is_deterministic() {
        let src = noise(31, 29);
        let a = pixelate(&src, &Region::percent(10.0, 10.0, 70.0, 70.0), 6).unwrap();
        let b = pixelate(&src, &Region::percent(10.0, 10.0, 70.0, 70.0), 6).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pixelate_rejects_zero_block() {
        assert!(pixelate(&noise(4, 4), &Region::full(), 0).is_err());
    }

    #[test]
    fn test_blur_region_limits_distinct_colors() {
        let src = noise(40, 40);
        let out = blur_region(&src, &Region::pixels(0.0, 0.0, 20.0, 20.0), 10.0).unwrap();
        let inside: HashSet<_> = (0..20)
            .flat_map(|y| (0..20).map(move |x| (x, y)))
            .map(|(x, y)| out.pixel(x, y))
            .collect();
        assert!(inside.len() <= 4);
        assert_eq!(out.pixel(30, 30), src.pixel(30, 30));
    }

    #[test]
    fn test_blur_uniform_region_unchanged() {
        let src = Pixmap::filled(12, 12, Color::rgb(40, 80, 120)).unwrap();
        assert_eq!(blur_region(&src, &Region::full(), 5.0).unwrap(), src);
    }

    #[test]
    fn test_blur_rejects_bad_intensity() {
        let src = noise(4, 4);
        assert!(blur_region(&src, &Region::full(), 0.5).is_err());
        assert!(blur_region(&src, &Region::full(), f64::NAN).is_err());
    }

    #[test]
    fn test_circular_mask() {
        let src = Pixmap::filled(300, 200, Color::rgb(0, 0, 255)).unwrap();
        let out = circular_mask(&src, 50).unwrap();
        assert_eq!(out.dimensions(), (50, 50));
        assert_eq!(out.pixel(0, 0).a, 0);
        assert_eq!(out.pixel(49, 49).a, 0);
        assert_eq!(out.pixel(25, 25), Color::rgb(0, 0, 255));
        assert_eq!(out.pixel(25, 0).a, 255);
    }

    #[test]
    fn test_grid_four_images() {
        let images: Vec<_> = (0..4)
            .map(|i| Pixmap::filled(50 + i * 10, 80, Color::rgb(200, 0, 0)).unwrap())
            .collect();
        let layout = CollageParams {
            columns: 2,
            gap_px: 10,
            cell_size: 400,
            background: Color::rgb(0x1a, 0x1a, 0x24),
        };
        let out = composite_grid(&images, &layout).unwrap();
        assert_eq!(out.dimensions(), (810, 810));
        assert_eq!(out.pixel(405, 5), Color::rgb(0x1a, 0x1a, 0x24));
        assert_eq!(out.pixel(0, 0), Color::rgb(200, 0, 0));
        assert_eq!(out.pixel(809, 809), Color::rgb(200, 0, 0));
    }

    #[test]
    fn test_grid_single_image_is_one_cell() {
        let img = Pixmap::filled(30, 30, Color::WHITE).unwrap();
        let layout = CollageParams { columns: 3, gap_px: 10, cell_size: 30, background: Color::BLACK };
        let out = composite_grid(std::slice::from_ref(&img), &layout).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_grid_background_under_transparency() {
        let img = Pixmap::new(10, 10).unwrap();
        let layout = CollageParams { columns: 1, gap_px: 0, cell_size: 10, background: Color::BLACK };
        let out = composite_grid(&[img], &layout).unwrap();
        assert!(out.data().chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn test_grid_empty_input() {
        let layout = CollageParams { columns: 2, gap_px: 0, cell_size: 10, background: Color::BLACK };
        let err = composite_grid(&[], &layout).unwrap_err();
        assert!(matches!(err, RasterError::EmptyInput));
    }

    #[test]
    fn test_grid_single_image_ignores_huge_gap() {
        let params = CollageParams { columns: 1, gap_px: u32::MAX, cell_size: 4, background: Color::BLACK };
        let out = composite_grid(&[noise(4, 4)], &params).unwrap();
        assert_eq!(out.dimensions(), (4, 4));

        let err = composite_grid(&[noise(4, 4), noise(4, 4)], &params).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParameters);
    }

    #[test]
    fn test_watermark_corners() {
        let base = Pixmap::filled(100, 60, Color::BLACK).unwrap();
        let mark = Pixmap::filled(10, 5, Color::WHITE).unwrap();

        let out = watermark(&base, &mark, 1.0, WatermarkPosition::BottomRight).unwrap();
        assert_eq!(out.pixel(70, 35), Color::WHITE);
        assert_eq!(out.pixel(79, 39), Color::WHITE);
        assert_eq!(out.pixel(80, 40), Color::BLACK);
        assert_eq!(out.pixel(69, 35), Color::BLACK);

        let out = watermark(&base, &mark, 1.0, WatermarkPosition::TopLeft).unwrap();
        assert_eq!(out.pixel(20, 20), Color::WHITE);
        assert_eq!(out.pixel(19, 20), Color::BLACK);

        let out = watermark(&base, &mark, 1.0, WatermarkPosition::Center).unwrap();
        assert_eq!(out.pixel(45, 27), Color::WHITE);
        assert_eq!(out.pixel(44, 27), Color::BLACK);
        assert_eq!(base.pixel(45, 27), Color::BLACK);
    }

    #[test]
    fn test_watermark_opacity_blends() {
        let base = Pixmap::filled(50, 50, Color::BLACK).unwrap();
        let mark = Pixmap::filled(4, 4, Color::WHITE).unwrap();
        let out = watermark(&base, &mark, 0.5, WatermarkPosition::TopLeft).unwrap();
        let c = out.pixel(21, 21);
        assert!((120..=136).contains(&c.r), "got {c:?}");
        assert_eq!(c.a, 255);

        for bad in [0.0, -0.5, 1.5, f32::NAN] {
            let err = watermark(&base, &mark, bad, WatermarkPosition::TopLeft).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidParameters);
        }
    }

    #[test]
    fn test_watermark_tile_repeats() {
        let base = Pixmap::filled(250, 50, Color::BLACK).unwrap();
        let mark = Pixmap::filled(10, 5, Color::WHITE).unwrap();
        let out = watermark(&base, &mark, 1.0, WatermarkPosition::Tile).unwrap();
        for (x, y) in [(0, 0), (110, 0), (220, 0), (0, 20), (110, 40)] {
            assert_eq!(out.pixel(x, y), Color::WHITE, "at {x},{y}");
        }
        assert_eq!(out.pixel(50, 0), Color::BLACK);
        assert_eq!(out.pixel(0, 10), Color::BLACK);
    }

    #[test]
    fn test_watermark_larger_than_image_is_clipped() {
        let base = Pixmap::filled(8, 8, Color::BLACK).unwrap();
        let mark = Pixmap::filled(64, 64, Color::WHITE).unwrap();
        let out = watermark(&base, &mark, 1.0, WatermarkPosition::Center).unwrap();
        assert_eq!(out.dimensions(), (8, 8));
        assert!(out.data().chunks_exact(4).all(|px| px == [255, 255, 255, 255]));
    }
}
