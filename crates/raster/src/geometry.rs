//! Geometry helpers: rotated/skewed canvas sizes, cover-fit cropping,
//! aspect-ratio math and region resolution.

use crate::error::{invalid_dims, invalid_params, Result};
use serde::{Deserialize, Serialize};

/// Tolerance for snapping float sizes that are integers up to rounding noise.
const SNAP_EPSILON: f64 = 1e-6;

/// Integer rectangle in pixel coordinates, fully inside its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl PixelRect {
    /// Create a rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// True when the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersect with a `width x height` buffer.
    pub fn clamp_to(&self, width: u32, height: u32) -> PixelRect {
        let x = self.x.min(width);
        let y = self.y.min(height);
        PixelRect {
            x,
            y,
            width: self.right().min(width).saturating_sub(x),
            height: self.bottom().min(height).saturating_sub(y),
        }
    }
}

/// Unit a [`Region`] is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Absolute pixels
    Pixels,
    /// Percent (0-100) of the buffer's width/height
    Percent,
}

/// A rectangle in pixels or percentages, resolved against a buffer later.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
    /// Unit of all four values
    pub unit: Unit,
}

impl Region {
    /// The whole buffer.
    pub const fn full() -> Self {
        Self::percent(0.0, 0.0, 100.0, 100.0)
    }

    /// Region in absolute pixels.
    pub const fn pixels(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height, unit: Unit::Pixels }
    }

    /// Region in percentages of the buffer size.
    pub const fn percent(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height, unit: Unit::Percent }
    }

    /// Percentage region spanned by two corners given in any order.
    pub fn from_percent_corners(start_x: f64, start_y: f64, end_x: f64, end_y: f64) -> Self {
        Self::percent(
            start_x.min(end_x),
            start_y.min(end_y),
            (end_x - start_x).abs(),
            (end_y - start_y).abs(),
        )
    }

    /// Resolve to a non-empty pixel rectangle inside a `width x height` buffer.
    ///
    /// Edges are rounded to the nearest pixel and clamped to the buffer.
    pub fn resolve(&self, width: u32, height: u32) -> Result<PixelRect> {
        let values = [self.x, self.y, self.width, self.height];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(invalid_params("region values must be finite"));
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(invalid_params("region width and height must not be negative"));
        }

        let (sx, sy) = match self.unit {
            Unit::Pixels => (1.0, 1.0),
            Unit::Percent => (f64::from(width) / 100.0, f64::from(height) / 100.0),
        };

        let clamp = |v: f64, max: u32| v.round().clamp(0.0, f64::from(max)) as u32;
        let x0 = clamp(self.x * sx, width);
        let y0 = clamp(self.y * sy, height);
        let x1 = clamp((self.x + self.width) * sx, width);
        let y1 = clamp((self.y + self.height) * sy, height);

        let rect = PixelRect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0));
        if rect.is_empty() {
            return Err(invalid_params(format!(
                "region {self:?} does not overlap a {width}x{height} buffer"
            )));
        }
        Ok(rect)
    }
}

/// Floating-point canvas size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasSize {
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl CanvasSize {
    /// Round up to whole pixels, ignoring float noise just above an integer.
    pub fn to_pixels(self) -> (u32, u32) {
        (ceil_snapped(self.width), ceil_snapped(self.height))
    }
}

/// Canvas needed to hold a sheared image, plus the translation that keeps it
/// in positive coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewedCanvas {
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
    /// Horizontal translation applied before shearing
    pub offset_x: f64,
    /// Vertical translation applied before shearing
    pub offset_y: f64,
}

/// Source rectangle (float pixels) to draw into a destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    /// Left edge in source pixels
    pub sx: f64,
    /// Top edge in source pixels
    pub sy: f64,
    /// Width in source pixels
    pub sw: f64,
    /// Height in source pixels
    pub sh: f64,
}

fn check_dimension(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v <= 0.0 {
        return Err(invalid_dims(format!("{name} must be finite and positive, got {v}")));
    }
    Ok(())
}

fn check_angle(name: &str, degrees: f64) -> Result<()> {
    if !degrees.is_finite() {
        return Err(invalid_params(format!("{name} must be finite, got {degrees}")));
    }
    Ok(())
}

pub(crate) fn ceil_snapped(v: f64) -> u32 {
    let rounded = v.round();
    if (v - rounded).abs() < SNAP_EPSILON {
        rounded.max(0.0) as u32
    } else {
        v.ceil().max(0.0) as u32
    }
}

/// Axis-aligned bounding box of a `width x height` rectangle rotated by
/// `angle_degrees`.
///
/// # Example
/// ```
/// use pixelforge_raster::rotated_canvas_size;
///
/// let size = rotated_canvas_size(200.0, 100.0, 90.0).unwrap();
/// assert_eq!(size.to_pixels(), (100, 200));
/// ```
pub fn rotated_canvas_size(width: f64, height: f64, angle_degrees: f64) -> Result<CanvasSize> {
    check_dimension("width", width)?;
    check_dimension("height", height)?;
    check_angle("angle", angle_degrees)?;

    let radians = angle_degrees.to_radians();
    let sin = radians.sin().abs();
    let cos = radians.cos().abs();

    Ok(CanvasSize {
        width: width * cos + height * sin,
        height: width * sin + height * cos,
    })
}

/// Canvas size for a shear of `skew_x_deg` / `skew_y_deg`.
///
/// Angles must lie strictly between -90 and 90 degrees.
pub fn skewed_canvas_size(
    width: f64,
    height: f64,
    skew_x_deg: f64,
    skew_y_deg: f64,
) -> Result<SkewedCanvas> {
    check_dimension("width", width)?;
    check_dimension("height", height)?;
    for (name, angle) in [("skew x", skew_x_deg), ("skew y", skew_y_deg)] {
        check_angle(name, angle)?;
        if angle.abs() >= 90.0 {
            return Err(invalid_params(format!(
                "{name} must be between -90 and 90 degrees, got {angle}"
            )));
        }
    }

    let extra_width = (height * skew_x_deg.to_radians().tan()).abs();
    let extra_height = (width * skew_y_deg.to_radians().tan()).abs();

    Ok(SkewedCanvas {
        width: width + extra_width,
        height: height + extra_height,
        offset_x: if skew_x_deg < 0.0 { extra_width } else { 0.0 },
        offset_y: if skew_y_deg < 0.0 { extra_height } else { 0.0 },
    })
}

/// Centered source crop that fills `dst_w x dst_h` without distortion.
///
/// # Example
/// ```
/// use pixelforge_raster::cover_fit_crop;
///
/// let crop = cover_fit_crop(800.0, 400.0, 100.0, 100.0).unwrap();
/// assert_eq!((crop.sx, crop.sy, crop.sw, crop.sh), (200.0, 0.0, 400.0, 400.0));
/// ```
pub fn cover_fit_crop(src_w: f64, src_h: f64, dst_w: f64, dst_h: f64) -> Result<CropRect> {
    check_dimension("source width", src_w)?;
    check_dimension("source height", src_h)?;
    check_dimension("destination width", dst_w)?;
    check_dimension("destination height", dst_h)?;

    let scale = (dst_w / src_w).max(dst_h / src_h);
    let sw = dst_w / scale;
    let sh = dst_h / scale;

    Ok(CropRect {
        sx: (src_w - sw) / 2.0,
        sy: (src_h - sh) / 2.0,
        sw,
        sh,
    })
}

/// Height for `width` at aspect `ratio` (width / height), capped at `max_height`.
pub fn aspect_ratio_height(width: u32, ratio: f64, max_height: u32) -> Result<u32> {
    check_dimension("width", f64::from(width))?;
    check_dimension("aspect ratio", ratio)?;

    let height = (f64::from(width) / ratio).round() as u32;
    Ok(height.clamp(1, max_height.max(1)))
}

/// Dimensions for `target_width` keeping the aspect ratio; never upscales.
pub fn calculate_dimensions(current_width: u32, current_height: u32, target_width: u32) -> (u32, u32) {
    if target_width == 0 || current_width <= target_width {
        return (current_width, current_height);
    }

    let ratio = f64::from(target_width) / f64::from(current_width);
    let new_height = (f64::from(current_height) * ratio).round() as u32;

    (target_width, new_height.max(1))
}

/// Dimensions whose longer side is at most `max_dimension`; never upscales.
pub fn fit_within_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if max_dimension == 0 || (width <= max_dimension && height <= max_dimension) {
        return (width, height);
    }
    if width >= height {
        calculate_dimensions(width, height, max_dimension)
    } else {
        let (h, w) = calculate_dimensions(height, width, max_dimension);
        (w, h)
    }
}
