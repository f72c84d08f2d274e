//! Image analysis: size, aspect ratio, orientation, brightness and colours.

use crate::color::{average_brightness, dominant_colors};
use crate::config::AnalysisConfig;
use crate::detect::SourceFormat;
use crate::error::Result;
use crate::pixmap::Pixmap;
use serde::Serialize;

/// Landscape, portrait or square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Wider than tall
    Landscape,
    /// Taller than wide
    Portrait,
    /// Equal sides
    Square,
}

impl Orientation {
    /// Orientation of a `width x height` image.
    pub fn of(width: u32, height: u32) -> Self {
        match width.cmp(&height) {
            std::cmp::Ordering::Greater => Orientation::Landscape,
            std::cmp::Ordering::Less => Orientation::Portrait,
            std::cmp::Ordering::Equal => Orientation::Square,
        }
    }
}

/// Coarse brightness bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrightnessLevel {
    /// Average above 180
    Bright,
    /// Average above 100
    Normal,
    /// Everything else
    Dark,
}

impl BrightnessLevel {
    /// Bucket an average brightness in `0..=255`.
    pub fn from_average(avg: f64) -> Self {
        if avg > 180.0 {
            BrightnessLevel::Bright
        } else if avg > 100.0 {
            BrightnessLevel::Normal
        } else {
            BrightnessLevel::Dark
        }
    }
}

/// Summary of a decoded image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageAnalysis {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel count in millions
    pub megapixels: f64,
    /// Reduced ratio such as `16:9`
    pub aspect_ratio: String,
    /// Shape of the image
    pub orientation: Orientation,
    /// Mean of `(R + G + B) / 3` over sampled pixels
    pub brightness: f64,
    /// Bucketed brightness
    pub brightness_level: BrightnessLevel,
    /// Most frequent quantized colours as `#rrggbb`
    pub dominant_colors: Vec<String>,
    /// Formatted source size, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<String>,
}

/// Analyze a decoded image. `source_len` is the encoded size in bytes, if known.
pub fn analyze(buffer: &Pixmap, config: &AnalysisConfig, source_len: Option<u64>) -> Result<ImageAnalysis> {
    let (width, height) = buffer.dimensions();
    let brightness = average_brightness(buffer, config.sample_stride)?;
    let colors = dominant_colors(buffer, config.sample_stride, config.bucket_size, config.top_colors)?;

    Ok(ImageAnalysis {
        width,
        height,
        megapixels: megapixels(width, height),
        aspect_ratio: aspect_ratio_string(width, height),
        orientation: Orientation::of(width, height),
        brightness,
        brightness_level: BrightnessLevel::from_average(brightness),
        dominant_colors: colors.into_iter().map(|c| c.to_hex()).collect(),
        file_size: source_len.map(format_size),
    })
}

/// Pixel count in millions.
pub fn megapixels(width: u32, height: u32) -> f64 {
    (f64::from(width) * f64::from(height)) / 1_000_000.0
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Aspect ratio reduced by the greatest common divisor.
///
/// ```
/// assert_eq!(pixelforge_raster::aspect_ratio_string(1920, 1080), "16:9");
/// ```
pub fn aspect_ratio_string(width: u32, height: u32) -> String {
    let d = gcd(width, height).max(1);
    format!("{}:{}", width / d, height / d)
}

/// Deterministic tags derived from shape, resolution and format.
pub fn suggest_tags(width: u32, height: u32, format: Option<SourceFormat>) -> Vec<&'static str> {
    let mut tags = vec!["image", "photo", "digital"];

    let ratio = if height == 0 { 0.0 } else { f64::from(width) / f64::from(height) };
    if ratio > 1.5 {
        tags.extend(["landscape", "wide", "panoramic"]);
    } else if ratio < 0.7 {
        tags.extend(["portrait", "vertical", "tall"]);
    } else {
        tags.extend(["square", "balanced"]);
    }

    let mp = megapixels(width, height);
    if mp > 8.0 {
        tags.extend(["highres", "4K", "professional"]);
    } else if mp > 2.0 {
        tags.extend(["HD", "quality"]);
    }

    match format {
        Some(SourceFormat::Png) => tags.extend(["PNG", "transparent"]),
        Some(SourceFormat::Jpeg) => tags.extend(["JPEG", "compressed"]),
        Some(SourceFormat::WebP) => tags.extend(["WebP", "modern"]),
        _ => {}
    }
    tags
}

/// Human-readable byte count: `B`, `KB` with one decimal, `MB` with two.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < KB * KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / (KB * KB) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[test]
    fn test_aspect_ratio_string() {
        assert_eq!(aspect_ratio_string(1920, 1080), "16:9");
        assert_eq!(aspect_ratio_string(100, 100), "1:1");
        assert_eq!(aspect_ratio_string(7, 3), "7:3");
    }

    #[test]
    fn test_orientation() {
        assert_eq!(Orientation::of(1920, 1080), Orientation::Landscape);
        assert_eq!(Orientation::of(1080, 1920), Orientation::Portrait);
        assert_eq!(Orientation::of(1000, 1000), Orientation::Square);
    }

    #[test]
    fn test_brightness_levels() {
        assert_eq!(BrightnessLevel::from_average(200.0), BrightnessLevel::Bright);
        assert_eq!(BrightnessLevel::from_average(180.0), BrightnessLevel::Normal);
        assert_eq!(BrightnessLevel::from_average(100.0), BrightnessLevel::Dark);
    }

    #[test]
    fn test_analyze_solid_white() {
        let pm = Pixmap::filled(40, 20, Color::WHITE).unwrap();
        let report = analyze(&pm, &AnalysisConfig::default(), Some(2048)).unwrap();
        assert_eq!(report.aspect_ratio, "2:1");
        assert_eq!(report.orientation, Orientation::Landscape);
        assert_eq!(report.brightness_level, BrightnessLevel::Bright);
        assert_eq!(report.dominant_colors, vec!["#ffffff".to_string()]);
        assert_eq!(report.file_size.as_deref(), Some("2.0 KB"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["orientation"], "landscape");
    }

    #[test]
    fn test_suggest_tags() {
        let tags = suggest_tags(4000, 2500, Some(SourceFormat::Jpeg));
        assert!(tags.contains(&"landscape"));
        assert!(tags.contains(&"highres"));
        assert!(tags.contains(&"JPEG"));

        let tags = suggest_tags(500, 1000, Some(SourceFormat::Gif));
        assert!(tags.contains(&"portrait"));
        assert!(!tags.contains(&"HD"));
        assert_eq!(tags.len(), 6);

        assert!(suggest_tags(1600, 1400, None).contains(&"HD"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
