//! Configuration schema definitions

use crate::color::Color;
use crate::error::{RasterError, Result};
use crate::geometry::Region;
use serde::{Deserialize, Serialize};

/// Root configuration schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigSchema {
    /// Image analysis
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Raster-to-SVG reduction
    #[serde(default)]
    pub vectorize: VectorizeConfig,

    /// Collage layout
    #[serde(default)]
    pub collage: CollageConfig,

    /// Encoder
    #[serde(default)]
    pub encode: EncodeConfig,

    /// Pixelate and blur tools
    #[serde(default)]
    pub privacy: PrivacyConfig,
}

impl ConfigSchema {
    /// Reject values no operation can run with.
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 10] = [
            (self.analysis.sample_stride == 0, "analysis.sample_stride must be at least 1"),
            (self.analysis.bucket_size == 0, "analysis.bucket_size must be at least 1"),
            (self.vectorize.step == 0, "vectorize.step must be at least 1"),
            (self.vectorize.palette_size == 0, "vectorize.palette_size must be at least 1"),
            (self.vectorize.sample_stride == 0, "vectorize.sample_stride must be at least 1"),
            (self.collage.columns == 0, "collage.columns must be at least 1"),
            (self.collage.cell_size == 0, "collage.cell_size must be at least 1"),
            (
                !(0.0..=1.0).contains(&self.encode.quality),
                "encode.quality must be between 0.0 and 1.0",
            ),
            (self.privacy.block_size == 0, "privacy.block_size must be at least 1"),
            (
                !self.privacy.blur_intensity.is_finite() || self.privacy.blur_intensity < 1.0,
                "privacy.blur_intensity must be at least 1",
            ),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(RasterError::Config((*msg).to_string())),
            None => Ok(()),
        }
    }
}

/// Image analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Sample every n-th pixel
    #[serde(default = "default_analysis_stride")]
    pub sample_stride: usize,

    /// Quantization bucket for colour counting
    #[serde(default = "default_bucket")]
    pub bucket_size: u8,

    /// Number of dominant colours reported
    #[serde(default = "default_top_colors")]
    pub top_colors: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_stride: default_analysis_stride(),
            bucket_size: default_bucket(),
            top_colors: default_top_colors(),
        }
    }
}

fn default_analysis_stride() -> usize {
    10
}

fn default_bucket() -> u8 {
    32
}

fn default_top_colors() -> usize {
    5
}

/// Raster-to-SVG configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizeConfig {
    /// Cell size in pixels
    #[serde(default = "default_vector_step")]
    pub step: u32,

    /// Number of palette colours
    #[serde(default = "default_palette_size")]
    pub palette_size: usize,

    /// Quantization bucket for palette extraction
    #[serde(default = "default_bucket")]
    pub bucket_size: u8,

    /// Sample every n-th pixel when building the palette
    #[serde(default = "default_vector_stride")]
    pub sample_stride: usize,
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self {
            step: default_vector_step(),
            palette_size: default_palette_size(),
            bucket_size: default_bucket(),
            sample_stride: default_vector_stride(),
        }
    }
}

fn default_vector_step() -> u32 {
    4
}

fn default_palette_size() -> usize {
    8
}

fn default_vector_stride() -> usize {
    4
}

/// Collage layout defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollageConfig {
    /// Images per row
    #[serde(default = "default_columns")]
    pub columns: u32,

    /// Gap between cells in pixels
    #[serde(default = "default_gap")]
    pub gap_px: u32,

    /// Square cell side in pixels
    #[serde(default = "default_cell_size")]
    pub cell_size: u32,

    /// Fill under transparent cells, as hex
    #[serde(default = "default_collage_background")]
    pub background: Color,
}

impl Default for CollageConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            gap_px: default_gap(),
            cell_size: default_cell_size(),
            background: default_collage_background(),
        }
    }
}

impl CollageConfig {
    /// Layout parameters for one collage invocation.
    pub fn params(&self) -> crate::composite::CollageParams {
        crate::composite::CollageParams {
            columns: self.columns,
            gap_px: self.gap_px,
            cell_size: self.cell_size,
            background: self.background,
        }
    }
}

fn default_columns() -> u32 {
    2
}

fn default_gap() -> u32 {
    10
}

fn default_cell_size() -> u32 {
    400
}

fn default_collage_background() -> Color {
    Color::rgb(0x1a, 0x1a, 0x24)
}

/// Encoder defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Lossy quality, 0.0-1.0
    #[serde(default = "default_quality")]
    pub quality: f32,

    /// Colour JPEG output is flattened onto
    #[serde(default = "default_jpeg_background")]
    pub jpeg_background: Color,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            jpeg_background: default_jpeg_background(),
        }
    }
}

fn default_quality() -> f32 {
    0.92
}

fn default_jpeg_background() -> Color {
    Color::WHITE
}

/// Privacy tool defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Pixelation block size
    #[serde(default = "default_block_size")]
    pub block_size: u32,

    /// Mosaic blur intensity
    #[serde(default = "default_blur_intensity")]
    pub blur_intensity: f64,

    /// Region blurred when face detection is unavailable
    #[serde(default = "default_face_fallback")]
    pub face_fallback: Region,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            blur_intensity: default_blur_intensity(),
            face_fallback: default_face_fallback(),
        }
    }
}

fn default_block_size() -> u32 {
    10
}

fn default_blur_intensity() -> f64 {
    10.0
}

fn default_face_fallback() -> Region {
    Region::percent(30.0, 20.0, 40.0, 40.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let schema = ConfigSchema::default();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.analysis.top_colors, 5);
        assert_eq!(schema.collage.cell_size, 400);
        assert_eq!(schema.privacy.face_fallback, Region::percent(30.0, 20.0, 40.0, 40.0));
    }

    #[test]
    fn test_validate_rejects_zero_stride() {
        let mut schema = ConfigSchema::default();
        schema.analysis.sample_stride = 0;
        let err = schema.validate().unwrap_err();
        assert!(matches!(err, RasterError::Config(msg) if msg.contains("sample_stride")));
    }

    #[test]
    fn test_validate_rejects_quality() {
        let mut schema = ConfigSchema::default();
        schema.encode.quality = 1.5;
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let schema: ConfigSchema = toml::from_str("[collage]\ncolumns = 3\n").unwrap();
        assert_eq!(schema.collage.columns, 3);
        assert_eq!(schema.collage.gap_px, 10);
        assert_eq!(schema.vectorize, VectorizeConfig::default());
    }
}
