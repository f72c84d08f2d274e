//! Pixel buffer transforms for Pixelforge.
//!
//! This crate provides:
//! - An owned RGBA pixel buffer with bilinear sampling and alpha compositing
//! - Colour sampling: quantization, dominant colours, brightness
//! - Geometry helpers for rotation, skew and cover-fit cropping
//! - Region compositing: pixelation, mosaic blur, circular masks, collages,
//!   watermarks
//! - Block SVG vectorization
//! - Format detection, decoding and encoding
//! - A pipeline that runs ordered steps and encodes the result once
//!
//! Every transform takes a buffer by reference and returns a new one.

#![warn(missing_docs)]

mod alpha;
mod analysis;
mod cancel;
mod codec;
mod color;
mod composite;
pub mod config;
mod detect;
mod error;
pub mod geometry;
mod pixmap;
mod services;
mod transform;
mod vector;

#[cfg(feature = "processing")]
mod pipeline;
#[cfg(feature = "processing")]
mod resize;
#[cfg(feature = "processing")]
mod session;

pub use alpha::{blend_over, flatten, has_transparency};
pub use analysis::{
    analyze, aspect_ratio_string, format_size, megapixels, suggest_tags, BrightnessLevel,
    ImageAnalysis, Orientation,
};
pub use cancel::CancellationToken;
pub use codec::{
    quality_percent, resolve_source_format, Decoder, EncodedBlob, Encoder, OutputFormat,
};
pub use color::{
    average_brightness, color_histogram, dominant_colors, nearest_color, quantize_color, Color,
};
pub use composite::{
    blur_region, circular_mask, composite_grid, pixelate, watermark, CollageParams, WatermarkPosition,
    WATERMARK_PADDING,
};
pub use config::EngineConfig;
pub use detect::{detect_format, SourceFormat};
pub use error::{ErrorKind, RasterError, Result};
pub use geometry::{
    aspect_ratio_height, cover_fit_crop, rotated_canvas_size, skewed_canvas_size, CanvasSize,
    CropRect, PixelRect, Region, SkewedCanvas, Unit,
};
pub use pixmap::{EdgeMode, Pixmap};
pub use services::{BackgroundRemover, FaceDetector, HeicDecoder, ServiceError, Services};
pub use transform::{crop, fill_background, flip, rotate, sharpen, skew, warp, Affine};
pub use vector::{extract_palette, raster_to_block_svg, SvgDocument};

#[cfg(feature = "processing")]
pub use codec::ImageCodec;
#[cfg(feature = "processing")]
pub use pipeline::{Job, Outcome, OutputSpec, Pipeline, Processed, Step};
#[cfg(feature = "processing")]
pub use resize::{fit_within, resize, upscale};
#[cfg(feature = "processing")]
pub use session::{FailureNotice, Session, SessionState};

pub use pixelforge_telemetry::{StepTiming, StepTimings};
