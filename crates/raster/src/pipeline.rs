//! Pipeline orchestrator: validate, run steps in order, encode once.

use crate::analysis::{analyze, ImageAnalysis};
use crate::cancel::CancellationToken;
use crate::codec::{quality_percent, Decoder, EncodedBlob, Encoder, ImageCodec, OutputFormat};
use crate::color::Color;
use crate::composite::{
    blur_region, circular_mask, composite_grid, pixelate, watermark, CollageParams, WatermarkPosition,
};
use crate::config::ConfigSchema;
use crate::detect::SourceFormat;
use crate::error::{invalid_params, RasterError, Result};
use crate::geometry::Region;
use crate::pixmap::Pixmap;
use crate::resize::{fit_within, resize, upscale};
use crate::services::{BackgroundRemover, FaceDetector, ServiceError, Services};
use crate::transform::{crop, fill_background, flip, rotate, sharpen, skew};
use crate::vector::{extract_palette, raster_to_block_svg};
use pixelforge_telemetry::{invocation_id, StepTimings, Timer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One transform in a [`Job`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Block pixelation inside a region
    Pixelate {
        /// Area to pixelate
        region: Region,
        /// Block side in pixels
        block_size: u32,
    },
    /// Mosaic blur inside a region
    BlurRegion {
        /// Area to blur
        region: Region,
        /// Downsample factor, at least 1
        intensity: f64,
    },
    /// Mosaic blur over detected faces, or a fixed region if detection fails
    BlurFaces {
        /// Downsample factor, at least 1
        intensity: f64,
    },
    /// Square crop scaled to `diameter` with a circular alpha mask
    CircularMask {
        /// Output side in pixels
        diameter: u32,
    },
    /// Rotate clockwise about the centre
    Rotate {
        /// Angle in degrees
        degrees: f64,
    },
    /// Shear along both axes
    Skew {
        /// Horizontal shear in degrees
        x_degrees: f64,
        /// Vertical shear in degrees
        y_degrees: f64,
    },
    /// Mirror horizontally and/or vertically
    Flip {
        /// Mirror left-right
        horizontal: bool,
        /// Mirror top-bottom
        vertical: bool,
    },
    /// Keep only a region
    Crop {
        /// Area to keep
        region: Region,
    },
    /// Resize to exact dimensions
    Resize {
        /// Target width
        width: u32,
        /// Target height
        height: u32,
    },
    /// Shrink so the longer side fits
    FitWithin {
        /// Longest allowed side
        max_dimension: u32,
    },
    /// Enlarge 2-4x with a light contrast push
    Upscale {
        /// Integer scale factor
        factor: u32,
    },
    /// Contrast push away from mid-grey
    Sharpen {
        /// Strength in `0.0..=1.0`
        amount: f32,
    },
    /// Draw the image over a solid colour
    FillBackground {
        /// Fill colour
        color: Color,
    },
    /// Clear the background through the external segmenter
    RemoveBackground,
    /// Blend an overlay image at reduced opacity
    Watermark {
        /// Image drawn over the source
        overlay: Pixmap,
        /// Overlay alpha multiplier in `(0.0, 1.0]`
        opacity: f32,
        /// Placement
        #[serde(default)]
        position: WatermarkPosition,
    },
}

impl Step {
    /// Stable name used in logs and timings.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Pixelate { .. } => "pixelate",
            Step::BlurRegion { .. } => "blur_region",
            Step::BlurFaces { .. } => "blur_faces",
            Step::CircularMask { .. } => "circular_mask",
            Step::Rotate { .. } => "rotate",
            Step::Skew { .. } => "skew",
            Step::Flip { .. } => "flip",
            Step::Crop { .. } => "crop",
            Step::Resize { .. } => "resize",
            Step::FitWithin { .. } => "fit_within",
            Step::Upscale { .. } => "upscale",
            Step::Sharpen { .. } => "sharpen",
            Step::FillBackground { .. } => "fill_background",
            Step::RemoveBackground => "remove_background",
            Step::Watermark { .. } => "watermark",
        }
    }

    /// Check parameters that do not depend on the image.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Step::Pixelate { ref region, block_size } => {
                check_region(region)?;
                if block_size == 0 {
                    return Err(invalid_params("block size must be at least 1"));
                }
            }
            Step::BlurRegion { ref region, intensity } => {
                check_region(region)?;
                check_intensity(intensity)?;
            }
            Step::BlurFaces { intensity } => check_intensity(intensity)?,
            Step::CircularMask { diameter } if diameter == 0 => {
                return Err(invalid_params("diameter must be at least 1"));
            }
            Step::Rotate { degrees } if !degrees.is_finite() => {
                return Err(invalid_params("rotation angle must be finite"));
            }
            Step::Skew { x_degrees, y_degrees } => {
                for angle in [x_degrees, y_degrees] {
                    if !angle.is_finite() || angle.abs() >= 90.0 {
                        return Err(invalid_params(format!(
                            "skew angle must be finite and within (-90, 90), got {angle}"
                        )));
                    }
                }
            }
            Step::Crop { ref region } => check_region(region)?,
            Step::Resize { width, height } if width == 0 || height == 0 => {
                return Err(invalid_params(format!("cannot resize to {width}x{height}")));
            }
            Step::FitWithin { max_dimension } if max_dimension == 0 => {
                return Err(invalid_params("max dimension must be at least 1"));
            }
            Step::Upscale { factor } if !(2..=4).contains(&factor) => {
                return Err(invalid_params(format!("upscale factor must be 2, 3 or 4, got {factor}")));
            }
            Step::Sharpen { amount } if !amount.is_finite() || !(0.0..=1.0).contains(&amount) => {
                return Err(invalid_params(format!("sharpen amount must be within 0-1, got {amount}")));
            }
            Step::Watermark { opacity, .. } if !opacity.is_finite() || opacity <= 0.0 || opacity > 1.0 => {
                return Err(invalid_params(format!("watermark opacity must be within (0, 1], got {opacity}")));
            }
            _ => {}
        }
        Ok(())
    }
}

fn check_region(region: &Region) -> Result<()> {
    let values = [region.x, region.y, region.width, region.height];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(invalid_params("region values must be finite"));
    }
    if region.width <= 0.0 || region.height <= 0.0 {
        return Err(invalid_params("region must have a positive size"));
    }
    Ok(())
}

fn check_intensity(intensity: f64) -> Result<()> {
    if !intensity.is_finite() || intensity < 1.0 {
        return Err(invalid_params(format!("blur intensity must be at least 1, got {intensity}")));
    }
    Ok(())
}

/// How the final buffer is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputSpec {
    /// Raster encoding through the [`Encoder`]
    Raster {
        /// PNG, JPEG or WebP
        format: OutputFormat,
        /// Lossy quality in `0.0..=1.0`
        quality: f32,
    },
    /// Block SVG through the vector reducer
    Svg {
        /// Cell size in pixels
        step: u32,
        /// Palette colours
        palette_size: usize,
    },
}

impl OutputSpec {
    /// Lossless PNG.
    pub const PNG: OutputSpec = OutputSpec::Raster { format: OutputFormat::Png, quality: 1.0 };

    fn validate(&self) -> Result<()> {
        match *self {
            OutputSpec::Raster { format: OutputFormat::Svg, .. } => Err(invalid_params(
                "SVG output must use the svg output kind",
            )),
            OutputSpec::Raster { quality, .. } => quality_percent(quality).map(|_| ()),
            OutputSpec::Svg { step, palette_size } if step == 0 || palette_size == 0 => {
                Err(invalid_params("svg step and palette size must be at least 1"))
            }
            OutputSpec::Svg { .. } => Ok(()),
        }
    }
}

/// Ordered steps plus the output encoding for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Steps, run strictly in this order
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Final encoding
    pub output: OutputSpec,
}

impl Job {
    /// A job with no steps, only re-encoding.
    pub fn new(output: OutputSpec) -> Self {
        Self { steps: Vec::new(), output }
    }

    /// Append a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// Whether every step ran as requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// All steps ran as requested
    Success,
    /// A fallback replaced part of the requested work
    Degraded {
        /// One entry per fallback taken
        reasons: Vec<String>,
    },
}

impl Outcome {
    fn from_reasons(reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            Outcome::Success
        } else {
            Outcome::Degraded { reasons }
        }
    }

    /// True for [`Outcome::Degraded`].
    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct Processed {
    /// Encoded output
    pub blob: EncodedBlob,
    /// Success or degraded
    pub outcome: Outcome,
    /// Width of the final buffer
    pub width: u32,
    /// Height of the final buffer
    pub height: u32,
    /// Wall time per step, in run order
    pub timings: StepTimings,
    /// Id attached to every log line of this run
    pub invocation_id: String,
}

/// Runs jobs against decoded buffers.
///
/// Holds only immutable configuration and service handles, so one pipeline
/// can serve many invocations.
#[derive(Clone)]
pub struct Pipeline {
    config: ConfigSchema,
    decoder: Arc<dyn Decoder>,
    encoder: Arc<dyn Encoder>,
    services: Services,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(ConfigSchema::default())
    }
}

impl Pipeline {
    /// Pipeline using the built-in codec and no external services.
    pub fn new(config: ConfigSchema) -> Self {
        let codec = Arc::new(ImageCodec::new(config.encode.jpeg_background));
        Self {
            config,
            decoder: codec.clone(),
            encoder: codec,
            services: Services::default(),
        }
    }

    /// Replace the decoder, e.g. an [`ImageCodec`] with a HEIC decoder attached.
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Replace the encoder.
    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Attach a face detector for [`Step::BlurFaces`].
    pub fn with_face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.services.face_detector = Some(detector);
        self
    }

    /// Attach a segmenter for [`Step::RemoveBackground`].
    pub fn with_background_remover(mut self, remover: Arc<dyn BackgroundRemover>) -> Self {
        self.services.background_remover = Some(remover);
        self
    }

    /// Configuration this pipeline was built with.
    pub fn config(&self) -> &ConfigSchema {
        &self.config
    }

    /// Raster output at the configured `[encode] quality`.
    pub fn raster_output(&self, format: OutputFormat) -> OutputSpec {
        OutputSpec::Raster { format, quality: self.config.encode.quality }
    }

    /// Block SVG output with the configured cell size and palette.
    pub fn svg_output(&self) -> OutputSpec {
        let vc = &self.config.vectorize;
        OutputSpec::Svg { step: vc.step, palette_size: vc.palette_size }
    }

    /// Pixelation of `region` at the configured block size.
    pub fn pixelate_step(&self, region: Region) -> Step {
        Step::Pixelate { region, block_size: self.config.privacy.block_size }
    }

    /// Mosaic blur of `region` at the configured intensity.
    pub fn blur_step(&self, region: Region) -> Step {
        Step::BlurRegion { region, intensity: self.config.privacy.blur_intensity }
    }

    /// Face blur at the configured intensity.
    pub fn blur_faces_step(&self) -> Step {
        Step::BlurFaces { intensity: self.config.privacy.blur_intensity }
    }

    /// Collage layout from `[collage]`.
    pub fn collage_params(&self) -> CollageParams {
        self.config.collage.params()
    }

    /// Decode source bytes.
    pub fn decode(&self, bytes: &[u8], declared: Option<SourceFormat>) -> Result<Pixmap> {
        if bytes.is_empty() {
            return Err(RasterError::Decode("source is empty".into()));
        }
        self.decoder.decode(bytes, declared)
    }

    /// Analysis report using the configured sampling.
    pub fn analyze(&self, buffer: &Pixmap, source_len: Option<u64>) -> Result<ImageAnalysis> {
        analyze(buffer, &self.config.analysis, source_len)
    }

    /// Check every step and the output before any work starts.
    pub fn validate(&self, job: &Job) -> Result<()> {
        for (index, step) in job.steps.iter().enumerate() {
            step.validate().map_err(|e| match e {
                RasterError::InvalidParameters(msg) => {
                    RasterError::InvalidParameters(format!("step {index} ({}): {msg}", step.name()))
                }
                other => other,
            })?;
            if matches!(step, Step::RemoveBackground) && self.services.background_remover.is_none() {
                return Err(ServiceError::Unavailable("no background remover configured".into())
                    .into_raster("background remover"));
            }
        }
        job.output.validate()
    }

    /// Run `job` on a copy of `source`.
    ///
    /// Steps run strictly in order. `cancel` is checked before each step and
    /// before encoding. The source buffer is never modified.
    #[instrument(skip_all, fields(invocation_id, steps = job.steps.len()))]
    pub fn run(&self, source: &Pixmap, job: &Job, cancel: &CancellationToken) -> Result<Processed> {
        let id = invocation_id();
        tracing::Span::current().record("invocation_id", id.as_str());

        self.validate(job)?;

        let mut timings = StepTimings::new();
        let mut degraded = Vec::new();
        let mut current = source.clone();

        for step in &job.steps {
            cancel.check()?;
            let timer = Timer::start(step.name());
            current = self.apply_step(&current, step, &mut degraded)?;
            let elapsed = timer.stop(&mut timings);
            debug!(step = step.name(), ?elapsed, width = current.width(), height = current.height(), "Step done");
        }

        cancel.check()?;
        let timer = Timer::start("encode");
        let blob = self.encode_output(&current, &job.output)?;
        timer.stop(&mut timings);

        let outcome = Outcome::from_reasons(degraded);
        info!(
            mime = blob.mime_type(),
            bytes = blob.len(),
            degraded = outcome.is_degraded(),
            total_ms = timings.total().as_secs_f64() * 1000.0,
            "Pipeline finished"
        );

        Ok(Processed {
            blob,
            outcome,
            width: current.width(),
            height: current.height(),
            timings,
            invocation_id: id,
        })
    }

    /// Compose `images` into a grid and encode it.
    ///
    /// `cancel` is checked before composing and before encoding.
    #[instrument(skip_all, fields(invocation_id, images = images.len()))]
    pub fn collage(
        &self,
        images: &[Pixmap],
        params: &CollageParams,
        output: &OutputSpec,
        cancel: &CancellationToken,
    ) -> Result<Processed> {
        let id = invocation_id();
        tracing::Span::current().record("invocation_id", id.as_str());
        output.validate()?;

        let mut timings = StepTimings::new();
        cancel.check()?;
        let grid = timings.time("collage", || composite_grid(images, params))?;
        cancel.check()?;
        let blob = timings.time("encode", || self.encode_output(&grid, output))?;

        Ok(Processed {
            blob,
            outcome: Outcome::Success,
            width: grid.width(),
            height: grid.height(),
            timings,
            invocation_id: id,
        })
    }

    fn apply_step(&self, buffer: &Pixmap, step: &Step, degraded: &mut Vec<String>) -> Result<Pixmap> {
        match *step {
            Step::Pixelate { ref region, block_size } => pixelate(buffer, region, block_size),
            Step::BlurRegion { ref region, intensity } => blur_region(buffer, region, intensity),
            Step::BlurFaces { intensity } => self.blur_faces(buffer, intensity, degraded),
            Step::CircularMask { diameter } => circular_mask(buffer, diameter),
            Step::Rotate { degrees } => rotate(buffer, degrees),
            Step::Skew { x_degrees, y_degrees } => skew(buffer, x_degrees, y_degrees),
            Step::Flip { horizontal, vertical } => Ok(flip(buffer, horizontal, vertical)),
            Step::Crop { ref region } => crop(buffer, region),
            Step::Resize { width, height } => resize(buffer, width, height),
            Step::FitWithin { max_dimension } => fit_within(buffer, max_dimension),
            Step::Upscale { factor } => upscale(buffer, factor),
            Step::Sharpen { amount } => sharpen(buffer, amount),
            Step::FillBackground { color } => fill_background(buffer, color),
            Step::RemoveBackground => self.remove_background(buffer),
            Step::Watermark { ref overlay, opacity, position } => watermark(buffer, overlay, opacity, position),
        }
    }

    fn blur_faces(&self, buffer: &Pixmap, intensity: f64, degraded: &mut Vec<String>) -> Result<Pixmap> {
        let detected = match &self.services.face_detector {
            Some(detector) => detector.detect(buffer),
            None => Err(ServiceError::Unavailable("no face detector configured".into())),
        };

        match detected {
            Ok(faces) => {
                debug!(faces = faces.len(), "Faces detected");
                let mut out = buffer.clone();
                for face in faces {
                    let face = face.clamp_to(out.width(), out.height());
                    if face.is_empty() {
                        continue;
                    }
                    let region = Region::pixels(
                        f64::from(face.x),
                        f64::from(face.y),
                        f64::from(face.width),
                        f64::from(face.height),
                    );
                    out = blur_region(&out, &region, intensity)?;
                }
                Ok(out)
            }
            Err(e) => {
                let fallback = self.config.privacy.face_fallback;
                warn!(error = %e, ?fallback, "Face detection failed, blurring fixed region");
                degraded.push(format!("face detection failed ({e}); blurred fallback region"));
                blur_region(buffer, &fallback, intensity)
            }
        }
    }

    fn remove_background(&self, buffer: &Pixmap) -> Result<Pixmap> {
        let remover = self.services.background_remover.as_ref().ok_or_else(|| {
            ServiceError::Unavailable("no background remover configured".into())
                .into_raster("background remover")
        })?;
        let out = remover.remove(buffer).map_err(|e| e.into_raster("background remover"))?;
        if out.dimensions() != buffer.dimensions() {
            return Err(RasterError::ExternalService {
                service: "background remover",
                message: format!(
                    "returned {}x{} for a {}x{} image",
                    out.width(),
                    out.height(),
                    buffer.width(),
                    buffer.height()
                ),
            });
        }
        Ok(out)
    }

    fn encode_output(&self, buffer: &Pixmap, output: &OutputSpec) -> Result<EncodedBlob> {
        match *output {
            OutputSpec::Raster { format, quality } => self.encoder.encode(buffer, format, quality),
            OutputSpec::Svg { step, palette_size } => {
                let vc = &self.config.vectorize;
                let palette = extract_palette(buffer, palette_size, vc.bucket_size, vc.sample_stride)?;
                let svg = raster_to_block_svg(buffer, step, &palette)?;
                Ok(EncodedBlob::new(svg.into_bytes(), OutputFormat::Svg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::geometry::PixelRect;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn checker(w: u32, h: u32) -> Pixmap {
        let mut pm = Pixmap::new(w, h).unwrap();
        for y in 0..h {
            for x in 0..w {
                let c = if (x / 4 + y / 4) % 2 == 0 { Color::WHITE } else { Color::rgb(20, 40, 60) };
                pm.set_pixel(x, y, c);
            }
        }
        pm
    }

    fn decode_png(blob: &EncodedBlob) -> Pixmap {
        ImageCodec::default().decode(blob.bytes(), None).unwrap()
    }

    #[test]
    fn test_reencode_preserves_dimensions() {
        let pipeline = Pipeline::default();
        let src = checker(37, 21);
        let out = pipeline.run(&src, &Job::new(OutputSpec::PNG), &CancellationToken::new()).unwrap();
        assert_eq!((out.width, out.height), (37, 21));
        assert_eq!(out.outcome, Outcome::Success);
        assert_eq!(decode_png(&out.blob), src);
        assert_eq!(out.timings.step_names(), vec!["encode"]);
    }

    #[test]
    fn test_steps_run_in_order() {
        let pipeline = Pipeline::default();
        let src = Pixmap::new(10, 4).unwrap();
        let job = Job::new(OutputSpec::PNG)
            .step(Step::FillBackground { color: Color::rgb(0, 0, 255) })
            .step(Step::Rotate { degrees: 90.0 })
            .step(Step::Crop { region: Region::pixels(0.0, 0.0, 4.0, 5.0) });
        let out = pipeline.run(&src, &job, &CancellationToken::new()).unwrap();
        assert_eq!((out.width, out.height), (4, 5));
        assert_eq!(out.timings.step_names(), vec!["fill_background", "rotate", "crop", "encode"]);
        let decoded = decode_png(&out.blob);
        assert_eq!(decoded.pixel(0, 0), Color::rgb(0, 0, 255));
    }

    #[test]
    fn test_source_is_not_modified() {
        let pipeline = Pipeline::default();
        let src = checker(16, 16);
        let before = src.clone();
        let job = Job::new(OutputSpec::PNG).step(Step::Pixelate { region: Region::full(), block_size: 8 });
        pipeline.run(&src, &job, &CancellationToken::new()).unwrap();
        assert_eq!(src, before);
    }

    #[test]
    fn test_validation_happens_before_any_step() {
        struct CountingRemover(AtomicUsize);
        impl BackgroundRemover for CountingRemover {
            fn remove(&self, image: &Pixmap) -> std::result::Result<Pixmap, ServiceError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(image.clone())
            }
        }

        let remover = Arc::new(CountingRemover(AtomicUsize::new(0)));
        let pipeline = Pipeline::default().with_background_remover(remover.clone());
        let job = Job::new(OutputSpec::PNG)
            .step(Step::RemoveBackground)
            .step(Step::Skew { x_degrees: 90.0, y_degrees: 0.0 });
        let err = pipeline.run(&checker(8, 8), &job, &CancellationToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        assert!(err.to_string().contains("step 1 (skew)"));
        assert_eq!(remover.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let err = Pipeline::default().run(&checker(4, 4), &Job::new(OutputSpec::PNG), &token).unwrap_err();
        assert!(matches!(err, RasterError::Cancelled));
    }

    struct FailingDetector;
    impl FaceDetector for FailingDetector {
        fn detect(&self, _image: &Pixmap) -> std::result::Result<Vec<PixelRect>, ServiceError> {
            Err(ServiceError::Failed("model crashed".into()))
        }
    }

    struct FixedDetector(PixelRect);
    impl FaceDetector for FixedDetector {
        fn detect(&self, _image: &Pixmap) -> std::result::Result<Vec<PixelRect>, ServiceError> {
            Ok(vec![self.0])
        }
    }

    #[test]
    fn test_face_blur_degrades_without_detector() {
        let src = checker(100, 100);
        let job = Job::new(OutputSpec::PNG).step(Step::BlurFaces { intensity: 20.0 });

        for pipeline in [Pipeline::default(), Pipeline::default().with_face_detector(Arc::new(FailingDetector))] {
            let out = pipeline.run(&src, &job, &CancellationToken::new()).unwrap();
            assert!(out.outcome.is_degraded());
            let decoded = decode_png(&out.blob);
            // outside the 30/20/40/40 fallback region
            assert_eq!(decoded.pixel(5, 5), src.pixel(5, 5));
            assert_eq!(decoded.pixel(95, 95), src.pixel(95, 95));
            assert_ne!(decoded, src);
        }
    }

    #[test]
    fn test_face_blur_with_detector_is_success() {
        let src = checker(64, 64);
        let detector = Arc::new(FixedDetector(PixelRect::new(0, 0, 16, 16)));
        let pipeline = Pipeline::default().with_face_detector(detector);
        let job = Job::new(OutputSpec::PNG).step(Step::BlurFaces { intensity: 16.0 });
        let out = pipeline.run(&src, &job, &CancellationToken::new()).unwrap();
        assert_eq!(out.outcome, Outcome::Success);
        let decoded = decode_png(&out.blob);
        let c = decoded.pixel(0, 0);
        assert!((0..16).all(|i| decoded.pixel(i, i) == c));
        assert_eq!(decoded.pixel(40, 40), src.pixel(40, 40));
    }

    #[test]
    fn test_background_removal_has_no_fallback() {
        let job = Job::new(OutputSpec::PNG).step(Step::RemoveBackground);
        let err = Pipeline::default().run(&checker(4, 4), &job, &CancellationToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalService);

        struct Broken;
        impl BackgroundRemover for Broken {
            fn remove(&self, _image: &Pixmap) -> std::result::Result<Pixmap, ServiceError> {
                Err(ServiceError::Failed("segmentation failed".into()))
            }
        }
        let pipeline = Pipeline::default().with_background_remover(Arc::new(Broken));
        let err = pipeline.run(&checker(4, 4), &job, &CancellationToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalService);
    }

    #[test]
    fn test_svg_output() {
        let src = Pixmap::filled(8, 8, Color::rgb(250, 0, 0)).unwrap();
        let job = Job::new(OutputSpec::Svg { step: 4, palette_size: 6 });
        let out = Pipeline::default().run(&src, &job, &CancellationToken::new()).unwrap();
        assert_eq!(out.blob.mime_type(), "image/svg+xml");
        let text = String::from_utf8(out.blob.into_bytes()).unwrap();
        assert!(text.contains("viewBox=\"0 0 8 8\""));
        assert_eq!(text.matches("<rect ").count(), 4);
    }

    #[test]
    fn test_collage() {
        let images = vec![checker(30, 60), checker(60, 30), checker(40, 40)];
        let params = CollageParams { columns: 2, gap_px: 4, cell_size: 20, background: Color::BLACK };
        let token = CancellationToken::new();
        let out = Pipeline::default().collage(&images, &params, &OutputSpec::PNG, &token).unwrap();
        assert_eq!((out.width, out.height), (44, 44));
        let decoded = decode_png(&out.blob);
        assert_eq!(decoded.pixel(43, 43), Color::BLACK);

        let err = Pipeline::default().collage(&[], &params, &OutputSpec::PNG, &token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn test_collage_honours_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let pipeline = Pipeline::default();
        let params = pipeline.collage_params();
        let err = pipeline.collage(&[checker(8, 8)], &params, &OutputSpec::PNG, &token).unwrap_err();
        assert!(matches!(err, RasterError::Cancelled));
    }

    #[test]
    fn test_configured_defaults_reach_output() {
        let config: ConfigSchema = toml::from_str(
            r#"
            [vectorize]
            step = 2
            palette_size = 3

            [collage]
            columns = 3
            gap_px = 0
            cell_size = 5

            [encode]
            quality = 0.1

            [privacy]
            block_size = 8
            blur_intensity = 4.0
            "#,
        )
        .unwrap();
        let pipeline = Pipeline::new(config);
        let src = checker(16, 16);
        let token = CancellationToken::new();

        let svg = pipeline.run(&src, &Job::new(pipeline.svg_output()), &token).unwrap();
        let text = String::from_utf8(svg.blob.into_bytes()).unwrap();
        assert_eq!(text.matches("<rect ").count(), 64);

        let big = checker(64, 64);
        let low = pipeline.run(&big, &Job::new(pipeline.raster_output(OutputFormat::Jpeg)), &token).unwrap();
        let high = Pipeline::default()
            .run(&big, &Job::new(Pipeline::default().raster_output(OutputFormat::Jpeg)), &token)
            .unwrap();
        assert!(low.blob.len() < high.blob.len());

        let mut gradient = Pixmap::new(16, 16).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                gradient.set_pixel(x, y, Color::rgb(x as u8 * 10, y as u8 * 10, 0));
            }
        }
        let job = Job::new(OutputSpec::PNG).step(pipeline.pixelate_step(Region::full()));
        let out = decode_png(&pipeline.run(&gradient, &job, &token).unwrap().blob);
        // 8px blocks sample their centre pixel
        assert_eq!(out.pixel(8, 0), gradient.pixel(12, 4));
        assert_eq!(out.pixel(7, 7), gradient.pixel(4, 4));

        assert_eq!(pipeline.blur_step(Region::full()), Step::BlurRegion { region: Region::full(), intensity: 4.0 });
        assert_eq!(pipeline.blur_faces_step(), Step::BlurFaces { intensity: 4.0 });

        let images = vec![checker(8, 8), checker(8, 8), checker(8, 8)];
        let grid = pipeline.collage(&images, &pipeline.collage_params(), &OutputSpec::PNG, &token).unwrap();
        assert_eq!((grid.width, grid.height), (15, 5));
    }

    #[test]
    fn test_watermark_step() {
        let src = Pixmap::filled(60, 40, Color::BLACK).unwrap();
        let overlay = Pixmap::filled(6, 4, Color::WHITE).unwrap();
        let job = Job::new(OutputSpec::PNG).step(Step::Watermark {
            overlay,
            opacity: 1.0,
            position: WatermarkPosition::BottomLeft,
        });
        let out = Pipeline::default().run(&src, &job, &CancellationToken::new()).unwrap();
        assert_eq!(out.timings.step_names(), vec!["watermark", "encode"]);
        let decoded = decode_png(&out.blob);
        assert_eq!(decoded.pixel(20, 16), Color::WHITE);
        assert_eq!(decoded.pixel(19, 16), Color::BLACK);

        let bad = Job::new(OutputSpec::PNG).step(Step::Watermark {
            overlay: Pixmap::filled(2, 2, Color::WHITE).unwrap(),
            opacity: 0.0,
            position: WatermarkPosition::Tile,
        });
        let err = Pipeline::default().run(&src, &bad, &CancellationToken::new()).unwrap_err();
        assert!(err.to_string().contains("step 0 (watermark)"));
    }

    #[test]
    fn test_watermark_step_from_json() {
        let step: Step = serde_json::from_str(
            r#"{"op": "watermark", "opacity": 0.5, "position": "top-right",
                "overlay": {"width": 1, "height": 1, "rgba": "/////w=="}}"#,
        )
        .unwrap();
        assert_eq!(
            step,
            Step::Watermark {
                overlay: Pixmap::filled(1, 1, Color::WHITE).unwrap(),
                opacity: 0.5,
                position: WatermarkPosition::TopRight,
            }
        );
    }

    #[test]
    fn test_job_deserializes_from_json() {
        let job: Job = serde_json::from_str(
            r#"{
                "steps": [
                    {"op": "rotate", "degrees": 45.0},
                    {"op": "pixelate", "region": {"x": 0, "y": 0, "width": 50, "height": 50, "unit": "percent"}, "block_size": 8},
                    {"op": "remove_background"}
                ],
                "output": {"kind": "raster", "format": "jpeg", "quality": 0.8}
            }"#,
        )
        .unwrap();
        assert_eq!(job.steps.len(), 3);
        assert_eq!(job.steps[0], Step::Rotate { degrees: 45.0 });
        assert_eq!(job.output, OutputSpec::Raster { format: OutputFormat::Jpeg, quality: 0.8 });
    }
}
