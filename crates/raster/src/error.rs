//! Error types for the raster engine.

use thiserror::Error;

/// Result type alias for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;

/// Errors that can occur while decoding, transforming or encoding an image.
#[derive(Debug, Error)]
pub enum RasterError {
    /// Source bytes are not a valid or supported image
    #[error("Decode error: {0}")]
    Decode(String),

    /// Width/height are zero, non-finite, or disagree with the buffer length
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Out-of-range or non-finite transform parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Target format unsupported or encoder failure
    #[error("Encode error: {0}")]
    Encode(String),

    /// An external collaborator (face detector, segmenter, HEIC decoder) failed
    #[error("{service} failed: {message}")]
    ExternalService {
        /// Service that failed
        service: &'static str,
        /// Failure reported by the service
        message: String,
    },

    /// An operation that needs at least one image received none
    #[error("No input images")]
    EmptyInput,

    /// The caller cancelled the invocation
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse error category, stable for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`RasterError::Decode`]
    Decode,
    /// See [`RasterError::InvalidDimensions`]
    InvalidDimensions,
    /// See [`RasterError::InvalidParameters`]
    InvalidParameters,
    /// See [`RasterError::Encode`]
    Encode,
    /// See [`RasterError::ExternalService`]
    ExternalService,
    /// See [`RasterError::EmptyInput`]
    EmptyInput,
    /// See [`RasterError::Cancelled`]
    Cancelled,
    /// See [`RasterError::Config`]
    Config,
    /// See [`RasterError::IoError`]
    Io,
}

impl RasterError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RasterError::Decode(_) => ErrorKind::Decode,
            RasterError::InvalidDimensions(_) => ErrorKind::InvalidDimensions,
            RasterError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            RasterError::Encode(_) => ErrorKind::Encode,
            RasterError::ExternalService { .. } => ErrorKind::ExternalService,
            RasterError::EmptyInput => ErrorKind::EmptyInput,
            RasterError::Cancelled => ErrorKind::Cancelled,
            RasterError::Config(_) => ErrorKind::Config,
            RasterError::IoError(_) => ErrorKind::Io,
        }
    }

    /// Short message suitable for showing to the person who picked the file.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Decode => "This file could not be read as an image.",
            ErrorKind::InvalidDimensions | ErrorKind::InvalidParameters => {
                "The selected settings are not valid for this image."
            }
            ErrorKind::Encode => "The image could not be saved in the requested format.",
            ErrorKind::ExternalService => "A required image service is unavailable.",
            ErrorKind::EmptyInput => "Add at least one image first.",
            ErrorKind::Cancelled => "Processing was cancelled.",
            ErrorKind::Config | ErrorKind::Io => "Processing failed.",
        }
    }
}

pub(crate) fn invalid_params(msg: impl Into<String>) -> RasterError {
    RasterError::InvalidParameters(msg.into())
}

pub(crate) fn invalid_dims(msg: impl Into<String>) -> RasterError {
    RasterError::InvalidDimensions(msg.into())
}
