//! External collaborators the engine calls but does not implement.
//!
//! Each service is a narrow trait. Callers plug in real implementations; tests
//! plug in stubs.

use crate::error::RasterError;
use crate::geometry::PixelRect;
use crate::pixmap::Pixmap;
use thiserror::Error;

/// Failure reported by an external service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service is not installed or could not be reached
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service ran and reported an error
    #[error("{0}")]
    Failed(String),
}

impl ServiceError {
    /// Attach the service name, producing an engine error.
    pub fn into_raster(self, service: &'static str) -> RasterError {
        RasterError::ExternalService { service, message: self.to_string() }
    }
}

/// Finds faces in an image.
pub trait FaceDetector: Send + Sync {
    /// Bounding boxes of detected faces, in pixels of `image`.
    fn detect(&self, image: &Pixmap) -> Result<Vec<PixelRect>, ServiceError>;
}

/// Segments the foreground and clears the background.
pub trait BackgroundRemover: Send + Sync {
    /// Same-sized image with background pixels made transparent.
    fn remove(&self, image: &Pixmap) -> Result<Pixmap, ServiceError>;
}

/// Decodes HEIC/HEIF bytes, which the built-in decoder does not read.
pub trait HeicDecoder: Send + Sync {
    /// Decode `bytes` into a straight-alpha RGBA buffer.
    fn decode(&self, bytes: &[u8]) -> Result<Pixmap, ServiceError>;
}

/// The set of optional services available to one pipeline.
#[derive(Clone, Default)]
pub struct Services {
    /// Face detection for face blur
    pub face_detector: Option<std::sync::Arc<dyn FaceDetector>>,
    /// Segmentation for background removal
    pub background_remover: Option<std::sync::Arc<dyn BackgroundRemover>>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("face_detector", &self.face_detector.is_some())
            .field("background_remover", &self.background_remover.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_into_raster_keeps_service_name() {
        let err = ServiceError::Unavailable("model not loaded".into()).into_raster("face detector");
        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert_eq!(err.to_string(), "face detector failed: service unavailable: model not loaded");
    }

    #[test]
    fn test_services_debug_hides_impls() {
        let services = Services::default();
        assert_eq!(
            format!("{services:?}"),
            "Services { face_detector: false, background_remover: false }"
        );
    }
}
