use anyhow::Result;
use std::sync::Arc;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Shared, read-only model handle. Loaded once and handed to every processor.
pub type ModelHandle = Arc<dyn DetectorBackend>;

/// Detector backend trait.
///
/// Backends are shared across stream workers, so `detect` takes `&self` and implementations
/// must be `Send + Sync`. A backend that is not internally thread-safe serializes itself.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// `confidence` is an inference parameter: candidates scored below it should be
    /// suppressed. Out-of-range values are passed through unchanged.
    fn detect(&self, frame: &Frame, confidence: f32) -> Result<DetectionResult>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
