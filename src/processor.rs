//! Per-frame detection and annotation.
//!
//! `FrameProcessor` is the only component that touches the model. Each call is independent:
//! mirror (optional), detect with the caller's threshold, draw, return. Failures never escape
//! `process`; they come back as a diagnostic frame instead.

use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;

use crate::detect::{Detection, ModelHandle};
use crate::frame::{ConfidenceThreshold, Frame};
use crate::overlay::{self, Diagnostic, OverlayError, OverlayStyle};

/// When to apply the selfie-view horizontal mirror.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MirrorMode {
    /// Frames are processed as captured.
    #[default]
    Off,
    /// Mirror first; the model sees the mirrored frame.
    BeforeInference,
    /// The model sees the captured frame; the output and its boxes are mirrored afterwards.
    DisplayOnly,
}

impl MirrorMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "false" => Some(MirrorMode::Off),
            "before_inference" | "before-inference" | "on" | "true" => {
                Some(MirrorMode::BeforeInference)
            }
            "display_only" | "display-only" | "display" => Some(MirrorMode::DisplayOnly),
            _ => None,
        }
    }
}

/// Why a frame could not be annotated.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("model not loaded")]
    ModelUnavailable,
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),
    #[error("rendering failed: {0}")]
    Render(#[from] OverlayError),
}

impl ProcessError {
    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            ProcessError::ModelUnavailable => Diagnostic::ModelNotLoaded,
            ProcessError::Inference(_) | ProcessError::Render(_) => Diagnostic::ProcessingFailed,
        }
    }
}

/// Successfully annotated frame.
#[derive(Clone, Debug)]
pub struct Annotated {
    pub frame: Frame,
    /// Detections drawn on `frame`, in output-image coordinates.
    pub detections: Vec<Detection>,
}

/// Outcome of `process_report`: always a displayable frame.
#[derive(Clone, Debug)]
pub struct Processed {
    pub frame: Frame,
    pub detections: Vec<Detection>,
    /// Set when `frame` is a diagnostic frame.
    pub diagnostic: Option<Diagnostic>,
}

/// Stateless adapter between a frame stream and a shared detection model.
#[derive(Clone)]
pub struct FrameProcessor {
    model: Option<ModelHandle>,
    mirror: MirrorMode,
    style: OverlayStyle,
}

impl FrameProcessor {
    pub fn new(model: ModelHandle) -> Self {
        Self::from_slot(Some(model))
    }

    /// Processor whose model failed to load. Every frame becomes a diagnostic frame.
    pub fn unloaded() -> Self {
        Self::from_slot(None)
    }

    pub fn from_slot(model: Option<ModelHandle>) -> Self {
        Self {
            model,
            mirror: MirrorMode::default(),
            style: OverlayStyle::default(),
        }
    }

    pub fn with_mirror(mut self, mirror: MirrorMode) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn mirror(&self) -> MirrorMode {
        self.mirror
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Detect and draw, reporting failures as `ProcessError`.
    ///
    /// The input frame is never modified.
    pub fn try_process(
        &self,
        frame: &Frame,
        threshold: ConfidenceThreshold,
    ) -> Result<Annotated, ProcessError> {
        let model = self.model.as_ref().ok_or(ProcessError::ModelUnavailable)?;

        let mut canvas = match self.mirror {
            MirrorMode::BeforeInference => frame.mirrored(),
            MirrorMode::Off | MirrorMode::DisplayOnly => frame.clone(),
        };

        let detected = catch_unwind(AssertUnwindSafe(|| {
            model.detect(&canvas, threshold.value())
        }))
        .map_err(|_| {
            ProcessError::Inference(anyhow::anyhow!("{} backend panicked", model.name()))
        })?;
        let mut result = detected.map_err(ProcessError::Inference)?;
        result.retain_admitted(threshold);
        log::trace!(
            "{} detections in {:?}",
            result.detections.len(),
            result.inference_time
        );

        let mut detections = result.detections;
        if self.mirror == MirrorMode::DisplayOnly {
            canvas = canvas.mirrored();
            detections = detections.iter().map(Detection::mirrored).collect();
        }

        overlay::draw_detections(canvas.image_mut(), &detections, &self.style)?;
        Ok(Annotated {
            frame: canvas,
            detections,
        })
    }

    /// Annotate `frame`, substituting a diagnostic frame on any failure.
    pub fn process_report(&self, frame: Frame, threshold: ConfidenceThreshold) -> Processed {
        match self.try_process(&frame, threshold) {
            Ok(annotated) => Processed {
                frame: annotated.frame,
                detections: annotated.detections,
                diagnostic: None,
            },
            Err(err) => {
                match &err {
                    ProcessError::ModelUnavailable => log::debug!("frame skipped: {}", err),
                    _ => log::error!("frame processing error: {}", err),
                }
                let diagnostic = err.diagnostic();
                Processed {
                    frame: self.diagnostic_frame(frame, diagnostic),
                    detections: Vec::new(),
                    diagnostic: Some(diagnostic),
                }
            }
        }
    }

    /// `process(frame, threshold) -> frame`. Never fails.
    pub fn process(&self, frame: Frame, threshold: ConfidenceThreshold) -> Frame {
        self.process_report(frame, threshold).frame
    }

    /// Unmirrored input with `diagnostic` burned in.
    pub fn diagnostic_frame(&self, mut frame: Frame, diagnostic: Diagnostic) -> Frame {
        overlay::draw_diagnostic(frame.image_mut(), diagnostic, &self.style);
        frame
    }
}

impl std::fmt::Debug for FrameProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameProcessor")
            .field("model", &self.model.as_ref().map(|m| m.name()))
            .field("mirror", &self.mirror)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectionResult, DetectorBackend, StubBackend};
    use std::sync::Arc;

    struct PanickingBackend;

    impl DetectorBackend for PanickingBackend {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn detect(&self, _frame: &Frame, _confidence: f32) -> anyhow::Result<DetectionResult> {
            panic!("index out of bounds");
        }
    }

    #[test]
    fn mirror_mode_parses_aliases() {
        assert_eq!(MirrorMode::parse("off"), Some(MirrorMode::Off));
        assert_eq!(MirrorMode::parse("Before-Inference"), Some(MirrorMode::BeforeInference));
        assert_eq!(MirrorMode::parse("display_only"), Some(MirrorMode::DisplayOnly));
        assert_eq!(MirrorMode::parse("sideways"), None);
    }

    #[test]
    fn panicking_backend_becomes_processing_error() {
        let processor = FrameProcessor::new(Arc::new(PanickingBackend));
        let frame = Frame::filled(64, 48, [0, 0, 0]);
        let out = processor.process_report(frame, ConfidenceThreshold::default());
        assert_eq!(out.diagnostic, Some(Diagnostic::ProcessingFailed));
        assert_eq!(out.frame.dimensions(), (64, 48));
    }

    #[test]
    fn display_only_mirrors_boxes_with_the_image() {
        let stub = StubBackend::new(vec![Detection::new(0.0, 0.0, 0.25, 0.5, 0.9, 0, "p")]);
        let processor = FrameProcessor::new(Arc::new(stub)).with_mirror(MirrorMode::DisplayOnly);
        let frame = Frame::filled(100, 100, [0, 0, 0]);
        let annotated = processor
            .try_process(&frame, ConfidenceThreshold::new(0.5))
            .unwrap();
        assert_eq!(annotated.detections.len(), 1);
        assert!((annotated.detections[0].x - 0.75).abs() < 1e-6);
    }

    #[test]
    fn render_error_is_reported_as_processing_failure() {
        let stub = StubBackend::new(vec![Detection::new(f32::INFINITY, 0.0, 0.1, 0.1, 0.9, 0, "p")]);
        let processor = FrameProcessor::new(Arc::new(stub));
        let frame = Frame::filled(40, 40, [0, 0, 0]);
        let err = processor
            .try_process(&frame, ConfidenceThreshold::new(0.5))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Render(_)));
        assert_eq!(err.diagnostic(), Diagnostic::ProcessingFailed);
    }
}
