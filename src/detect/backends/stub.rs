use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

/// Stub backend for tests and model-less demos.
///
/// Reports the same detections for every frame regardless of the confidence parameter,
/// so callers are responsible for threshold filtering.
pub struct StubBackend {
    detections: Vec<Detection>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl StubBackend {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Backend whose every `detect` call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            detections: Vec::new(),
            failure: Some(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Two fixed boxes, used when the server runs with `backend = "stub"`.
    pub fn demo() -> Self {
        Self::new(vec![
            Detection::new(0.30, 0.20, 0.40, 0.60, 0.91, 0, "person"),
            Detection::new(0.05, 0.60, 0.20, 0.25, 0.42, 41, "cup"),
        ])
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, _frame: &Frame, _confidence: f32) -> Result<DetectionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        Ok(DetectionResult::new(self.detections.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reports_fixed_detections_and_counts_calls() {
        let backend = StubBackend::demo();
        let frame = Frame::filled(8, 8, [0, 0, 0]);

        let r1 = backend.detect(&frame, 0.99).unwrap();
        assert_eq!(r1.detections.len(), 2);
        let r2 = backend.detect(&frame, 0.0).unwrap();
        assert_eq!(r2.detections, r1.detections);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn failing_stub_returns_error() {
        let backend = StubBackend::failing("tensor shape mismatch");
        let frame = Frame::filled(8, 8, [0, 0, 0]);
        let err = backend.detect(&frame, 0.5).unwrap_err();
        assert_eq!(err.to_string(), "tensor shape mismatch");
        assert_eq!(backend.calls(), 1);
    }
}
