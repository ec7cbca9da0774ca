use std::time::Duration;

use crate::frame::ConfidenceThreshold;

/// Result of running detection on one frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Surviving detections, highest confidence first when the backend sorts them.
    pub detections: Vec<Detection>,
    /// Wall time spent inside the model.
    pub inference_time: Duration,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            inference_time: Duration::ZERO,
        }
    }

    /// Drop every detection the threshold does not admit.
    pub fn retain_admitted(&mut self, threshold: ConfidenceThreshold) {
        self.detections.retain(|d| threshold.admits(d.confidence));
    }
}

/// One detected object.
///
/// Coordinates are normalized to the frame size (0..1, top-left origin).
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
}

impl Detection {
    pub fn new(
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        confidence: f32,
        class_id: usize,
        label: impl Into<String>,
    ) -> Self {
        Self {
            x,
            y,
            w,
            h,
            confidence,
            class_id,
            label: label.into(),
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.w, self.h, self.confidence]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Same box reflected around the vertical center line.
    pub fn mirrored(&self) -> Self {
        Self {
            x: 1.0 - self.x - self.w,
            ..self.clone()
        }
    }

    /// Pixel rectangle `[x0, y0, x1, y1]` (inclusive) clamped to the frame, or `None` when the
    /// box falls entirely outside it.
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<[u32; 4]> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let x0 = self.x * width as f32;
        let y0 = self.y * height as f32;
        let x1 = (self.x + self.w) * width as f32;
        let y1 = (self.y + self.h) * height as f32;
        if x1 < 0.0 || y1 < 0.0 || x0 > max_x || y0 > max_y {
            return None;
        }
        let x0 = x0.clamp(0.0, max_x) as u32;
        let y0 = y0.clamp(0.0, max_y) as u32;
        let x1 = x1.clamp(0.0, max_x) as u32;
        let y1 = y1.clamp(0.0, max_y) as u32;
        if x0 > x1 || y0 > y1 {
            return None;
        }
        Some([x0, y0, x1, y1])
    }
}
