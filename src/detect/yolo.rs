//! YOLO-style pre- and post-processing shared by ONNX backends.
//!
//! Frames are letterboxed into a square input (aspect preserved, gray padding). Raw outputs of
//! shape `[1, 4 + nc, anchors]` (or the transposed `[1, anchors, 4 + nc]`) are decoded into
//! center-format boxes, filtered by confidence, and reduced with per-class NMS.

use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};

use crate::detect::labels::ClassNames;
use crate::detect::result::Detection;
use crate::frame::Frame;

const PAD_VALUE: u8 = 114;

/// Post-processing parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YoloParams {
    /// Square model input edge (640 typical).
    pub input_size: u32,
    /// Boxes of the same class overlapping more than this are suppressed.
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

// ----------------------------------------------------------------------------
// Letterbox
// ----------------------------------------------------------------------------

/// Geometry of an aspect-preserving resize into the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub input_size: u32,
    pub scale: f32,
    /// Size of the resized frame inside the padded input.
    pub scaled_w: u32,
    pub scaled_h: u32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub src_width: u32,
    pub src_height: u32,
}

impl Letterbox {
    pub fn fit(src_width: u32, src_height: u32, input_size: u32) -> Result<Self> {
        if src_width == 0 || src_height == 0 || input_size == 0 {
            return Err(anyhow!(
                "cannot letterbox {}x{} into {}",
                src_width,
                src_height,
                input_size
            ));
        }
        let size = input_size as f32;
        let scale = (size / src_width as f32).min(size / src_height as f32);
        let scaled_w = ((src_width as f32 * scale).round() as u32).clamp(1, input_size);
        let scaled_h = ((src_height as f32 * scale).round() as u32).clamp(1, input_size);
        Ok(Self {
            input_size,
            scale,
            scaled_w,
            scaled_h,
            pad_x: (input_size - scaled_w) / 2,
            pad_y: (input_size - scaled_h) / 2,
            src_width,
            src_height,
        })
    }

    /// Resize and pad `frame` into the model input image.
    pub fn apply(&self, frame: &Frame) -> RgbImage {
        let resized = image::imageops::resize(
            frame.as_image(),
            self.scaled_w,
            self.scaled_h,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(
            self.input_size,
            self.input_size,
            Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]),
        );
        image::imageops::overlay(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// NCHW planar floats scaled to 0..1.
    pub fn to_chw(&self, frame: &Frame) -> Vec<f32> {
        let canvas = self.apply(frame);
        let plane = (self.input_size * self.input_size) as usize;
        let mut out = vec![0f32; plane * 3];
        for (i, px) in canvas.pixels().enumerate() {
            out[i] = px[0] as f32 / 255.0;
            out[plane + i] = px[1] as f32 / 255.0;
            out[2 * plane + i] = px[2] as f32 / 255.0;
        }
        out
    }

    /// Map a model-space center box back to a source-normalized `(x, y, w, h)`.
    pub fn unmap(&self, cx: f32, cy: f32, bw: f32, bh: f32) -> (f32, f32, f32, f32) {
        let x0 = (cx - bw / 2.0 - self.pad_x as f32) / self.scale;
        let y0 = (cy - bh / 2.0 - self.pad_y as f32) / self.scale;
        let w = bw / self.scale;
        let h = bh / self.scale;
        (
            x0 / self.src_width as f32,
            y0 / self.src_height as f32,
            w / self.src_width as f32,
            h / self.src_height as f32,
        )
    }
}

// ----------------------------------------------------------------------------
// Decode
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    /// `[1, 4 + nc, anchors]`, the default ultralytics export.
    FeaturesFirst,
    /// `[1, anchors, 4 + nc]`.
    AnchorsFirst,
}

/// Decode the first (primary) image of a raw output tensor into detections scored at least
/// `confidence`. NMS is not applied here.
pub fn decode(
    output: &[f32],
    shape: &[usize],
    letterbox: &Letterbox,
    confidence: f32,
    names: &ClassNames,
) -> Result<Vec<Detection>> {
    let [batch, d1, d2] = match shape {
        [a, b, c] => [*a, *b, *c],
        _ => return Err(anyhow!("expected a rank-3 output, got shape {:?}", shape)),
    };
    if batch == 0 {
        return Err(anyhow!("model returned an empty batch"));
    }
    let layout = if d1 <= d2 {
        Layout::FeaturesFirst
    } else {
        Layout::AnchorsFirst
    };
    let (features, anchors) = match layout {
        Layout::FeaturesFirst => (d1, d2),
        Layout::AnchorsFirst => (d2, d1),
    };
    if features <= 4 {
        return Err(anyhow!(
            "output shape {:?} has no class scores (need more than 4 features)",
            shape
        ));
    }
    let per_image = features * anchors;
    if output.len() < per_image {
        return Err(anyhow!(
            "output holds {} values, expected at least {}",
            output.len(),
            per_image
        ));
    }
    let value = |feature: usize, anchor: usize| -> f32 {
        match layout {
            Layout::FeaturesFirst => output[feature * anchors + anchor],
            Layout::AnchorsFirst => output[anchor * features + feature],
        }
    };

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for feature in 4..features {
            let score = value(feature, anchor);
            if score > best_score {
                best_score = score;
                best_class = feature - 4;
            }
        }
        let admitted = best_score >= confidence;
        if !admitted {
            continue;
        }
        let (x, y, w, h) = letterbox.unmap(
            value(0, anchor),
            value(1, anchor),
            value(2, anchor),
            value(3, anchor),
        );
        detections.push(Detection::new(
            x,
            y,
            w,
            h,
            best_score,
            best_class,
            names.label(best_class),
        ));
    }
    Ok(detections)
}

// ----------------------------------------------------------------------------
// NMS
// ----------------------------------------------------------------------------

/// Intersection over union of two normalized boxes.
pub fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix0 = a.x.max(b.x);
    let iy0 = a.y.max(b.y);
    let ix1 = (a.x + a.w).min(b.x + b.w);
    let iy1 = (a.y + a.h).min(b.y + b.h);
    let inter = (ix1 - ix0).max(0.0) * (iy1 - iy0).max(0.0);
    let union = a.w * a.h + b.w * b.h - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy per-class non-maximum suppression. Output is sorted by confidence, descending.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
