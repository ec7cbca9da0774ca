//! Detection overlay and diagnostic banners.
//!
//! Boxes are drawn as hollow rectangles in a per-class color with a filled label tag holding
//! `"<label> <score>"`. Diagnostics are fixed red strings at the top-left corner.

pub mod font;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::detect::Detection;

/// Left edge of diagnostic text.
pub const DIAGNOSTIC_X: i32 = 10;
/// Baseline of diagnostic text.
pub const DIAGNOSTIC_BASELINE_Y: i32 = 30;
pub const DIAGNOSTIC_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const PALETTE: [u32; 20] = [
    0xFF3838, 0xFF9D97, 0xFF701F, 0xFFB21D, 0xCFD231, 0x48F90A, 0x92CC17, 0x3DDB86, 0x1A9334,
    0x00D4BB, 0x2C99A8, 0x00C2FF, 0x344593, 0x6473FF, 0x0018EC, 0x8438FF, 0x520085, 0xCB38FF,
    0xFF95C8, 0xFF37C7,
];

/// Fixed message burned into a frame in place of a normal result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    ModelNotLoaded,
    ProcessingFailed,
}

impl Diagnostic {
    pub fn message(self) -> &'static str {
        match self {
            Diagnostic::ModelNotLoaded => "model not loaded",
            Diagnostic::ProcessingFailed => "frame processing error",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum OverlayError {
    #[error("detection {index} has non-finite coordinates")]
    NonFiniteBox { index: usize },
}

/// Rendering parameters.
#[derive(Clone, Copy, Debug)]
pub struct OverlayStyle {
    pub box_thickness: u32,
    pub label_scale: u32,
    pub label_text_color: Rgb<u8>,
    pub diagnostic_scale: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_thickness: 2,
            label_scale: 2,
            label_text_color: Rgb([255, 255, 255]),
            diagnostic_scale: 2,
        }
    }
}

/// Palette color for a class id.
pub fn class_color(class_id: usize) -> Rgb<u8> {
    let hex = PALETTE[class_id % PALETTE.len()];
    Rgb([(hex >> 16) as u8, (hex >> 8) as u8, hex as u8])
}

/// Tag text for a detection.
pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.label, detection.confidence)
}

/// Draw every detection onto `img`.
///
/// All boxes are validated before any pixel is touched, so on error `img` is unchanged.
pub fn draw_detections(
    img: &mut RgbImage,
    detections: &[Detection],
    style: &OverlayStyle,
) -> Result<(), OverlayError> {
    if let Some(index) = detections.iter().position(|d| !d.is_finite()) {
        return Err(OverlayError::NonFiniteBox { index });
    }
    let (width, height) = img.dimensions();
    for detection in detections {
        let Some(bbox) = detection.to_pixels(width, height) else {
            continue;
        };
        let color = class_color(detection.class_id);
        draw_box(img, bbox, color, style.box_thickness);
        draw_label(img, bbox, &label_text(detection), color, style);
    }
    Ok(())
}

fn draw_box(img: &mut RgbImage, bbox: [u32; 4], color: Rgb<u8>, thickness: u32) {
    let [x0, y0, x1, y1] = bbox;
    for t in 0..thickness.max(1) {
        let w = (x1 - x0 + 1).saturating_sub(2 * t);
        let h = (y1 - y0 + 1).saturating_sub(2 * t);
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((x0 + t) as i32, (y0 + t) as i32).of_size(w, h);
        draw_hollow_rect_mut(img, rect, color);
    }
}

fn draw_label(img: &mut RgbImage, bbox: [u32; 4], text: &str, color: Rgb<u8>, style: &OverlayStyle) {
    let scale = style.label_scale.max(1);
    let pad = scale;
    let tag_w = font::text_width(text, scale) + 2 * pad;
    let tag_h = font::text_height(scale) + 2 * pad;
    let [x0, y0, _, _] = bbox;
    // Tag sits above the box unless the box touches the top edge.
    let tag_y = if y0 >= tag_h { y0 - tag_h } else { y0 };
    draw_filled_rect_mut(
        img,
        Rect::at(x0 as i32, tag_y as i32).of_size(tag_w, tag_h),
        color,
    );
    font::draw_text(
        img,
        (x0 + pad) as i32,
        (tag_y + pad) as i32,
        text,
        scale,
        style.label_text_color,
    );
}

/// Burn a diagnostic message into the top-left corner.
pub fn draw_diagnostic(img: &mut RgbImage, diagnostic: Diagnostic, style: &OverlayStyle) {
    let scale = style.diagnostic_scale.max(1);
    let top = DIAGNOSTIC_BASELINE_Y - font::text_height(scale) as i32;
    font::draw_text(
        img,
        DIAGNOSTIC_X,
        top,
        diagnostic.message(),
        scale,
        DIAGNOSTIC_COLOR,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_color(img: &RgbImage, color: Rgb<u8>) -> usize {
        img.pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn draws_box_outline_in_class_color() {
        let mut img = RgbImage::new(200, 200);
        let det = Detection::new(0.25, 0.5, 0.5, 0.25, 0.87, 3, "dog");
        draw_detections(&mut img, &[det], &OverlayStyle::default()).unwrap();

        let color = class_color(3);
        // Box corners: (50, 100) to (150, 150).
        assert_eq!(*img.get_pixel(50, 125), color);
        assert_eq!(*img.get_pixel(150, 125), color);
        assert_eq!(*img.get_pixel(100, 150), color);
        // Interior untouched.
        assert_eq!(*img.get_pixel(100, 125), Rgb([0, 0, 0]));
        // Label tag sits above the box.
        assert_eq!(*img.get_pixel(51, 99), color);
    }

    #[test]
    fn label_moves_inside_when_box_touches_top() {
        let mut img = RgbImage::new(100, 100);
        let det = Detection::new(0.0, 0.0, 0.5, 0.5, 0.5, 0, "a");
        draw_detections(&mut img, &[det], &OverlayStyle::default()).unwrap();
        assert_eq!(*img.get_pixel(3, 3), class_color(0));
    }

    #[test]
    fn non_finite_box_is_rejected_without_drawing() {
        let mut img = RgbImage::new(50, 50);
        let good = Detection::new(0.1, 0.1, 0.5, 0.5, 0.9, 0, "ok");
        let bad = Detection::new(f32::NAN, 0.1, 0.2, 0.2, 0.9, 0, "bad");
        let err = draw_detections(&mut img, &[good, bad], &OverlayStyle::default()).unwrap_err();
        assert_eq!(err, OverlayError::NonFiniteBox { index: 1 });
        assert_eq!(count_color(&img, Rgb([0, 0, 0])), 50 * 50);
    }

    #[test]
    fn diagnostic_is_red_text_in_top_left() {
        let mut img = RgbImage::new(320, 240);
        draw_diagnostic(&mut img, Diagnostic::ModelNotLoaded, &OverlayStyle::default());
        let red = count_color(&img, DIAGNOSTIC_COLOR);
        assert!(red > 0);
        for (x, y, px) in img.enumerate_pixels() {
            if *px == DIAGNOSTIC_COLOR {
                assert!(x >= 10 && y >= 16 && y < 30, "stray pixel at {x},{y}");
            }
        }
    }

    #[test]
    fn label_text_has_two_decimals() {
        let det = Detection::new(0.0, 0.0, 0.1, 0.1, 0.9, 0, "person");
        assert_eq!(label_text(&det), "person 0.90");
    }
}
