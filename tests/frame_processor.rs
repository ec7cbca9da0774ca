use std::sync::{Arc, Mutex};

use image::Rgb;
use webcam_detect::overlay::DIAGNOSTIC_COLOR;
use webcam_detect::{
    ConfidenceThreshold, Detection, DetectionResult, DetectorBackend, Diagnostic, Frame,
    FrameProcessor, MirrorMode, StubBackend,
};

/// Keeps a copy of the last frame handed to the model.
#[derive(Default)]
struct RecordingBackend {
    seen: Mutex<Option<Frame>>,
    fail: bool,
}

impl RecordingBackend {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn seen(&self) -> Option<Frame> {
        self.seen.lock().unwrap().clone()
    }
}

impl DetectorBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn detect(&self, frame: &Frame, _confidence: f32) -> anyhow::Result<DetectionResult> {
        *self.seen.lock().unwrap() = Some(frame.clone());
        if self.fail {
            anyhow::bail!("recorded frame rejected");
        }
        Ok(DetectionResult::default())
    }
}

/// Black frame with one marker pixel in the top-left corner.
fn marked_frame() -> Frame {
    let mut frame = Frame::filled(10, 4, [0, 0, 0]);
    frame.image_mut().put_pixel(0, 0, Rgb([200, 100, 50]));
    frame
}

fn t(value: f32) -> ConfidenceThreshold {
    ConfidenceThreshold::new(value)
}

fn scored(scores: &[f32]) -> Vec<Detection> {
    scores
        .iter()
        .enumerate()
        .map(|(i, score)| {
            let offset = 0.1 + 0.2 * i as f32;
            Detection::new(offset, offset, 0.2, 0.2, *score, i, format!("obj{i}"))
        })
        .collect()
}

fn red_pixels_in_corner(frame: &Frame) -> usize {
    let img = frame.as_image();
    let mut count = 0;
    for y in 0..img.height().min(40) {
        for x in 0..img.width().min(240) {
            if *img.get_pixel(x, y) == DIAGNOSTIC_COLOR {
                count += 1;
            }
        }
    }
    count
}

#[test]
fn unloaded_model_returns_not_loaded_banner() {
    // Without a model handle there is nothing to run inference on.
    let processor = FrameProcessor::from_slot(None);
    let frame = Frame::filled(320, 240, [0, 0, 0]);

    let out = processor.process_report(frame, ConfidenceThreshold::default());

    assert_eq!(out.frame.dimensions(), (320, 240));
    assert_eq!(out.diagnostic, Some(Diagnostic::ModelNotLoaded));
    assert!(out.detections.is_empty());
    assert!(red_pixels_in_corner(&out.frame) > 0);
    assert!(!processor.is_model_loaded());
}

#[test]
fn stub_scores_follow_the_threshold() {
    let stub = Arc::new(StubBackend::new(scored(&[0.9, 0.3])));
    let processor = FrameProcessor::new(stub.clone());

    let high = processor.process_report(Frame::filled(200, 200, [0, 0, 0]), t(0.6));
    assert_eq!(high.detections.len(), 1);
    assert_eq!(high.detections[0].confidence, 0.9);
    assert!(high.diagnostic.is_none());

    let low = processor.process_report(Frame::filled(200, 200, [0, 0, 0]), t(0.2));
    assert_eq!(low.detections.len(), 2);
    assert_eq!(stub.calls(), 2);
}

#[test]
fn every_rendered_detection_meets_the_threshold() {
    let stub = Arc::new(StubBackend::new(scored(&[0.95, 0.61, 0.6, 0.59, 0.05])));
    let processor = FrameProcessor::new(stub);
    for threshold in [0.0f32, 0.3, 0.6, 0.9, 1.0] {
        let out = processor.process_report(Frame::filled(100, 80, [10, 10, 10]), t(threshold));
        assert!(out
            .detections
            .iter()
            .all(|detection| detection.confidence >= threshold));
    }
}

#[test]
fn threshold_extremes() {
    let stub = Arc::new(StubBackend::new(scored(&[1.0, 0.5, 0.0])));
    let processor = FrameProcessor::new(stub);

    let all = processor.process_report(Frame::filled(120, 120, [0, 0, 0]), t(0.0));
    assert_eq!(all.detections.len(), 3);

    let perfect = processor.process_report(Frame::filled(120, 120, [0, 0, 0]), t(1.0));
    assert_eq!(perfect.detections.len(), 1);
    assert_eq!(perfect.detections[0].confidence, 1.0);
}

#[test]
fn out_of_range_threshold_is_passed_through() {
    let stub = Arc::new(StubBackend::new(scored(&[0.9])));
    let processor = FrameProcessor::new(stub);

    let above = processor.process_report(Frame::filled(64, 64, [0, 0, 0]), t(1.5));
    assert!(above.diagnostic.is_none());
    assert!(above.detections.is_empty());

    let below = processor.process_report(Frame::filled(64, 64, [0, 0, 0]), t(-0.5));
    assert_eq!(below.detections.len(), 1);
}

#[test]
fn failing_model_returns_processing_error_banner() {
    let stub = Arc::new(StubBackend::failing("tensor shape mismatch"));
    let processor = FrameProcessor::new(stub.clone());
    let frame = Frame::filled(300, 200, [0, 0, 0]);

    let out = processor.process_report(frame, ConfidenceThreshold::default());

    assert_eq!(out.frame.dimensions(), (300, 200));
    assert_eq!(out.diagnostic, Some(Diagnostic::ProcessingFailed));
    assert!(red_pixels_in_corner(&out.frame) > 0);
    assert_eq!(stub.calls(), 1);
}

#[test]
fn process_never_changes_dimensions() {
    let stub = Arc::new(StubBackend::new(scored(&[0.9, 0.8])));
    for mirror in [MirrorMode::Off, MirrorMode::BeforeInference, MirrorMode::DisplayOnly] {
        let processor = FrameProcessor::new(stub.clone()).with_mirror(mirror);
        for (w, h) in [(640, 480), (33, 17), (1, 1)] {
            let out = processor.process(Frame::filled(w, h, [0, 0, 0]), t(0.5));
            assert_eq!(out.dimensions(), (w, h), "{mirror:?} {w}x{h}");
        }
    }
}

#[test]
fn process_leaves_the_input_untouched() {
    let stub = Arc::new(StubBackend::new(scored(&[0.9])));
    let processor = FrameProcessor::new(stub);
    let frame = Frame::filled(100, 100, [0, 0, 0]);

    let annotated = processor.try_process(&frame, t(0.5)).unwrap();

    assert_ne!(annotated.frame, frame);
    assert!(frame.pixels().iter().all(|value| *value == 0));
}

#[test]
fn mirror_before_inference_feeds_the_mirrored_frame() {
    let recorder = Arc::new(RecordingBackend::default());
    let processor = FrameProcessor::new(recorder.clone()).with_mirror(MirrorMode::BeforeInference);

    let out = processor.process(marked_frame(), t(0.5));

    let seen = recorder.seen().expect("model was called");
    assert_eq!(*seen.as_image().get_pixel(9, 0), Rgb([200, 100, 50]));
    assert_eq!(*seen.as_image().get_pixel(0, 0), Rgb([0, 0, 0]));
    assert_eq!(*out.as_image().get_pixel(9, 0), Rgb([200, 100, 50]));
}

#[test]
fn display_only_feeds_the_camera_frame() {
    let recorder = Arc::new(RecordingBackend::default());
    let processor = FrameProcessor::new(recorder.clone()).with_mirror(MirrorMode::DisplayOnly);

    let out = processor.process(marked_frame(), t(0.5));

    let seen = recorder.seen().expect("model was called");
    assert_eq!(seen, marked_frame());
    assert_eq!(*out.as_image().get_pixel(9, 0), Rgb([200, 100, 50]));
}

#[test]
fn failed_inference_under_mirroring_returns_the_unmirrored_input() {
    for mirror in [MirrorMode::BeforeInference, MirrorMode::DisplayOnly] {
        let recorder = Arc::new(RecordingBackend::failing());
        let processor = FrameProcessor::new(recorder.clone()).with_mirror(mirror);
        let mut input = Frame::filled(400, 100, [0, 0, 0]);
        input.image_mut().put_pixel(399, 99, Rgb([0, 200, 0]));

        let out = processor.process_report(input, t(0.5));

        assert!(recorder.seen().is_some());
        assert_eq!(out.diagnostic, Some(Diagnostic::ProcessingFailed), "{mirror:?}");
        assert_eq!(*out.frame.as_image().get_pixel(399, 99), Rgb([0, 200, 0]));
        assert_eq!(*out.frame.as_image().get_pixel(0, 99), Rgb([0, 0, 0]));
        assert!(red_pixels_in_corner(&out.frame) > 0);
    }
}

#[test]
fn diagnostic_frames_are_never_mirrored() {
    for mirror in [MirrorMode::BeforeInference, MirrorMode::DisplayOnly] {
        let processor = FrameProcessor::unloaded().with_mirror(mirror);
        let out = processor.process_report(Frame::filled(400, 100, [0, 0, 0]), t(0.6));
        let right_half_red = out
            .frame
            .as_image()
            .enumerate_pixels()
            .filter(|(x, _, p)| *x >= 210 && **p == DIAGNOSTIC_COLOR)
            .count();
        assert!(red_pixels_in_corner(&out.frame) > 0);
        assert_eq!(right_half_red, 0, "{mirror:?}");
    }
}
