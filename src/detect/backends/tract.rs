#![cfg(feature = "backend-tract")]

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::ClassNames;
use crate::detect::result::DetectionResult;
use crate::detect::yolo::{self, Letterbox, YoloParams};
use crate::frame::Frame;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Loads a local model file once and runs it on letterboxed RGB frames. The optimized plan
/// is immutable, so a single instance is shared by every stream worker.
pub struct TractYoloBackend {
    model: TypedRunnableModel<TypedModel>,
    params: YoloParams,
    names: ClassNames,
}

impl TractYoloBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, params: YoloParams, names: ClassNames) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = params.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractYoloBackend: loaded {} (input {}x{}, {} class names)",
            model_path.display(),
            size,
            size,
            names.len()
        );

        Ok(Self {
            model,
            params,
            names,
        })
    }

    fn build_input(&self, frame: &Frame, letterbox: &Letterbox) -> Result<Tensor> {
        let size = self.params.input_size as usize;
        let planar = letterbox.to_chw(frame);
        let input = tract_ndarray::Array4::from_shape_vec((1, 3, size, size), planar)
            .context("letterboxed input does not match model input shape")?;
        Ok(input.into_tensor())
    }
}

impl DetectorBackend for TractYoloBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&self, frame: &Frame, confidence: f32) -> Result<DetectionResult> {
        let started = Instant::now();
        let letterbox = Letterbox::fit(frame.width(), frame.height(), self.params.input_size)?;
        let input = self.build_input(frame, &letterbox)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let values: Vec<f32> = view.iter().copied().collect();

        let candidates = yolo::decode(&values, &shape, &letterbox, confidence, &self.names)?;
        let detections = yolo::non_max_suppression(
            candidates,
            self.params.iou_threshold,
            self.params.max_detections,
        );

        Ok(DetectionResult {
            detections,
            inference_time: started.elapsed(),
        })
    }

    fn warm_up(&self) -> Result<()> {
        let size = self.params.input_size;
        let frame = Frame::filled(size, size, [114, 114, 114]);
        self.detect(&frame, 1.0).map(|_| ())
    }
}
