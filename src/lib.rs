//! Live webcam object detection with annotated streaming.
//!
//! Frames flow from a camera (or a synthetic/image source) into a pretrained detector, and
//! annotated frames flow back to a browser with a single adjustable confidence threshold.
//!
//! # Module Structure
//!
//! - `frame`: RGB `Frame`, `ConfidenceThreshold`, the shared slider value
//! - `detect`: detector backends (stub, ONNX via tract), YOLO decoding, model loading
//! - `overlay`: boxes, labels and the diagnostic banner
//! - `processor`: `FrameProcessor`, the per-frame detect-and-annotate step
//! - `ingest`: frame sources (synthetic, image files, V4L2 webcams)
//! - `stream`: per-stream worker thread and latest-frame mailbox
//! - `api`: HTTP page, MJPEG stream and threshold endpoint
//! - `config`: layered configuration
//! - `ui`: terminal progress for batch annotation

pub mod api;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod processor;
pub mod stream;
pub mod ui;

pub use api::{ApiConfig, ApiHandle, ApiServer};
pub use config::{AppConfig, BackendKind, LoadFailurePolicy};
pub use detect::{
    load_model, Detection, DetectionResult, DetectorBackend, ModelHandle, StubBackend,
};
pub use frame::{ConfidenceThreshold, Frame, SharedThreshold, DEFAULT_CONFIDENCE};
pub use ingest::{open_source, FileConfig, FileSource, FrameSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{V4l2Config, V4l2Source};
pub use overlay::{Diagnostic, OverlayStyle};
pub use processor::{Annotated, FrameProcessor, MirrorMode, ProcessError, Processed};
pub use stream::{LatestFrame, PublishedFrame, StreamHandle, StreamShared, StreamStats, StreamWorker};
