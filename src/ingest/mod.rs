//! Frame sources.
//!
//! This module provides the sources a stream worker can pull frames from:
//! - Synthetic frames (`stub://...`), for tests and demos without a camera
//! - Still images or a directory of images, cycled
//! - USB/V4L2 webcams (feature: ingest-v4l2)
//!
//! Every source yields decoded RGB `Frame`s. Sources do not retain frames after handing
//! them out and never write them to disk.

pub mod file;
pub mod normalize;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

pub use file::{FileConfig, FileSource};
pub use normalize::{normalize_to_rgb, PixelFormat};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

use crate::config::SourceSettings;
use crate::frame::Frame;

/// A pull-based frame source driven by one stream worker.
pub trait FrameSource: Send {
    /// Open the underlying device or files.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Whether the source is still producing frames.
    fn is_healthy(&self) -> bool;

    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;
}

/// True for URIs that name a V4L2 capture device.
pub fn is_v4l2_uri(uri: &str) -> bool {
    uri.starts_with("v4l2://") || uri.starts_with("/dev/video")
}

/// Open the source named by `settings.uri`.
///
/// `stub://` and local paths go to `FileSource`; `/dev/video*` and `v4l2://` go to the V4L2
/// source. Any other URL scheme is rejected.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let uri = settings.uri.trim();
    if is_v4l2_uri(uri) {
        return open_v4l2(settings);
    }
    let source = FileSource::new(FileConfig {
        path: uri.to_string(),
        width: settings.width,
        height: settings.height,
    })?;
    Ok(Box::new(source))
}

#[cfg(feature = "ingest-v4l2")]
fn open_v4l2(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let device = settings
        .uri
        .trim()
        .strip_prefix("v4l2://")
        .unwrap_or(settings.uri.trim())
        .to_string();
    let source = V4l2Source::new(V4l2Config {
        device,
        target_fps: settings.target_fps,
        width: settings.width,
        height: settings.height,
    })?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_v4l2(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow::anyhow!(
        "{} requires the ingest-v4l2 feature",
        settings.uri.trim()
    ))
}
