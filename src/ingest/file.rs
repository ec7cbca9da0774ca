//! Local file frame source.
//!
//! `FileSource` serves frames from:
//! - `stub://<name>`: synthetic frames (gradient background with a moving block)
//! - a still image path: the same image on every call
//! - a directory: every JPEG/PNG inside, in name order, cycled
//!
//! Remote URLs are rejected.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local path or `stub://` name.
    pub path: String,
    /// Synthetic frame width.
    pub width: u32,
    /// Synthetic frame height.
    pub height: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            width: 640,
            height: 480,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    Images(ImageSequence),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths and stub:// (got '{}')",
                config.path
            ));
        }
        let backend = if config.path.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticSource::new(config))
        } else {
            FileBackend::Images(ImageSequence::new(config))
        };
        Ok(Self { backend })
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            FileBackend::Images(source) => source.stats(),
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            FileBackend::Images(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Images(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            FileBackend::Images(source) => source.last_error.is_none(),
        }
    }

    fn describe(&self) -> String {
        self.stats().path
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticSource {
    config: FileConfig,
    frame_count: u64,
}

impl SyntheticSource {
    fn new(config: FileConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!(
                "synthetic source needs a non-zero size, got {}x{}",
                self.config.width,
                self.config.height
            ));
        }
        log::info!("FileSource: connected to {} (synthetic)", self.config.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        Ok(Frame::new(self.render()))
    }

    /// Diagonal gradient with a block that slides right one step per frame.
    fn render(&self) -> RgbImage {
        let (w, h) = (self.config.width, self.config.height);
        let block = (w.min(h) / 4).max(1);
        let travel = (w - block.min(w)).max(1) as u64;
        let bx = ((self.frame_count * 8) % travel) as u32;
        let by = (h - block.min(h)) / 2;
        RgbImage::from_fn(w, h, |x, y| {
            if x >= bx && x < bx + block && y >= by && y < by + block {
                Rgb([230, 230, 230])
            } else {
                let r = (x * 255 / w.max(1)) as u8;
                let g = (y * 255 / h.max(1)) as u8;
                Rgb([r / 2, g / 2, 96])
            }
        })
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Still images
// ----------------------------------------------------------------------------

struct ImageSequence {
    config: FileConfig,
    paths: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageSequence {
    fn new(config: FileConfig) -> Self {
        Self {
            config,
            paths: Vec::new(),
            cursor: 0,
            frame_count: 0,
            last_error: None,
        }
    }

    fn connect(&mut self) -> Result<()> {
        let root = Path::new(&self.config.path);
        self.paths = list_images(root)?;
        self.cursor = 0;
        self.last_error = None;
        log::info!(
            "FileSource: connected to {} ({} images)",
            self.config.path,
            self.paths.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.paths.is_empty() {
            return Err(anyhow!("file source {} is not connected", self.config.path));
        }
        let path = &self.paths[self.cursor % self.paths.len()];
        self.cursor = (self.cursor + 1) % self.paths.len();
        match Frame::open(path) {
            Ok(frame) => {
                self.frame_count += 1;
                Ok(frame)
            }
            Err(err) => {
                self.last_error = Some(format!("{:#}", err));
                Err(err)
            }
        }
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

/// Image files at `root`: the file itself, or the supported images in a directory, sorted.
pub fn list_images(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("failed to read image directory {}", root.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    if paths.is_empty() {
        return Err(anyhow!("no JPEG or PNG images found in {}", root.display()));
    }
    Ok(paths)
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
