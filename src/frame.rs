//! Frame values handed to the processor.
//!
//! - `Frame`: owned RGB8 image for a single invocation. Nothing retains it across frames.
//! - `ConfidenceThreshold`: per-invocation slider value (default 0.6, passed through as-is).
//! - `SharedThreshold`: lock-free slot the UI writes and stream workers read.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Default value of the confidence slider.
pub const DEFAULT_CONFIDENCE: f32 = 0.6;

/// JPEG quality used for published frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// ----------------------------------------------------------------------------
// Frame: owned RGB8 pixels
// ----------------------------------------------------------------------------

/// A decoded camera frame: 3 channels, 8 bits per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("pixel buffer does not fit {}x{}", width, height))?;
        Ok(Self { image })
    }

    /// Single-color frame, mostly useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, image::Rgb(rgb)),
        }
    }

    /// Decode a still image from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .to_rgb8();
        Ok(Self { image })
    }

    /// Decode an in-memory encoded image (JPEG, PNG).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .context("failed to decode image bytes")?
            .to_rgb8();
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Packed RGB24 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Horizontally mirrored copy. Dimensions are preserved.
    pub fn mirrored(&self) -> Frame {
        Frame {
            image: image::imageops::flip_horizontal(&self.image),
        }
    }

    /// Encode as JPEG for the browser stream.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        self.image
            .write_with_encoder(encoder)
            .context("failed to encode frame as JPEG")?;
        Ok(out)
    }

    /// Write to disk, format chosen from the file extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.image
            .save(path)
            .with_context(|| format!("failed to write image {}", path.display()))
    }
}

// ----------------------------------------------------------------------------
// ConfidenceThreshold
// ----------------------------------------------------------------------------

/// Minimum score a detection needs to be kept.
///
/// Out-of-range values are not rejected; they are handed to the model unchanged.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct ConfidenceThreshold(f32);

impl ConfidenceThreshold {
    pub fn new(value: f32) -> Self {
        Self(value)
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// True when a detection with `score` survives this threshold.
    pub fn admits(self, score: f32) -> bool {
        score >= self.0
    }
}

impl Default for ConfidenceThreshold {
    fn default() -> Self {
        Self(DEFAULT_CONFIDENCE)
    }
}

impl From<f32> for ConfidenceThreshold {
    fn from(value: f32) -> Self {
        Self(value)
    }
}

/// Slider value shared between the HTTP surface and stream workers.
#[derive(Clone, Debug)]
pub struct SharedThreshold {
    bits: Arc<AtomicU32>,
}

impl SharedThreshold {
    pub fn new(initial: ConfidenceThreshold) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(initial.value().to_bits())),
        }
    }

    pub fn get(&self) -> ConfidenceThreshold {
        ConfidenceThreshold(f32::from_bits(self.bits.load(Ordering::Relaxed)))
    }

    pub fn set(&self, value: ConfidenceThreshold) {
        self.bits.store(value.value().to_bits(), Ordering::Relaxed);
    }
}

impl Default for SharedThreshold {
    fn default() -> Self {
        Self::new(ConfidenceThreshold::default())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2).is_ok());
        let err = Frame::from_rgb(vec![0u8; 11], 2, 2).unwrap_err();
        assert!(err.to_string().contains("expected 12 RGB bytes"));
    }

    #[test]
    fn mirror_preserves_dimensions_and_swaps_columns() -> Result<()> {
        let pixels = vec![
            255, 0, 0, 0, 255, 0, 0, 0, 255, //
            1, 1, 1, 2, 2, 2, 3, 3, 3,
        ];
        let frame = Frame::from_rgb(pixels, 3, 2)?;
        let mirrored = frame.mirrored();
        assert_eq!(mirrored.dimensions(), (3, 2));
        assert_eq!(mirrored.as_image().get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(mirrored.as_image().get_pixel(2, 0).0, [255, 0, 0]);
        assert_eq!(mirrored.as_image().get_pixel(0, 1).0, [3, 3, 3]);
        Ok(())
    }

    #[test]
    fn jpeg_encoding_round_trips_dimensions() -> Result<()> {
        let frame = Frame::filled(32, 24, [10, 120, 200]);
        let jpeg = frame.encode_jpeg(DEFAULT_JPEG_QUALITY)?;
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = Frame::decode(&jpeg)?;
        assert_eq!(decoded.dimensions(), (32, 24));
        Ok(())
    }

    #[test]
    fn threshold_defaults_and_boundaries() {
        assert_eq!(ConfidenceThreshold::default().value(), 0.6);
        assert!(ConfidenceThreshold::new(0.0).admits(0.0));
        assert!(ConfidenceThreshold::new(1.0).admits(1.0));
        assert!(!ConfidenceThreshold::new(1.0).admits(0.999));
        assert!(ConfidenceThreshold::new(-0.5).admits(0.0));
        assert!(!ConfidenceThreshold::new(1.5).admits(1.0));
    }

    #[test]
    fn shared_threshold_is_visible_across_clones() {
        let shared = SharedThreshold::default();
        let reader = shared.clone();
        shared.set(ConfidenceThreshold::new(0.25));
        assert_eq!(reader.get().value(), 0.25);
    }
}
