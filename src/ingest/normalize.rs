//! Camera pixel formats to RGB frames.

use anyhow::{anyhow, Result};

use crate::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2, `Y0 U Y1 V`. The default for most USB webcams.
    Yuyv,
    Nv12,
    /// Each buffer is a complete JPEG.
    Mjpeg,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"NV12" => Some(PixelFormat::Nv12),
            b"MJPG" => Some(PixelFormat::Mjpeg),
            _ => None,
        }
    }

    pub fn fourcc(self) -> [u8; 4] {
        match self {
            PixelFormat::Rgb24 => *b"RGB3",
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::Nv12 => *b"NV12",
            PixelFormat::Mjpeg => *b"MJPG",
        }
    }
}

pub fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Frame> {
    match format {
        PixelFormat::Rgb24 => Frame::from_rgb(pixels.to_vec(), width, height),
        PixelFormat::Yuyv => Frame::from_rgb(yuyv_to_rgb(pixels, width, height)?, width, height),
        PixelFormat::Nv12 => Frame::from_rgb(nv12_to_rgb(pixels, width, height)?, width, height),
        PixelFormat::Mjpeg => {
            let frame = Frame::decode(pixels)?;
            if frame.dimensions() != (width, height) {
                log::debug!(
                    "MJPEG frame is {}x{}, negotiated {}x{}",
                    frame.width(),
                    frame.height(),
                    width,
                    height
                );
            }
            Ok(frame)
        }
    }
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frames need an even width, got {}", width));
    }
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(2))
        .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(expected / 2 * 3);
    for chunk in pixels[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            rgb.extend_from_slice(&yuv_to_rgb(y as f32, u, v));
        }
    }
    Ok(rgb)
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    // Interleaved UV plane: one U/V pair per 2x2 block, odd edges rounded up.
    let uv_stride = w.div_ceil(2) * 2;
    let expected = uv_stride
        .checked_mul(h.div_ceil(2))
        .and_then(|uv_plane| uv_plane.checked_add(y_plane))
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * uv_stride + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;
            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&yuv_to_rgb(y, u, v));
        }
    }

    Ok(rgb)
}

fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    [clamp_to_u8(r), clamp_to_u8(g), clamp_to_u8(b)]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
