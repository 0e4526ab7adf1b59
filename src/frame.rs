//! Captured frames and alert snapshots.
//!
//! - `Frame`: RGB8 pixel buffer plus capture time. Lives for one loop iteration.
//! - `Snapshot`: JPEG of a frame with the smoke boxes drawn on it. Built only
//!   when the debounce machine fires.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, GenericImageView};
use std::fmt;
use std::path::Path;
use std::time::{Instant, SystemTime};

use crate::detect::BoundingBox;

/// JPEG quality used for snapshots.
pub const SNAPSHOT_JPEG_QUALITY: u8 = 90;

const BOX_COLOR: [u8; 3] = [255, 0, 0];
const BOX_THICKNESS: u32 = 2;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Immutable RGB8 frame.
///
/// Pixels are row-major, three bytes per pixel, no row padding.
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture instant (debounce arithmetic).
    pub captured_at: Instant,
    /// Wall-clock capture time (alert text).
    pub captured_wall: SystemTime,
}

impl Frame {
    /// Wrap an RGB8 buffer. Fails if the length does not match the dimensions.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            captured_at: Instant::now(),
            captured_wall: SystemTime::now(),
        })
    }

    /// Decode a compressed image (JPEG from network cameras, MJPG devices).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode jpeg")?;
        let (width, height) = image.dimensions();
        Self::new(image.into_rgb8().into_raw(), width, height)
    }

    /// Override the capture instant. Used by replayed and scripted sources.
    pub fn with_capture_instant(mut self, at: Instant) -> Self {
        self.captured_at = at;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("captured_wall", &self.captured_wall)
            .finish_non_exhaustive()
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// Snapshot
// ----------------------------------------------------------------------------

/// JPEG-encoded, annotated copy of the frame that triggered an alert.
#[derive(Clone, Debug)]
pub struct Snapshot {
    jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Snapshot {
    /// Draw `boxes` onto a copy of `frame` and encode it as JPEG.
    pub fn annotate(frame: &Frame, boxes: &[BoundingBox]) -> Result<Self> {
        let mut pixels = frame.pixels().to_vec();
        for bbox in boxes {
            draw_box(&mut pixels, frame.width, frame.height, bbox);
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, SNAPSHOT_JPEG_QUALITY)
            .encode(&pixels, frame.width, frame.height, ExtendedColorType::Rgb8)
            .context("encode snapshot jpeg")?;

        Ok(Self {
            jpeg,
            width: frame.width,
            height: frame.height,
        })
    }

    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    /// Write the JPEG to `path`, replacing any previous artifact.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.jpeg)
            .with_context(|| format!("write snapshot to {}", path.display()))
    }
}

/// Hollow rectangle, clipped to the frame.
fn draw_box(pixels: &mut [u8], width: u32, height: u32, bbox: &BoundingBox) {
    if width == 0 || height == 0 {
        return;
    }
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x1 = bbox.x1.clamp(0.0, max_x) as u32;
    let y1 = bbox.y1.clamp(0.0, max_y) as u32;
    let x2 = bbox.x2.clamp(0.0, max_x) as u32;
    let y2 = bbox.y2.clamp(0.0, max_y) as u32;
    if x2 < x1 || y2 < y1 {
        return;
    }

    for t in 0..BOX_THICKNESS {
        for x in x1..=x2 {
            put_pixel(pixels, width, height, x, y1.saturating_add(t));
            put_pixel(pixels, width, height, x, y2.saturating_sub(t));
        }
        for y in y1..=y2 {
            put_pixel(pixels, width, height, x1.saturating_add(t), y);
            put_pixel(pixels, width, height, x2.saturating_sub(t), y);
        }
    }
}

fn put_pixel(pixels: &mut [u8], width: u32, height: u32, x: u32, y: u32) {
    if x >= width || y >= height {
        return;
    }
    let offset = (y as usize * width as usize + x as usize) * 3;
    if let Some(px) = pixels.get_mut(offset..offset + 3) {
        px.copy_from_slice(&BOX_COLOR);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![128u8; (width * height * 3) as usize], width, height).unwrap()
    }

    #[test]
    fn frame_debug_omits_pixels() {
        let rendered = format!("{:?}", gray_frame(4, 2));
        assert!(rendered.contains("width: 4"));
        assert!(rendered.contains("height: 2"));
        assert!(!rendered.contains("pixels"));
    }

    #[test]
    fn frame_rejects_length_mismatch() {
        assert!(Frame::new(vec![0u8; 10], 2, 2).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2).is_ok());
    }

    #[test]
    fn draw_box_paints_edges_only() {
        let frame = gray_frame(10, 10);
        let mut pixels = frame.pixels().to_vec();
        let bbox = BoundingBox {
            x1: 2.0,
            y1: 2.0,
            x2: 7.0,
            y2: 7.0,
            class_id: 0,
            confidence: 0.9,
        };
        draw_box(&mut pixels, 10, 10, &bbox);

        let at = |x: usize, y: usize| &pixels[(y * 10 + x) * 3..(y * 10 + x) * 3 + 3];
        assert_eq!(at(2, 2), &BOX_COLOR);
        assert_eq!(at(7, 5), &BOX_COLOR);
        assert_eq!(at(5, 5), &[128, 128, 128]);
        assert_eq!(at(0, 0), &[128, 128, 128]);
    }

    #[test]
    fn draw_box_clips_out_of_frame_coordinates() {
        let mut pixels = vec![0u8; 4 * 4 * 3];
        let bbox = BoundingBox {
            x1: -5.0,
            y1: -5.0,
            x2: 100.0,
            y2: 100.0,
            class_id: 0,
            confidence: 0.9,
        };
        draw_box(&mut pixels, 4, 4, &bbox);
        assert_eq!(&pixels[0..3], &BOX_COLOR);
    }

    #[test]
    fn snapshot_encodes_decodable_jpeg() -> Result<()> {
        let frame = gray_frame(32, 24);
        let snapshot = Snapshot::annotate(&frame, &[])?;
        assert_eq!(&snapshot.jpeg()[..2], &[0xFF, 0xD8]);

        let decoded = Frame::decode(snapshot.jpeg())?;
        assert_eq!(decoded.width, 32);
        assert_eq!(decoded.height, 24);
        Ok(())
    }
}
