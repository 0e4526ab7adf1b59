//! Synthetic frame source (`stub://`).
//!
//! Produces a drifting gradient so consecutive frames differ. Never fails.

use super::{FrameSource, SourceError, SourceStats};
use crate::frame::Frame;

pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
    /// Simulated scene state, bumped every 50 frames.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        log::info!("SyntheticSource: connected to stub://{}", name);
        Self {
            name: name.to_string(),
            width,
            height,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.width as usize) * (self.height as usize) * 3;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(pixels, self.width, self.height).map_err(SourceError::device)
    }

    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            failures: 0,
            source: self.describe(),
        }
    }

    fn release(&mut self) {
        log::info!("SyntheticSource: released stub://{}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_produces_frames() {
        let mut source = SyntheticSource::new("test", 64, 48);
        let frame = source.next_frame().expect("synthetic frame");
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert_eq!(frame.byte_len(), 64 * 48 * 3);
    }

    #[test]
    fn synthetic_frames_change_over_time() {
        let mut source = SyntheticSource::new("test", 8, 8);
        let a = source.next_frame().unwrap();
        let b = source.next_frame().unwrap();
        assert_ne!(a.pixels(), b.pixels());
        assert_eq!(source.stats().frames_captured, 2);
    }
}
