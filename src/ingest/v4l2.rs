//! V4L2 frame source.
//!
//! This module provides `V4l2Source` for local capture devices
//! (e.g. `/dev/video0`, a USB webcam).
//!
//! The device is opened once by `connect()`. A local camera is expected to be
//! present for the whole run, so open and read failures are reported as
//! `DeviceUnavailable` and stop the run loop.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceError, SourceStats};
use crate::frame::Frame;

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Requested frame rate. Zero leaves the driver default.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PixelLayout {
    Rgb24,
    Mjpeg,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Source {
    config: V4l2Config,
    state: Option<DeviceState>,
    layout: PixelLayout,
    frame_count: u64,
    failures: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            layout: PixelLayout::Rgb24,
            frame_count: 0,
            failures: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    /// Open the device and start streaming.
    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        self.layout = match &format.fourcc.repr {
            b"RGB3" => PixelLayout::Rgb24,
            b"MJPG" => PixelLayout::Mjpeg,
            other => {
                return Err(anyhow!(
                    "v4l2 device {} only offers unsupported pixel format {}",
                    self.config.device,
                    String::from_utf8_lossy(other)
                ))
            }
        };

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.layout
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let layout = self.layout;
        let (width, height) = (self.active_width, self.active_height);
        let state = self.state.as_mut().context("v4l2 device not connected")?;
        state.with_mut(|fields| -> Result<Frame> {
            let (buf, meta) = fields.stream.next().context("capture v4l2 frame")?;
            let used = (meta.bytesused as usize).min(buf.len());
            match layout {
                PixelLayout::Rgb24 => {
                    let expected = (width as usize) * (height as usize) * 3;
                    let data = buf
                        .get(..expected)
                        .ok_or_else(|| anyhow!("short v4l2 buffer: {} bytes", buf.len()))?;
                    Frame::new(data.to_vec(), width, height)
                }
                PixelLayout::Mjpeg => Frame::decode(&buf[..used]),
            }
        })
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

impl FrameSource for V4l2Source {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        match self.capture() {
            Ok(frame) => {
                self.frame_count += 1;
                self.last_frame_at = Some(Instant::now());
                Ok(frame)
            }
            Err(err) => {
                self.failures += 1;
                self.last_error = Some(format!("{:#}", err));
                Err(SourceError::device(err))
            }
        }
    }

    fn describe(&self) -> String {
        self.config.device.clone()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            failures: self.failures,
            source: self.config.device.clone(),
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: released {}", self.config.device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_fails_to_connect() {
        let mut source = V4l2Source::new(V4l2Config {
            device: "/dev/video-smokewatch-missing".to_string(),
            ..V4l2Config::default()
        });
        assert!(source.connect().is_err());
        assert!(!source.is_healthy());
    }

    #[test]
    fn unconnected_source_reports_device_unavailable() {
        let mut source = V4l2Source::new(V4l2Config::default());
        match source.next_frame() {
            Err(err) => assert!(err.is_fatal()),
            Ok(_) => panic!("unconnected source must not produce frames"),
        }
    }

    #[test]
    fn every_failed_read_is_counted() {
        let mut source = V4l2Source::new(V4l2Config::default());
        assert!(source.next_frame().is_err());
        assert!(source.next_frame().is_err());
        let stats = source.stats();
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.frames_captured, 0);
    }
}
