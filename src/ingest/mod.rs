//! Frame sources.
//!
//! This module provides the sources the daemon can watch:
//! - Local capture devices (feature: ingest-v4l2)
//! - Network cameras polled over HTTP (`GET <base>/capture`)
//! - Synthetic frames (`stub://`, dry runs and tests)
//!
//! All sources share one capability, `FrameSource::next_frame`. They differ
//! only in how their failures are classified:
//! - a local device that cannot be opened or read is `DeviceUnavailable` (fatal);
//! - a network camera hiccup is `TransientFetch` (retry after backoff).

mod backoff;
pub mod http;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::frame::Frame;

pub use backoff::BackoffPolicy;
pub use http::{HttpCameraConfig, HttpCameraSource};
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// Frame source failure, classified by severity.
#[derive(Debug)]
pub enum SourceError {
    /// Local device missing or unreadable. Stops the run loop.
    DeviceUnavailable(anyhow::Error),
    /// Network fetch failed. The run loop backs off and retries.
    TransientFetch(anyhow::Error),
}

impl SourceError {
    pub fn device(err: anyhow::Error) -> Self {
        SourceError::DeviceUnavailable(err)
    }

    pub fn transient(err: anyhow::Error) -> Self {
        SourceError::TransientFetch(err)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::DeviceUnavailable(_))
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::DeviceUnavailable(err) => write!(f, "device unavailable: {:#}", err),
            SourceError::TransientFetch(err) => write!(f, "transient fetch error: {:#}", err),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::DeviceUnavailable(err) | SourceError::TransientFetch(err) => {
                Some(err.as_ref())
            }
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub failures: u64,
    pub source: String,
}

/// A camera the run loop can pull frames from.
pub trait FrameSource {
    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame, SourceError>;

    /// Human-readable identity for logs.
    fn describe(&self) -> String;

    fn stats(&self) -> SourceStats;

    fn is_healthy(&self) -> bool {
        true
    }

    /// Release the underlying device or connection. Called once on shutdown.
    fn release(&mut self) {}
}

/// Which kind of source a `camera` setting selects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraSpec {
    /// Local capture device node, e.g. `/dev/video0`.
    Local { device: String },
    /// Network camera base URL; frames come from `<base>/capture`.
    Network { base_url: Url },
    /// Generated frames.
    Synthetic { name: String },
}

impl CameraSpec {
    /// Parse a camera setting: a device index (`0`), a device path
    /// (`/dev/video2`), an `http(s)://` base URL, or `stub://name`.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow!("camera source must not be empty"));
        }
        if let Some(name) = value.strip_prefix("stub://") {
            return Ok(CameraSpec::Synthetic {
                name: name.to_string(),
            });
        }
        if let Ok(index) = value.parse::<u32>() {
            return Ok(CameraSpec::Local {
                device: format!("/dev/video{}", index),
            });
        }
        if value.starts_with('/') {
            return Ok(CameraSpec::Local {
                device: value.to_string(),
            });
        }

        let base_url = Url::parse(value).with_context(|| format!("parse camera url {}", value))?;
        match base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported camera scheme '{}'; expected http(s), stub, or a device index",
                    other
                ))
            }
        }
        if base_url.host_str().is_none() {
            return Err(anyhow!("camera url {} has no host", value));
        }
        Ok(CameraSpec::Network { base_url })
    }

    pub fn is_network(&self) -> bool {
        matches!(self, CameraSpec::Network { .. })
    }
}

impl fmt::Display for CameraSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSpec::Local { device } => write!(f, "{}", device),
            CameraSpec::Network { base_url } => write!(f, "{}", base_url),
            CameraSpec::Synthetic { name } => write!(f, "stub://{}", name),
        }
    }
}

/// Settings shared by all sources.
#[derive(Clone, Debug)]
pub struct SourceSettings {
    pub camera: CameraSpec,
    pub fetch_timeout: Duration,
    pub width: u32,
    pub height: u32,
}

/// Open the source selected by `settings.camera`.
///
/// Local devices are opened here, once; failure is `DeviceUnavailable`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>, SourceError> {
    match &settings.camera {
        CameraSpec::Synthetic { name } => Ok(Box::new(SyntheticSource::new(
            name,
            settings.width,
            settings.height,
        ))),
        CameraSpec::Network { base_url } => {
            let source = HttpCameraSource::new(HttpCameraConfig {
                base_url: base_url.clone(),
                timeout: settings.fetch_timeout,
            });
            Ok(Box::new(source))
        }
        CameraSpec::Local { device } => open_local(device, settings),
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_local(device: &str, settings: &SourceSettings) -> Result<Box<dyn FrameSource>, SourceError> {
    let mut source = V4l2Source::new(V4l2Config {
        device: device.to_string(),
        width: settings.width,
        height: settings.height,
        ..V4l2Config::default()
    });
    source.connect().map_err(SourceError::device)?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_local(device: &str, _settings: &SourceSettings) -> Result<Box<dyn FrameSource>, SourceError> {
    Err(SourceError::device(anyhow!(
        "local device {} requires the ingest-v4l2 feature",
        device
    )))
}
