//! Network camera frame source.
//!
//! Polls `GET <base>/capture` on an HTTP camera (ESP32-CAM style firmware)
//! and decodes the returned JPEG in memory.
//!
//! Every failure here is transient: a bad status, an empty or oversized body,
//! a timeout, a refused connection, or an undecodable image. The run loop
//! backs off and asks again.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};
use url::Url;

use super::{FrameSource, SourceError, SourceStats};
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CAPTURE_PATH: &str = "capture";

/// Configuration for a network camera.
#[derive(Clone, Debug)]
pub struct HttpCameraConfig {
    /// Camera base URL, e.g. `http://192.168.100.25`.
    pub base_url: Url,
    /// Bound on connect + read for one fetch.
    pub timeout: Duration,
}

pub struct HttpCameraSource {
    config: HttpCameraConfig,
    capture_url: String,
    agent: ureq::Agent,
    last_frame_at: Option<Instant>,
    frame_count: u64,
    failures: u64,
    last_error: Option<String>,
}

impl HttpCameraSource {
    pub fn new(config: HttpCameraConfig) -> Self {
        let capture_url = format!(
            "{}/{}",
            config.base_url.as_str().trim_end_matches('/'),
            CAPTURE_PATH
        );
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            config,
            capture_url,
            agent,
            last_frame_at: None,
            frame_count: 0,
            failures: 0,
            last_error: None,
        }
    }

    pub fn capture_url(&self) -> &str {
        &self.capture_url
    }

    fn fetch(&self) -> Result<Frame> {
        let response = match self.agent.get(&self.capture_url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(anyhow!("HTTP {} from {}", code, self.capture_url))
            }
            Err(err) => {
                return Err(anyhow::Error::new(err))
                    .with_context(|| format!("fetch frame from {}", self.capture_url))
            }
        };
        if response.status() != 200 {
            return Err(anyhow!(
                "HTTP {} from {}",
                response.status(),
                self.capture_url
            ));
        }

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES as u64 + 1)
            .read_to_end(&mut bytes)
            .context("read jpeg body")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty jpeg body"));
        }
        if bytes.len() > MAX_JPEG_BYTES {
            return Err(anyhow!("jpeg body exceeds {} bytes", MAX_JPEG_BYTES));
        }
        Frame::decode(&bytes)
    }

    fn health_grace(&self) -> Duration {
        // A few missed polls are normal for these cameras.
        (self.config.timeout * 3).max(Duration::from_secs(5))
    }
}

impl FrameSource for HttpCameraSource {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        match self.fetch() {
            Ok(frame) => {
                self.frame_count += 1;
                self.last_frame_at = Some(Instant::now());
                self.last_error = None;
                Ok(frame)
            }
            Err(err) => {
                self.failures += 1;
                self.last_error = Some(format!("{:#}", err));
                Err(SourceError::transient(err))
            }
        }
    }

    fn describe(&self) -> String {
        self.capture_url.clone()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            failures: self.failures,
            source: self.capture_url.clone(),
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        match self.last_frame_at {
            Some(at) => at.elapsed() <= self.health_grace(),
            None => true,
        }
    }
}
