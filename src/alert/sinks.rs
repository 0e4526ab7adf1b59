//! In-process sinks: log-only delivery for dry runs and a recording sink for tests.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

use super::NotificationSink;

/// Writes alerts to the log instead of sending them. Used by dry runs.
#[derive(Default)]
pub struct LoggingSink;

impl NotificationSink for LoggingSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send_text(&self, destination: &str, text: &str) -> Result<()> {
        log::info!("[{}] {}", destination, text);
        Ok(())
    }

    fn send_photo(&self, destination: &str, jpeg: &[u8], caption: &str) -> Result<()> {
        log::info!("[{}] photo {} bytes: {}", destination, jpeg.len(), caption);
        Ok(())
    }
}

/// One message captured by `MemorySink`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentMessage {
    Text {
        destination: String,
        text: String,
    },
    Photo {
        destination: String,
        bytes: usize,
        caption: String,
    },
}

/// Records messages in memory. Clones share the same record.
///
/// `failing()` builds a sink that rejects every send, for exercising the
/// delivery-failure path.
#[derive(Clone, Default)]
pub struct MemorySink {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    fn record(&self, message: SentMessage) -> Result<()> {
        if self.fail {
            return Err(anyhow!("sink rejected message"));
        }
        self.sent
            .lock()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?
            .push(message);
        Ok(())
    }
}

impl NotificationSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn send_text(&self, destination: &str, text: &str) -> Result<()> {
        self.record(SentMessage::Text {
            destination: destination.to_string(),
            text: text.to_string(),
        })
    }

    fn send_photo(&self, destination: &str, jpeg: &[u8], caption: &str) -> Result<()> {
        self.record(SentMessage::Photo {
            destination: destination.to_string(),
            bytes: jpeg.len(),
            caption: caption.to_string(),
        })
    }
}
