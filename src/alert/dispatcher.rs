//! Alert dispatcher.
//!
//! Persists the snapshot, then sends the alert text and the photo through a
//! [`NotificationSink`]. Failures are logged and returned; nothing is retried.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::{AlertEvent, NotificationSink};

/// Step of a delivery that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStage {
    Text,
    Photo,
}

/// A delivery attempt that did not reach the sink. Already logged.
#[derive(Debug)]
pub struct DeliveryFailed {
    pub stage: DeliveryStage,
    pub message: String,
}

impl fmt::Display for DeliveryFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self.stage {
            DeliveryStage::Text => "send text",
            DeliveryStage::Photo => "send photo",
        };
        write!(f, "{} failed: {}", stage, self.message)
    }
}

impl std::error::Error for DeliveryFailed {}

/// Successful delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivered {
    /// Where the snapshot was written, if writing it succeeded.
    pub snapshot_path: Option<PathBuf>,
}

/// Persists the alert snapshot and notifies the sink, once per event.
///
/// Nothing here retries and nothing escapes as a panic: every failure is
/// logged and returned as `DeliveryFailed`.
pub struct AlertDispatcher {
    sink: Box<dyn NotificationSink>,
    destination: String,
    snapshot_path: PathBuf,
}

impl AlertDispatcher {
    pub fn new(
        sink: Box<dyn NotificationSink>,
        destination: impl Into<String>,
        snapshot_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sink,
            destination: destination.into(),
            snapshot_path: snapshot_path.into(),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn dispatch(&self, event: AlertEvent) -> Result<Delivered, DeliveryFailed> {
        // A failed write loses the inspectable artifact, not the alert.
        let snapshot_path = match event.snapshot.write_to(&self.snapshot_path) {
            Ok(()) => Some(self.snapshot_path.clone()),
            Err(err) => {
                log::error!("alert snapshot not saved: {:#}", err);
                None
            }
        };

        let text = format_alert_text(event.confidence, event.captured_at);
        if let Err(err) = self.sink.send_text(&self.destination, &text) {
            return Err(self.failed(DeliveryStage::Text, err));
        }

        let caption = format!("Smoke: {:.2}", event.confidence);
        if let Err(err) = self
            .sink
            .send_photo(&self.destination, event.snapshot.jpeg(), &caption)
        {
            return Err(self.failed(DeliveryStage::Photo, err));
        }

        log::info!(
            "alert delivered via {} (confidence {:.2})",
            self.sink.name(),
            event.confidence
        );
        Ok(Delivered { snapshot_path })
    }

    fn failed(&self, stage: DeliveryStage, err: anyhow::Error) -> DeliveryFailed {
        let failure = DeliveryFailed {
            stage,
            message: format!("{:#}", err),
        };
        log::error!("alert delivery via {}: {}", self.sink.name(), failure);
        failure
    }
}

/// Text notification body.
pub fn format_alert_text(confidence: f32, captured_at: SystemTime) -> String {
    let at: DateTime<Utc> = captured_at.into();
    format!(
        "Smoke detected! confidence {:.2} at {}",
        confidence,
        at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{MemorySink, SentMessage};
    use crate::frame::{Frame, Snapshot};
    use std::time::{Duration, UNIX_EPOCH};

    fn event() -> AlertEvent {
        let frame = Frame::new(vec![200u8; 16 * 16 * 3], 16, 16).unwrap();
        AlertEvent {
            snapshot: Snapshot::annotate(&frame, &[]).unwrap(),
            confidence: 0.87,
            captured_at: UNIX_EPOCH + Duration::from_secs(1_736_937_127),
        }
    }

    #[test]
    fn alert_text_includes_confidence_and_time() {
        let text = format_alert_text(0.87, UNIX_EPOCH + Duration::from_secs(1_736_937_127));
        assert_eq!(
            text,
            "Smoke detected! confidence 0.87 at 2025-01-15 10:32:07 UTC"
        );
    }

    #[test]
    fn dispatch_writes_snapshot_then_sends_text_and_photo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smoke_detected.jpg");
        let sink = MemorySink::new();
        let dispatcher = AlertDispatcher::new(Box::new(sink.clone()), "chat-1", &path);

        let ev = event();
        let jpeg_len = ev.snapshot.jpeg().len();
        let delivered = dispatcher.dispatch(ev).expect("delivered");

        assert_eq!(delivered.snapshot_path.as_deref(), Some(path.as_path()));
        assert_eq!(std::fs::read(&path).unwrap().len(), jpeg_len);

        let sent = sink.sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], SentMessage::Text { destination, .. } if destination == "chat-1"));
        assert_eq!(
            sent[1],
            SentMessage::Photo {
                destination: "chat-1".to_string(),
                bytes: jpeg_len,
                caption: "Smoke: 0.87".to_string(),
            }
        );
    }

    #[test]
    fn sink_failure_is_returned_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = AlertDispatcher::new(
            Box::new(MemorySink::failing()),
            "chat-1",
            dir.path().join("smoke_detected.jpg"),
        );

        let err = dispatcher.dispatch(event()).unwrap_err();
        assert_eq!(err.stage, DeliveryStage::Text);
        assert!(err.to_string().contains("sink rejected"));
    }

    #[test]
    fn unwritable_snapshot_still_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("smoke_detected.jpg");
        let sink = MemorySink::new();
        let dispatcher = AlertDispatcher::new(Box::new(sink.clone()), "chat-1", path);

        let delivered = dispatcher.dispatch(event()).expect("delivered");
        assert!(delivered.snapshot_path.is_none());
        assert_eq!(sink.sent().len(), 2);
    }
}
