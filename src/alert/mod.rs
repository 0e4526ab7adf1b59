//! Alert delivery.
//!
//! - `AlertEvent`: one fired detection, consumed exactly once.
//! - `NotificationSink`: where alerts go (Telegram, log, memory).
//! - `AlertDispatcher`: persist the snapshot, then notify the sink.
//! - `DispatchWorker`: runs the dispatcher on its own thread behind a bounded
//!   queue so slow deliveries never stall frame acquisition.

mod dispatcher;
mod sinks;
pub mod telegram;
mod worker;

use anyhow::Result;
use std::time::SystemTime;

use crate::frame::Snapshot;

pub use dispatcher::{format_alert_text, AlertDispatcher, Delivered, DeliveryFailed, DeliveryStage};
pub use sinks::{LoggingSink, MemorySink, SentMessage};
pub use telegram::{TelegramConfig, TelegramSink};
pub use worker::{DispatchStats, DispatchWorker, DEFAULT_QUEUE_CAPACITY};

/// A fired detection on its way to the notification sink.
#[derive(Clone, Debug)]
pub struct AlertEvent {
    pub snapshot: Snapshot,
    pub confidence: f32,
    pub captured_at: SystemTime,
}

/// Outbound notification channel.
///
/// Implementations own their transport timeouts; a timeout is an ordinary
/// error, never a panic.
pub trait NotificationSink: Send {
    fn name(&self) -> &'static str;

    fn send_text(&self, destination: &str, text: &str) -> Result<()>;

    fn send_photo(&self, destination: &str, jpeg: &[u8], caption: &str) -> Result<()>;
}
