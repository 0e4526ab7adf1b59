//! Smokewatch
//!
//! Watches one camera, runs a smoke detector on every frame and sends a
//! debounced alert (text plus annotated snapshot) when smoke appears.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (local V4L2 device, network HTTP camera, synthetic)
//! - `detect`: detector backends and the confidence/class filter
//! - `debounce`: READY/SUPPRESSED alert state machine
//! - `alert`: snapshot persistence and notification delivery
//! - `pipeline`: the single-threaded run loop tying them together
//! - `config`: environment and JSON configuration

pub mod alert;
pub mod config;
pub mod debounce;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;

pub use alert::{
    AlertDispatcher, AlertEvent, DispatchStats, DispatchWorker, LoggingSink, NotificationSink,
    TelegramConfig, TelegramSink,
};
pub use config::SmokewatchConfig;
pub use debounce::{DebounceConfig, DebounceOutcome, DebouncePhase, Debouncer};
pub use detect::{
    BoundingBox, DetectionAdapter, DetectionSignal, DetectorBackend, ScriptedBackend,
    SMOKE_CLASS_ID,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::{Frame, Snapshot};
pub use ingest::{open_source, CameraSpec, FrameSource, SourceError, SourceSettings};
pub use pipeline::{ExitReason, Pipeline, PipelineSettings, RunSummary, StopSignal};
