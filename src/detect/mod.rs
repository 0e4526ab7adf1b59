//! Smoke detection.
//!
//! Backends produce raw boxes in frame pixel coordinates; the adapter applies
//! the class and confidence filter.

mod adapter;
mod backend;
mod backends;
mod result;

pub use adapter::{DetectionAdapter, Inference};
pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, DetectionSignal, SMOKE_CLASS_ID};
