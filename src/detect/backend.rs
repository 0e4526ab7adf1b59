//! Detector backend trait.

use anyhow::Result;

use crate::detect::result::BoundingBox;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Backends are opaque models: a frame goes in, unfiltered boxes come out.
/// Class and confidence filtering belongs to `DetectionAdapter`, not here.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the model on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
