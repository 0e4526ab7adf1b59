//! Detection adapter.
//!
//! Wraps a [`DetectorBackend`] and reduces its raw boxes to a single
//! [`DetectionSignal`]: only smoke-class boxes strictly above the confidence
//! threshold count.

use anyhow::{Context, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, DetectionSignal, SMOKE_CLASS_ID};
use crate::frame::Frame;

/// Filtered model output for one frame.
#[derive(Clone, Debug, Default)]
pub struct Inference {
    pub signal: DetectionSignal,
    /// Smoke boxes above the threshold, kept for snapshot annotation.
    pub boxes: Vec<BoundingBox>,
}

/// Turns raw backend boxes into a smoke / no-smoke signal.
pub struct DetectionAdapter {
    backend: Box<dyn DetectorBackend>,
    confidence_threshold: f32,
}

impl DetectionAdapter {
    pub fn new(backend: Box<dyn DetectorBackend>, confidence_threshold: f32) -> Self {
        Self {
            backend,
            confidence_threshold,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.backend.warm_up()
    }

    /// Run the backend and keep only smoke boxes strictly above the threshold.
    pub fn infer(&mut self, frame: &Frame) -> Result<Inference> {
        let raw = self
            .backend
            .detect(frame)
            .with_context(|| format!("{} backend inference failed", self.backend.name()))?;
        Ok(filter_boxes(raw, self.confidence_threshold))
    }
}

/// Pure filtering step of `DetectionAdapter::infer`.
pub fn filter_boxes(raw: Vec<BoundingBox>, confidence_threshold: f32) -> Inference {
    let boxes: Vec<BoundingBox> = raw
        .into_iter()
        .filter(|b| b.class_id == SMOKE_CLASS_ID && b.confidence > confidence_threshold)
        .collect();
    let max_confidence = boxes.iter().map(|b| b.confidence).fold(0.0_f32, f32::max);
    Inference {
        signal: DetectionSignal {
            present: !boxes.is_empty(),
            max_confidence,
        },
        boxes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ScriptedBackend;

    fn bbox(class_id: u32, confidence: f32) -> BoundingBox {
        BoundingBox {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
            class_id,
            confidence,
        }
    }

    #[test]
    fn empty_output_is_not_present() {
        let inference = filter_boxes(vec![], 0.5);
        assert!(!inference.signal.present);
        assert_eq!(inference.signal.max_confidence, 0.0);
        assert!(inference.boxes.is_empty());
    }

    #[test]
    fn other_classes_are_ignored() {
        let inference = filter_boxes(vec![bbox(1, 0.99), bbox(2, 0.95)], 0.5);
        assert!(!inference.signal.present);
    }

    #[test]
    fn confidence_equal_to_threshold_does_not_count() {
        let inference = filter_boxes(vec![bbox(0, 0.5)], 0.5);
        assert!(!inference.signal.present);

        let inference = filter_boxes(vec![bbox(0, 0.5001)], 0.5);
        assert!(inference.signal.present);
    }

    #[test]
    fn max_confidence_is_over_passing_boxes() {
        let inference = filter_boxes(
            vec![bbox(0, 0.6), bbox(0, 0.8), bbox(1, 0.99), bbox(0, 0.3)],
            0.5,
        );
        assert!(inference.signal.present);
        assert_eq!(inference.signal.max_confidence, 0.8);
        assert_eq!(inference.boxes.len(), 2);
    }

    #[test]
    fn adapter_runs_backend() -> Result<()> {
        let backend = ScriptedBackend::new(vec![vec![bbox(0, 0.9)], vec![]]);
        let mut adapter = DetectionAdapter::new(Box::new(backend), 0.5);
        let frame = Frame::new(vec![0u8; 12], 2, 2)?;

        assert!(adapter.infer(&frame)?.signal.present);
        assert!(!adapter.infer(&frame)?.signal.present);
        Ok(())
    }
}
