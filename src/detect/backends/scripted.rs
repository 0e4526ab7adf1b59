use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::BoundingBox;
use crate::frame::Frame;

/// Replays a fixed sequence of detections, one entry per frame.
///
/// Once the script runs out the backend reports nothing, or repeats the
/// script when built with `cycle`.
pub struct ScriptedBackend {
    script: Vec<Vec<BoundingBox>>,
    pending: VecDeque<Vec<BoundingBox>>,
    cycle: bool,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<BoundingBox>>) -> Self {
        Self {
            pending: script.iter().cloned().collect(),
            script,
            cycle: false,
            calls: 0,
        }
    }

    /// Restart the script from the top when it is exhausted.
    pub fn cycle(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Script for dry runs: ten smoky frames, then thirty clear ones.
    pub fn dry_run() -> Self {
        let smoke = BoundingBox {
            x1: 40.0,
            y1: 40.0,
            x2: 200.0,
            y2: 160.0,
            class_id: crate::detect::SMOKE_CLASS_ID,
            confidence: 0.92,
        };
        let mut script = vec![vec![smoke]; 10];
        script.extend(std::iter::repeat_with(Vec::new).take(30));
        Self::new(script).cycle()
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>> {
        self.calls += 1;
        if self.pending.is_empty() && self.cycle {
            self.pending = self.script.iter().cloned().collect();
        }
        Ok(self.pending.pop_front().unwrap_or_default())
    }
}
