//! Detection result types.

/// Class id the smoke model assigns to smoke.
pub const SMOKE_CLASS_ID: u32 = 0;

/// One box reported by the model, in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: u32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Per-frame reduction of the model output.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DetectionSignal {
    /// At least one smoke box passed the confidence filter.
    pub present: bool,
    /// Highest confidence among passing boxes, `0.0` when none passed.
    pub max_confidence: f32,
}
