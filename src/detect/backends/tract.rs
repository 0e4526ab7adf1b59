#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::BoundingBox;
use crate::frame::Frame;

/// YOLOv5 hub defaults.
const CANDIDATE_CONFIDENCE: f32 = 0.25;
const NMS_IOU: f32 = 0.45;

/// Tract-based backend for a YOLOv5 ONNX export.
///
/// Output rows are `[cx, cy, w, h, objectness, class scores...]` in model
/// input pixels. Boxes are rescaled to the source frame.
pub struct TractBackend {
    model: TypedSimplePlan<TypedModel>,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    ///
    /// Tract runs on the CPU only; `use_gpu` is accepted so the configured
    /// preference is visible in the log.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, use_gpu: bool) -> Result<Self> {
        let model_path = model_path.as_ref();
        if use_gpu {
            log::warn!("TractBackend: GPU requested but not available; running on cpu");
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{}) on cpu",
            model_path.display(),
            input_size,
            input_size
        );
        Ok(Self { model, input_size })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        let resized = image::imageops::resize(
            &image,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );

        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }
}

/// Decode YOLOv5 output of shape `[1, N, 5 + classes]` into frame-space
/// boxes. Rows are in model input pixels; boxes are scaled to `frame_size`.
fn decode_rows(
    output: tract_ndarray::ArrayViewD<f32>,
    input_size: u32,
    frame_size: (u32, u32),
) -> Result<Vec<BoundingBox>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[2] < 6 {
        return Err(anyhow!("unexpected model output shape {:?}", shape));
    }
    let scale_x = frame_size.0 as f32 / input_size as f32;
    let scale_y = frame_size.1 as f32 / input_size as f32;

    let rows = output
        .into_shape((shape[1], shape[2]))
        .context("reshape model output")?;
    let candidates = rows
        .outer_iter()
        .filter_map(|row| {
            let objectness = row[4];
            let (class_id, class_score) = row
                .iter()
                .skip(5)
                .enumerate()
                .fold((0usize, f32::MIN), |best, (i, &s)| {
                    if s > best.1 {
                        (i, s)
                    } else {
                        best
                    }
                });
            let confidence = objectness * class_score;
            if confidence <= CANDIDATE_CONFIDENCE {
                return None;
            }
            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            Some(BoundingBox {
                x1: (cx - w / 2.0) * scale_x,
                y1: (cy - h / 2.0) * scale_y,
                x2: (cx + w / 2.0) * scale_x,
                y2: (cy + h / 2.0) * scale_y,
                class_id: class_id as u32,
                confidence,
            })
        })
        .collect();
    Ok(non_max_suppression(candidates, NMS_IOU))
}

/// Greedy per-class NMS, highest confidence first.
fn non_max_suppression(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        decode_rows(view, self.input_size, (frame.width, frame.height))
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size;
        let blank = Frame::new(vec![0u8; (side * side * 3) as usize], side, side)?;
        self.detect(&blank).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, class_id: u32, confidence: f32) -> BoundingBox {
        BoundingBox {
            x1,
            y1: 0.0,
            x2: x1 + 10.0,
            y2: 10.0,
            class_id,
            confidence,
        }
    }

    #[test]
    fn nms_keeps_best_of_overlapping_boxes() {
        let kept = non_max_suppression(
            vec![bbox(0.0, 0, 0.6), bbox(1.0, 0, 0.9), bbox(50.0, 0, 0.5)],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].x1, 50.0);
    }

    #[test]
    fn decode_rows_filters_candidates_and_rescales() {
        // Two classes: smoke (0) and fire (1). Model input is 100x100.
        let rows: Vec<f32> = vec![
            // smoke, 0.9 * 0.8 = 0.72, centred at (50, 50), 20x10
            50.0, 50.0, 20.0, 10.0, 0.9, 0.8, 0.1,
            // best class is fire, 0.6 * 0.7 = 0.42
            10.0, 10.0, 4.0, 4.0, 0.6, 0.2, 0.7,
            // 0.5 * 0.5 = 0.25 is not above the candidate cut
            80.0, 80.0, 10.0, 10.0, 0.5, 0.5, 0.0,
        ];
        let output = tract_ndarray::Array3::from_shape_vec((1, 3, 7), rows).unwrap();

        let boxes = decode_rows(output.view().into_dyn(), 100, (200, 50)).unwrap();

        assert_eq!(boxes.len(), 2);
        let smoke = &boxes[0];
        assert_eq!(smoke.class_id, 0);
        assert!((smoke.confidence - 0.72).abs() < 1e-6);
        assert_eq!((smoke.x1, smoke.x2), (80.0, 120.0));
        assert_eq!((smoke.y1, smoke.y2), (22.5, 27.5));
        assert_eq!(boxes[1].class_id, 1);
    }

    #[test]
    fn decode_rows_rejects_unexpected_shape() {
        let output = tract_ndarray::Array2::<f32>::zeros((3, 7));
        assert!(decode_rows(output.view().into_dyn(), 640, (640, 480)).is_err());
    }

    #[test]
    fn nms_is_per_class() {
        let kept = non_max_suppression(vec![bbox(0.0, 0, 0.9), bbox(0.0, 1, 0.8)], 0.45);
        assert_eq!(kept.len(), 2);
    }
}
