//! SCRFD face locator via ONNX Runtime.
//!
//! Anchor-free decoding over three stride levels with NMS post-processing.
//! Output regions use the (top, right, bottom, left) convention and are
//! clamped inside the source frame.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rollcall_core::types::{FaceRegion, Frame};

use crate::imageops;
use crate::VisionError;

const DET_INPUT_SIZE: usize = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_SCORE_THRESHOLD: f32 = 0.5;
const DET_NMS_IOU: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

/// One located face: clamped region plus the detector's own score (distinct
/// from the match confidence computed downstream).
#[derive(Debug, Clone)]
pub struct Detection {
    pub region: FaceRegion,
    pub score: f32,
}

/// Detection in letterbox-demapped frame coordinates, before clamping.
#[derive(Debug, Clone, Copy)]
struct RawDetection {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// Scale and padding applied by the letterbox resize, kept for de-mapping.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

pub struct FaceDetector {
    session: Session,
    input_size: usize,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        tracing::info!(path = %model_path.display(), num_outputs, "loaded face detection model");

        if num_outputs < 6 {
            return Err(VisionError::InferenceFailed(format!(
                "detection model needs at least 6 outputs (3 strides × score/bbox), got {num_outputs}"
            )));
        }

        Ok(Self {
            session,
            input_size: DET_INPUT_SIZE,
        })
    }

    /// Detect faces in an RGB frame, sorted by score, highest first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        let (input, letterbox) = self.preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut raw = Vec::new();
        for (stride_pos, &stride) in DET_STRIDES.iter().enumerate() {
            // Standard SCRFD export ordering: [0-2] scores, [3-5] bboxes
            // for strides 8/16/32 (remaining outputs are unused keypoints).
            let (_, scores) = outputs[stride_pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[stride_pos + 3]
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            decode_stride(scores, bboxes, stride, self.input_size, &letterbox, &mut raw);
        }

        let mut kept = nms(raw, DET_NMS_IOU);
        kept.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        Ok(kept
            .into_iter()
            .filter_map(|det| clamp_to_frame(&det, frame.width, frame.height))
            .collect())
    }

    /// Letterbox an RGB frame into a normalized NCHW tensor.
    fn preprocess(&self, frame: &Frame) -> (Array4<f32>, Letterbox) {
        let size = self.input_size;
        let scale_w = size as f32 / frame.width as f32;
        let scale_h = size as f32 / frame.height as f32;
        let scale = scale_w.min(scale_h);

        let new_w = ((frame.width as f32 * scale).round() as usize).max(1);
        let new_h = ((frame.height as f32 * scale).round() as usize).max(1);
        let pad_x = (size - new_w) as f32 / 2.0;
        let pad_y = (size - new_h) as f32 / 2.0;

        let resized = imageops::resize_rgb(frame, new_w, new_h);

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for y in 0..size {
            for x in 0..size {
                let inside = y >= pad_y_start
                    && y < pad_y_start + new_h
                    && x >= pad_x_start
                    && x < pad_x_start + new_w;
                for c in 0..3 {
                    let pixel = if inside {
                        let off = ((y - pad_y_start) * new_w + (x - pad_x_start)) * 3 + c;
                        resized[off] as f32
                    } else {
                        DET_MEAN // pad value normalizes to 0.0
                    };
                    tensor[[0, c, y, x]] = (pixel - DET_MEAN) / DET_STD;
                }
            }
        }

        (tensor, Letterbox { scale, pad_x, pad_y })
    }
}

/// Decode one stride level into letterbox-demapped raw detections.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &Letterbox,
    out: &mut Vec<RawDetection>,
) {
    let grid = input_size / stride;
    let num_anchors = grid * grid * DET_ANCHORS_PER_CELL;

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= DET_SCORE_THRESHOLD {
            continue;
        }

        let cell = idx / DET_ANCHORS_PER_CELL;
        let anchor_cx = ((cell % grid) * stride) as f32;
        let anchor_cy = ((cell / grid) * stride) as f32;

        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }

        // Offsets are in stride units: [left, top, right, bottom] from anchor.
        let x1 = anchor_cx - bboxes[off] * stride as f32;
        let y1 = anchor_cy - bboxes[off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[off + 3] * stride as f32;

        out.push(RawDetection {
            x1: (x1 - letterbox.pad_x) / letterbox.scale,
            y1: (y1 - letterbox.pad_y) / letterbox.scale,
            x2: (x2 - letterbox.pad_x) / letterbox.scale,
            y2: (y2 - letterbox.pad_y) / letterbox.scale,
            score,
        });
    }
}

/// Non-Maximum Suppression: drop detections overlapping a higher-scored one.
fn nms(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Clamp a raw detection inside the frame; drops regions that degenerate to
/// zero area at the border.
fn clamp_to_frame(det: &RawDetection, width: u32, height: u32) -> Option<Detection> {
    let left = det.x1.max(0.0) as u32;
    let top = det.y1.max(0.0) as u32;
    let right = (det.x2.min(width as f32).max(0.0)) as u32;
    let bottom = (det.y2.min(height as f32).max(0.0)) as u32;

    let region = FaceRegion { top, right, bottom, left };
    if !region.within(width, height) {
        return None;
    }
    Some(Detection {
        region,
        score: det.score,
    })
}
