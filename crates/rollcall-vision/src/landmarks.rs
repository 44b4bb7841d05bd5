//! 106-point landmark refinement, mapped into the named groups the pose gate
//! consumes.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rollcall_core::types::{FaceRegion, Frame, Landmarks, LEFT_EYE, RIGHT_EYE};

use crate::imageops::{crop_resize_rgb, CropBox};
use crate::VisionError;

const LMK_INPUT_SIZE: usize = 192;
const LMK_POINTS: usize = 106;
/// Landmark crops take a wider view of the face than the tight detector box.
const LMK_CROP_MARGIN: f32 = 0.2;

/// Point-group layout of the 106-point landmark head, in index order.
const GROUP_LAYOUT: &[(&str, usize)] = &[
    ("contour", 33),
    ("left_eyebrow", 9),
    ("right_eyebrow", 9),
    (LEFT_EYE, 10),
    (RIGHT_EYE, 10),
    ("nose", 15),
    ("mouth", 20),
];

pub struct LandmarkRefiner {
    session: Session,
}

impl LandmarkRefiner {
    /// Load the landmark ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded landmark model");
        Ok(Self { session })
    }

    /// Refine landmarks for one detected face, returning named point groups
    /// in source-frame coordinates.
    pub fn extract(&mut self, frame: &Frame, region: &FaceRegion) -> Result<Landmarks, VisionError> {
        let crop = CropBox::around(region, LMK_CROP_MARGIN);
        let rgb = crop_resize_rgb(frame, &crop, LMK_INPUT_SIZE);

        // The landmark head consumes raw pixel values, no mean/std rescale.
        let mut tensor = Array4::<f32>::zeros((1, 3, LMK_INPUT_SIZE, LMK_INPUT_SIZE));
        for y in 0..LMK_INPUT_SIZE {
            for x in 0..LMK_INPUT_SIZE {
                let off = (y * LMK_INPUT_SIZE + x) * 3;
                for c in 0..3 {
                    tensor[[0, c, y, x]] = rgb[off + c] as f32;
                }
            }
        }

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::InferenceFailed(format!("landmark extraction: {e}")))?;

        if raw.len() < LMK_POINTS * 2 {
            return Err(VisionError::InferenceFailed(format!(
                "expected {} landmark values, got {}",
                LMK_POINTS * 2,
                raw.len()
            )));
        }

        let points = decode_points(raw, &crop);
        Ok(group_points(&points))
    }
}

/// Decode normalized [-1, 1] model outputs into source-frame coordinates.
fn decode_points(raw: &[f32], crop: &CropBox) -> Vec<(f32, f32)> {
    let half = (LMK_INPUT_SIZE / 2) as f32;
    (0..LMK_POINTS)
        .map(|i| {
            let cx = (raw[i * 2] + 1.0) * half;
            let cy = (raw[i * 2 + 1] + 1.0) * half;
            crop.to_frame(cx, cy, LMK_INPUT_SIZE)
        })
        .collect()
}

/// Slice the flat point list into the named groups of [`GROUP_LAYOUT`].
fn group_points(points: &[(f32, f32)]) -> Landmarks {
    let mut landmarks = Landmarks::new();
    let mut offset = 0usize;
    for (name, count) in GROUP_LAYOUT {
        landmarks.insert(*name, points[offset..offset + count].to_vec());
        offset += count;
    }
    landmarks
}
