//! ArcFace face embedder via ONNX Runtime.
//!
//! Produces 512-dimensional L2-normalized embeddings from a margin-padded
//! square face crop.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rollcall_core::types::{Embedding, FaceRegion, Frame};

use crate::imageops::{crop_resize_rgb, CropBox};
use crate::VisionError;

const EMBED_INPUT_SIZE: usize = 112;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 127.5; // symmetric normalization, pixel 127.5 → 0.0
const EMBED_CROP_MARGIN: f32 = 0.1;

/// Embedding dimension produced by the recognition model.
pub const EMBEDDING_DIM: usize = 512;

pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the recognition ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded face recognition model");
        Ok(Self { session })
    }

    /// Extract an embedding for one detected face.
    pub fn extract(&mut self, frame: &Frame, region: &FaceRegion) -> Result<Embedding, VisionError> {
        let crop = CropBox::around(region, EMBED_CROP_MARGIN);
        let rgb = crop_resize_rgb(frame, &crop, EMBED_INPUT_SIZE);
        let input = preprocess(&rgb);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(VisionError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

/// Normalize a 112×112 RGB crop into an NCHW float tensor.
fn preprocess(rgb: &[u8]) -> Array4<f32> {
    let size = EMBED_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        for x in 0..size {
            let off = (y * size + x) * 3;
            for c in 0..3 {
                let pixel = rgb.get(off + c).copied().unwrap_or(0) as f32;
                tensor[[0, c, y, x]] = (pixel - EMBED_MEAN) / EMBED_STD;
            }
        }
    }

    tensor
}

fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|x| x / norm).collect()
    } else {
        values.to_vec()
    }
}
