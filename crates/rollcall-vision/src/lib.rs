//! rollcall-vision — the face locator & embedder capability.
//!
//! Wraps the insightface buffalo_l model family behind
//! [`rollcall_core::FaceAnalyzer`]: SCRFD detection, 106-point landmark
//! refinement and ArcFace embedding, all over ONNX Runtime on CPU, operating
//! on byte-interleaved RGB frames.

pub mod analyzer;
pub mod detector;
pub mod embedder;
mod imageops;
pub mod landmarks;
pub mod models;

use std::path::PathBuf;

use thiserror::Error;

pub use analyzer::OnnxFaceAnalyzer;
pub use detector::{Detection, FaceDetector};
pub use embedder::FaceEmbedder;
pub use landmarks::LandmarkRefiner;
pub use models::{default_model_dir, verify_models_dir, ModelIntegrityError};

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("model file not found: {0} — download the buffalo_l models or set ROLLCALL_MODEL_DIR")]
    ModelNotFound(PathBuf),
    #[error(transparent)]
    Integrity(#[from] ModelIntegrityError),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}
