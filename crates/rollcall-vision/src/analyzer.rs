//! The composed face locator & embedder capability.

use std::path::Path;

use rollcall_core::engine::{AnalyzerError, FaceAnalyzer};
use rollcall_core::types::{Frame, Probe};

use crate::detector::FaceDetector;
use crate::embedder::FaceEmbedder;
use crate::landmarks::LandmarkRefiner;
use crate::{models, VisionError};

/// ONNX-backed [`FaceAnalyzer`]: locate faces, refine landmarks and extract
/// an embedding for each, in one pass over the frame.
pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    landmarks: LandmarkRefiner,
    embedder: FaceEmbedder,
}

impl OnnxFaceAnalyzer {
    /// Verify model integrity and load all three sessions. Fail-fast: a
    /// missing or corrupt model aborts startup, never a run.
    pub fn load(model_dir: &Path) -> Result<Self, VisionError> {
        models::verify_models_dir(model_dir)?;

        let detector = FaceDetector::load(&model_dir.join("det_10g.onnx"))?;
        let landmarks = LandmarkRefiner::load(&model_dir.join("2d106det.onnx"))?;
        let embedder = FaceEmbedder::load(&model_dir.join("w600k_r50.onnx"))?;

        Ok(Self {
            detector,
            landmarks,
            embedder,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<Probe>, AnalyzerError> {
        let detections = self
            .detector
            .detect(frame)
            .map_err(|e| AnalyzerError(e.to_string()))?;

        tracing::debug!(faces = detections.len(), "located faces");

        let mut probes = Vec::with_capacity(detections.len());
        for detection in detections {
            let landmarks = self
                .landmarks
                .extract(frame, &detection.region)
                .map_err(|e| AnalyzerError(e.to_string()))?;
            let embedding = self
                .embedder
                .extract(frame, &detection.region)
                .map_err(|e| AnalyzerError(e.to_string()))?;

            probes.push(Probe {
                region: detection.region,
                embedding,
                landmarks,
            });
        }

        Ok(probes)
    }
}
