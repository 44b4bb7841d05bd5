use rollcall_core::engine::{EngineError, MarkRequest, MarkingEngine, RunOutcome};
use rollcall_core::gallery::{Gallery, GalleryError};
use rollcall_hw::{Camera, CameraError};
use rollcall_vision::{OnnxFaceAnalyzer, VisionError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::evidence::{EvidenceVault, EvidenceVaultError};
use crate::store::{AttendanceStore, StoreSink};

#[derive(Error, Debug)]
pub enum EngineServiceError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("vision error: {0}")]
    Vision(#[from] VisionError),
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("evidence vault error: {0}")]
    Evidence(#[from] EvidenceVaultError),
    #[error("engine failure: {0}")]
    Run(#[from] EngineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Mark {
        request: MarkRequest,
        reply: oneshot::Sender<Result<RunOutcome, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run one verification session for the claimed identity.
    pub async fn mark(&self, request: MarkRequest) -> Result<RunOutcome, EngineServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Mark {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineServiceError::ChannelClosed)?;
        let outcome = reply_rx
            .await
            .map_err(|_| EngineServiceError::ChannelClosed)??;
        Ok(outcome)
    }
}

/// Spawn the decision engine on a dedicated OS thread.
///
/// Loads the gallery, verifies and loads the ONNX models, opens the camera
/// and discards warmup frames, then enters a request loop. Fails fast at
/// startup if any resource is unusable — a run never starts against a broken
/// gallery or model set.
pub fn spawn_engine(
    config: &Config,
    store: AttendanceStore,
    rt: tokio::runtime::Handle,
) -> Result<EngineHandle, EngineServiceError> {
    let gallery = Gallery::load(&config.gallery_path)?;
    tracing::info!(
        path = %config.gallery_path.display(),
        identities = gallery.len(),
        dim = gallery.dim(),
        "gallery loaded"
    );

    let analyzer = OnnxFaceAnalyzer::load(&config.model_dir)?;
    tracing::info!(dir = %config.model_dir.display(), "vision models loaded");

    let camera = Camera::open(&config.camera_device)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    // Discard warmup frames for camera AGC/AE stabilization
    if config.warmup_frames > 0 {
        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
        for _ in 0..config.warmup_frames {
            let _ = camera.capture_frame();
        }
    }

    let evidence = EvidenceVault::open(&config.evidence_dir)?;
    let sink = StoreSink::new(store, rt);

    let mut engine = MarkingEngine::new(
        camera,
        analyzer,
        evidence,
        sink,
        gallery,
        config.engine_config(),
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Mark { request, reply } => {
                        let mut observer = |success: bool, message: &str| {
                            tracing::info!(success, progress = message, "verification progress");
                        };
                        let result = engine.run(&request, Some(&mut observer));
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}
