use std::path::PathBuf;
use std::time::Duration;

use rollcall_core::engine::EngineConfig;
use rollcall_core::gate::DEFAULT_MIN_CONFIDENCE;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the JSON gallery of enrolled embeddings.
    pub gallery_path: PathBuf,
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Directory receiving evidence snapshots.
    pub evidence_dir: PathBuf,
    /// Minimum confidence (0–100) for accepting a match.
    pub min_confidence: u8,
    /// Attempt budget per verification run.
    pub max_retries: u32,
    /// Backoff after a low-confidence attempt, in milliseconds.
    pub retry_delay_ms: u64,
    /// Distance cutoff for treating a probe as a provisional match at all.
    pub match_tolerance: f32,
    /// Warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Whether the daemon serves on the session bus (development mode).
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_vision::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let gallery_path = std::env::var("ROLLCALL_GALLERY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("gallery.json"));

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let evidence_dir = std::env::var("ROLLCALL_EVIDENCE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("evidence"));

        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            gallery_path,
            db_path,
            evidence_dir,
            min_confidence: env_u8("ROLLCALL_MIN_CONFIDENCE", DEFAULT_MIN_CONFIDENCE),
            max_retries: env_u32("ROLLCALL_MAX_RETRIES", 3),
            retry_delay_ms: env_u64("ROLLCALL_RETRY_DELAY_MS", 1000),
            match_tolerance: env_f32("ROLLCALL_MATCH_TOLERANCE", 0.6),
            warmup_frames: env_usize("ROLLCALL_WARMUP_FRAMES", 4),
            session_bus: std::env::var("ROLLCALL_SESSION_BUS").is_ok(),
        }
    }

    /// Engine policy derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_retries: self.max_retries,
            min_confidence: self.min_confidence,
            match_tolerance: self.match_tolerance,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
