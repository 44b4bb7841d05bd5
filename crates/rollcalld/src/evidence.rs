use std::path::{Path, PathBuf};

use rollcall_core::engine::{EvidenceError, EvidenceStore};
use rollcall_core::types::Frame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvidenceVaultError {
    #[error("failed to create evidence directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes accepted frames as JPEG artifacts under a dedicated directory.
///
/// Filenames combine the identity, a one-second-resolution timestamp and a
/// random hex disambiguator, so two captures of the same identity within the
/// same second never collide.
pub struct EvidenceVault {
    dir: PathBuf,
}

impl EvidenceVault {
    pub fn open(dir: &Path) -> Result<Self, EvidenceVaultError> {
        std::fs::create_dir_all(dir).map_err(|source| EvidenceVaultError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    fn artifact_path(&self, identity: &str) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let suffix: u16 = rand::random();
        self.dir
            .join(format!("{}_{stamp}_{suffix:04x}.jpg", sanitize(identity)))
    }
}

impl EvidenceStore for EvidenceVault {
    fn save(&mut self, frame: &Frame, identity: &str) -> Result<PathBuf, EvidenceError> {
        let path = self.artifact_path(identity);

        let image =
            image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(
                || {
                    EvidenceError(format!(
                        "frame buffer does not match {}x{} RGB dimensions",
                        frame.width, frame.height
                    ))
                },
            )?;

        image
            .save(&path)
            .map_err(|e| EvidenceError(format!("failed to write {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), identity, "evidence snapshot written");
        Ok(path)
    }
}

/// Keep identities filesystem-safe: alphanumerics, dash and underscore pass
/// through, everything else becomes a dash.
fn sanitize(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
