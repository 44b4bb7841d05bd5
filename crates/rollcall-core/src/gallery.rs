//! Gallery of enrolled identities, loaded once at startup and immutable for
//! the process lifetime.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{Embedding, GalleryEntry};

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery file not found: {0} — run the enrollment tool first")]
    FileMissing(PathBuf),
    #[error("gallery contains no enrolled identities")]
    Empty,
    #[error("embedding dimension mismatch for '{label}': expected {expected}, got {got}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        got: usize,
    },
    #[error("failed to read gallery file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse gallery file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The set of enrolled (identity, embedding) pairs.
///
/// Non-empty and dimension-uniform by construction. Entries are ordered by
/// label, so nearest-neighbor tie-breaking is deterministic across runs.
#[derive(Debug, Clone)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
    dim: usize,
}

impl Gallery {
    /// Load a gallery from a JSON object mapping identity label to embedding
    /// vector. Fails if the file is missing, empty, or dimensionally ragged.
    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        if !path.exists() {
            return Err(GalleryError::FileMissing(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path)?;
        let map: BTreeMap<String, Vec<f32>> = serde_json::from_str(&raw)?;

        let entries = map
            .into_iter()
            .map(|(label, values)| GalleryEntry {
                label,
                embedding: Embedding::new(values),
            })
            .collect();

        Self::from_entries(entries)
    }

    /// Build a gallery from pre-loaded entries, enforcing the same invariants
    /// as [`load`](Self::load).
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Result<Self, GalleryError> {
        let Some(first) = entries.first() else {
            return Err(GalleryError::Empty);
        };

        let dim = first.embedding.dim();
        for entry in &entries {
            if entry.embedding.dim() != dim {
                return Err(GalleryError::DimensionMismatch {
                    label: entry.label.clone(),
                    expected: dim,
                    got: entry.embedding.dim(),
                });
            }
        }

        Ok(Self { entries, dim })
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Embedding dimension shared by every entry.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }
}
