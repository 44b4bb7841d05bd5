//! Nearest-neighbor search of a probe embedding against the gallery.

use thiserror::Error;

use crate::types::{Embedding, GalleryEntry};

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("cannot match against an empty gallery")]
    EmptyGallery,
    #[error("embedding dimension mismatch: probe has {probe}, gallery has {gallery}")]
    DimensionMismatch { probe: usize, gallery: usize },
}

/// Best gallery candidate for a probe: the arg-min label and its raw distance.
///
/// No thresholding happens here — accept/reject policy belongs to the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub label: String,
    pub distance: f32,
}

/// Strategy for finding the closest enrolled identity to a probe embedding.
pub trait Matcher {
    fn nearest(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
    ) -> Result<MatchResult, MatchError>;
}

/// Euclidean-distance matcher. Scans every entry; ties break to the
/// first-encountered index, so output is exactly reproducible for fixed input.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn nearest(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
    ) -> Result<MatchResult, MatchError> {
        let Some(first) = gallery.first() else {
            return Err(MatchError::EmptyGallery);
        };
        if probe.dim() != first.embedding.dim() {
            return Err(MatchError::DimensionMismatch {
                probe: probe.dim(),
                gallery: first.embedding.dim(),
            });
        }

        let mut best_idx = 0usize;
        let mut best_distance = f32::INFINITY;
        for (i, entry) in gallery.iter().enumerate() {
            let distance = probe.euclidean_distance(&entry.embedding);
            if distance < best_distance {
                best_distance = distance;
                best_idx = i;
            }
        }

        Ok(MatchResult {
            label: gallery[best_idx].label.clone(),
            distance: best_distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, values: Vec<f32>) -> GalleryEntry {
        GalleryEntry {
            label: label.to_string(),
            embedding: Embedding::new(values),
        }
    }

    #[test]
    fn test_exact_match_has_zero_distance() {
        let gallery = vec![entry("alice", vec![0.1, 0.2, 0.3])];
        let probe = Embedding::new(vec![0.1, 0.2, 0.3]);
        let result = EuclideanMatcher.nearest(&probe, &gallery).unwrap();
        assert_eq!(result.label, "alice");
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn test_selects_strictly_closest_entry() {
        let gallery = vec![
            entry("alice", vec![1.0, 0.0]),
            entry("bob", vec![0.0, 1.0]),
            entry("carol", vec![0.1, 0.1]),
        ];
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.nearest(&probe, &gallery).unwrap();
        assert_eq!(result.label, "carol");
    }

    #[test]
    fn test_tie_breaks_to_first_encountered() {
        let gallery = vec![
            entry("alice", vec![1.0, 0.0]),
            entry("bob", vec![-1.0, 0.0]),
        ];
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.nearest(&probe, &gallery).unwrap();
        assert_eq!(result.label, "alice");
    }

    #[test]
    fn test_empty_gallery_is_an_error() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let err = EuclideanMatcher.nearest(&probe, &[]).unwrap_err();
        assert!(matches!(err, MatchError::EmptyGallery));
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let gallery = vec![entry("alice", vec![1.0, 0.0, 0.0])];
        let probe = Embedding::new(vec![0.0, 0.0]);
        let err = EuclideanMatcher.nearest(&probe, &gallery).unwrap_err();
        assert!(matches!(
            err,
            MatchError::DimensionMismatch { probe: 2, gallery: 3 }
        ));
    }

    #[test]
    fn test_deterministic_for_fixed_input() {
        let gallery = vec![
            entry("alice", vec![0.4, 0.1]),
            entry("bob", vec![0.3, 0.2]),
        ];
        let probe = Embedding::new(vec![0.35, 0.15]);
        let a = EuclideanMatcher.nearest(&probe, &gallery).unwrap();
        let b = EuclideanMatcher.nearest(&probe, &gallery).unwrap();
        assert_eq!(a, b);
    }
}
