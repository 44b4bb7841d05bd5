//! Confidence scoring and pose validation for one matched probe.
//!
//! The matcher reports the best candidate unconditionally; this module owns
//! the accept/reject policy: does the best label equal the claimed identity,
//! is the face frontal enough to trust the measurement, and does the
//! distance-derived confidence clear the configured minimum.

use crate::matcher::MatchResult;
use crate::types::{Landmarks, Probe, LEFT_EYE, RIGHT_EYE};

/// Reference policy minimum confidence for accepting a match.
pub const DEFAULT_MIN_CONFIDENCE: u8 = 50;

/// Minimum number of points an eye contour must carry for the face to count
/// as frontal. Fewer points means the locator could not see the eye properly.
pub const MIN_EYE_POINTS: usize = 6;

/// Convert an embedding distance into a 0–100 confidence score.
///
/// `clamp(round((1 − distance) × 100), 0, 100)` — stays in range for any
/// distance, including distances above 1.
pub fn confidence_from_distance(distance: f32) -> u8 {
    ((1.0 - distance) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Outcome of gating one attempt. Terminal for the attempt, not the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Best label equals the claim and confidence clears the minimum.
    Accepted { confidence: u8 },
    /// Best label equals the claim but the measurement is too weak.
    RejectedLowConfidence { confidence: u8 },
    /// Eye landmarks missing or too sparse; the attempt is discarded without
    /// consuming the confidence budget.
    PoseInvalid,
    /// The best-matching identity is not the one being verified. A confident
    /// match for somebody else is still a rejection — this is claim
    /// verification, not open-set identification.
    NameMismatch { matched: String },
}

/// Confidence & pose gate with a configurable minimum score.
pub struct ConfidenceGate {
    min_confidence: u8,
}

impl ConfidenceGate {
    pub fn new(min_confidence: u8) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    /// Evaluate one matched probe against a claimed identity.
    ///
    /// Checks run in order: name, pose, confidence. A pose failure therefore
    /// masks the confidence verdict, never the other way around.
    pub fn evaluate(
        &self,
        probe: &Probe,
        best: &MatchResult,
        claimed_identity: &str,
    ) -> GateOutcome {
        if best.label != claimed_identity {
            return GateOutcome::NameMismatch {
                matched: best.label.clone(),
            };
        }

        if !frontal_pose(&probe.landmarks) {
            return GateOutcome::PoseInvalid;
        }

        let confidence = confidence_from_distance(best.distance);
        if confidence >= self.min_confidence {
            GateOutcome::Accepted { confidence }
        } else {
            GateOutcome::RejectedLowConfidence { confidence }
        }
    }
}

/// Both eye contours present with at least [`MIN_EYE_POINTS`] points each.
fn frontal_pose(landmarks: &Landmarks) -> bool {
    [LEFT_EYE, RIGHT_EYE].iter().all(|group| {
        landmarks
            .group(group)
            .is_some_and(|points| points.len() >= MIN_EYE_POINTS)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Embedding, FaceRegion};

    fn probe_with_eyes(left: usize, right: usize) -> Probe {
        let mut landmarks = Landmarks::new();
        if left > 0 {
            landmarks.insert(LEFT_EYE, vec![(1.0, 1.0); left]);
        }
        if right > 0 {
            landmarks.insert(RIGHT_EYE, vec![(2.0, 1.0); right]);
        }
        Probe {
            region: FaceRegion { top: 0, right: 10, bottom: 10, left: 0 },
            embedding: Embedding::new(vec![0.0; 4]),
            landmarks,
        }
    }

    fn best(label: &str, distance: f32) -> MatchResult {
        MatchResult { label: label.to_string(), distance }
    }

    #[test]
    fn test_confidence_formula() {
        assert_eq!(confidence_from_distance(0.0), 100);
        assert_eq!(confidence_from_distance(0.3), 70);
        assert_eq!(confidence_from_distance(0.5), 50);
        assert_eq!(confidence_from_distance(0.9), 10);
        assert_eq!(confidence_from_distance(1.0), 0);
    }

    #[test]
    fn test_confidence_clamped_for_any_distance() {
        assert_eq!(confidence_from_distance(2.5), 0);
        assert_eq!(confidence_from_distance(100.0), 0);
        assert_eq!(confidence_from_distance(-1.0), 100);
    }

    #[test]
    fn test_accepts_at_exact_threshold() {
        let gate = ConfidenceGate::new(DEFAULT_MIN_CONFIDENCE);
        let outcome = gate.evaluate(&probe_with_eyes(6, 6), &best("alice", 0.5), "alice");
        assert_eq!(outcome, GateOutcome::Accepted { confidence: 50 });
    }

    #[test]
    fn test_rejects_below_threshold() {
        let gate = ConfidenceGate::new(DEFAULT_MIN_CONFIDENCE);
        let outcome = gate.evaluate(&probe_with_eyes(6, 6), &best("alice", 0.9), "alice");
        assert_eq!(outcome, GateOutcome::RejectedLowConfidence { confidence: 10 });
    }

    #[test]
    fn test_name_mismatch_wins_over_everything() {
        let gate = ConfidenceGate::new(DEFAULT_MIN_CONFIDENCE);
        // Perfect distance, perfect pose — still rejected for the wrong name.
        let outcome = gate.evaluate(&probe_with_eyes(6, 6), &best("bob", 0.0), "alice");
        assert_eq!(outcome, GateOutcome::NameMismatch { matched: "bob".to_string() });
    }

    #[test]
    fn test_missing_eye_group_is_pose_invalid() {
        let gate = ConfidenceGate::new(DEFAULT_MIN_CONFIDENCE);
        let outcome = gate.evaluate(&probe_with_eyes(6, 0), &best("alice", 0.1), "alice");
        assert_eq!(outcome, GateOutcome::PoseInvalid);
    }

    #[test]
    fn test_sparse_eye_contour_is_pose_invalid() {
        let gate = ConfidenceGate::new(DEFAULT_MIN_CONFIDENCE);
        let outcome = gate.evaluate(&probe_with_eyes(5, 6), &best("alice", 0.1), "alice");
        assert_eq!(outcome, GateOutcome::PoseInvalid);
    }

    #[test]
    fn test_pose_checked_before_confidence() {
        let gate = ConfidenceGate::new(DEFAULT_MIN_CONFIDENCE);
        // Low confidence AND bad pose — pose wins, the confidence budget is
        // not consumed by this attempt.
        let outcome = gate.evaluate(&probe_with_eyes(0, 0), &best("alice", 0.9), "alice");
        assert_eq!(outcome, GateOutcome::PoseInvalid);
    }

    #[test]
    fn test_custom_threshold() {
        let gate = ConfidenceGate::new(80);
        let outcome = gate.evaluate(&probe_with_eyes(6, 6), &best("alice", 0.3), "alice");
        assert_eq!(outcome, GateOutcome::RejectedLowConfidence { confidence: 70 });
    }
}
