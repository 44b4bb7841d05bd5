//! Bounded-retry decision engine: capture → locate → match → gate, up to a
//! configured number of attempts, ending in exactly one terminal outcome.
//!
//! The engine performs blocking frame reads and a deliberate inter-attempt
//! delay, so callers run it on a dedicated thread away from any preview
//! rendering. Retry state lives in the run, never in process globals, so
//! concurrent runs against separate frame sources cannot corrupt each other.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::gallery::Gallery;
use crate::gate::{ConfidenceGate, GateOutcome, DEFAULT_MIN_CONFIDENCE};
use crate::matcher::{EuclideanMatcher, MatchError, MatchResult, Matcher};
use crate::types::{AttendanceRecord, Frame, Probe};

// ── Capability traits ────────────────────────────────────────────────────────

#[derive(Error, Debug)]
#[error("frame capture failed: {0}")]
pub struct CaptureError(pub String);

#[derive(Error, Debug)]
#[error("face analysis failed: {0}")]
pub struct AnalyzerError(pub String);

#[derive(Error, Debug)]
#[error("evidence capture failed: {0}")]
pub struct EvidenceError(pub String);

#[derive(Error, Debug)]
#[error("attendance sink failed: {0}")]
pub struct SinkError(pub String);

/// Supplies successive raw frames on demand. A read error is fatal for the
/// run — a dead camera will not self-heal inside the retry loop.
pub trait FrameSource {
    fn is_open(&self) -> bool;
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Locates faces in a frame and produces, for each, a bounding region, an
/// embedding from the same crop, and named landmark groups.
pub trait FaceAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<Probe>, AnalyzerError>;
}

/// Persists the accepted frame as an image artifact and returns its path.
pub trait EvidenceStore {
    fn save(&mut self, frame: &Frame, identity: &str) -> Result<PathBuf, EvidenceError>;
}

/// Durably records one attendance event. The engine emits at most one record
/// per run and does not retain it afterwards.
pub trait AttendanceSink {
    fn mark(&mut self, record: &AttendanceRecord) -> Result<(), SinkError>;
}

/// Fire-and-forget progress notifications, decoupled from any presentation
/// technology. Implemented for plain closures so the engine stays usable
/// headlessly.
pub trait ProgressObserver {
    fn notify(&mut self, success: bool, message: &str);
}

impl<F: FnMut(bool, &str)> ProgressObserver for F {
    fn notify(&mut self, success: bool, message: &str) {
        self(success, message)
    }
}

// ── Engine configuration and outcome ─────────────────────────────────────────

/// Per-run policy knobs. Defaults mirror the reference policy.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attempt budget per run.
    pub max_retries: u32,
    /// Minimum confidence for accepting a match.
    pub min_confidence: u8,
    /// Distance cutoff for treating a probe's best match as a provisional
    /// label at all; beyond it the probe is nobody in the gallery.
    pub match_tolerance: f32,
    /// Backoff after a low-confidence rejection, giving the subject time to
    /// reposition. Pose failures and no-match frames skip it.
    pub retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            match_tolerance: 0.6,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// One verification request: the identity being claimed and the context the
/// attendance record should carry.
#[derive(Debug, Clone)]
pub struct MarkRequest {
    pub identity: String,
    pub display_name: String,
    pub session: Option<String>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Accepted; attendance recorded.
    Marked { confidence: u8, attempt: u32 },
    /// Final attempt matched the claim but stayed under the minimum.
    LowConfidence { confidence: u8, min_confidence: u8 },
    /// Budget exhausted without any accepted evaluation.
    NotRecognized,
    /// Frame source closed or unreadable; terminated without retry.
    CaptureFailed,
}

/// Terminal result of a run. `message` is human-readable and embeds the
/// numeric confidence and attempt number where applicable.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub message: String,
    pub verdict: Verdict,
}

impl RunOutcome {
    fn capture_failed(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            verdict: Verdict::CaptureFailed,
        }
    }
}

/// Infrastructure failures the caller may surface. Recognition failures are
/// never errors — they come back inside [`RunOutcome`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Evidence(#[from] EvidenceError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Drives up to `max_retries` capture/match/gate attempts for one claimed
/// identity and records attendance on acceptance.
pub struct MarkingEngine<S, A, E, K> {
    source: S,
    analyzer: A,
    evidence: E,
    sink: K,
    gallery: Gallery,
    matcher: EuclideanMatcher,
    gate: ConfidenceGate,
    config: EngineConfig,
}

impl<S, A, E, K> MarkingEngine<S, A, E, K>
where
    S: FrameSource,
    A: FaceAnalyzer,
    E: EvidenceStore,
    K: AttendanceSink,
{
    pub fn new(
        source: S,
        analyzer: A,
        evidence: E,
        sink: K,
        gallery: Gallery,
        config: EngineConfig,
    ) -> Self {
        let gate = ConfidenceGate::new(config.min_confidence);
        Self {
            source,
            analyzer,
            evidence,
            sink,
            gallery,
            matcher: EuclideanMatcher,
            gate,
            config,
        }
    }

    /// Run one bounded verification session for the claimed identity.
    pub fn run(
        &mut self,
        request: &MarkRequest,
        mut observer: Option<&mut dyn ProgressObserver>,
    ) -> Result<RunOutcome, EngineError> {
        if !self.source.is_open() {
            tracing::warn!(identity = %request.identity, "frame source not open; aborting run");
            return Ok(finish(
                &mut observer,
                RunOutcome::capture_failed("Camera not started. Contact an administrator."),
            ));
        }

        let max = self.config.max_retries;

        for attempt in 1..=max {
            let frame = match self.source.read_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "frame acquisition failed; aborting run");
                    return Ok(finish(
                        &mut observer,
                        RunOutcome::capture_failed(
                            "Failed to capture a frame from the camera. Contact an administrator.",
                        ),
                    ));
                }
            };

            tracing::debug!(attempt, width = frame.width, height = frame.height, "captured frame");

            let probes = self.analyzer.analyze(&frame)?;
            let Some((probe, best)) = self.candidate_for(&probes, &request.identity)? else {
                tracing::debug!(
                    attempt,
                    probes = probes.len(),
                    identity = %request.identity,
                    "no probe matched the claimed identity in this frame"
                );
                continue;
            };

            match self.gate.evaluate(probe, &best, &request.identity) {
                GateOutcome::Accepted { confidence } => {
                    let evidence_path = self.evidence.save(&frame, &request.identity)?;
                    let record = AttendanceRecord {
                        identity: request.identity.clone(),
                        display_name: request.display_name.clone(),
                        session: request.session.clone(),
                        evidence_path,
                        confidence,
                        marked_at: chrono::Utc::now(),
                    };
                    self.sink.mark(&record)?;

                    tracing::info!(
                        identity = %request.identity,
                        confidence,
                        attempt,
                        evidence = %record.evidence_path.display(),
                        "attendance marked"
                    );
                    let message = format!(
                        "Attendance marked for {} (confidence {confidence}%, attempt {attempt}).",
                        request.display_name
                    );
                    return Ok(finish(
                        &mut observer,
                        RunOutcome {
                            success: true,
                            message,
                            verdict: Verdict::Marked { confidence, attempt },
                        },
                    ));
                }
                GateOutcome::PoseInvalid => {
                    // Discarded without the low-confidence backoff.
                    let message = format!(
                        "Face not frontal enough (attempt {attempt}/{max}). \
                         Adjust your position and look at the camera."
                    );
                    tracing::debug!(attempt, "pose invalid");
                    notify(&mut observer, false, &message);
                }
                GateOutcome::RejectedLowConfidence { confidence } => {
                    if attempt < max {
                        let message = format!(
                            "Confidence too low ({confidence}%). Retrying ({}/{max})...",
                            attempt + 1
                        );
                        tracing::debug!(attempt, confidence, "low confidence; backing off");
                        notify(&mut observer, false, &message);
                        std::thread::sleep(self.config.retry_delay);
                    } else {
                        let min = self.gate.min_confidence();
                        let message = format!(
                            "Face recognized but confidence too low ({confidence}%). \
                             Minimum required: {min}%. No more retries."
                        );
                        return Ok(finish(
                            &mut observer,
                            RunOutcome {
                                success: false,
                                message,
                                verdict: Verdict::LowConfidence {
                                    confidence,
                                    min_confidence: min,
                                },
                            },
                        ));
                    }
                }
                GateOutcome::NameMismatch { matched } => {
                    // Candidate selection already filters by label; reaching
                    // here means the frame carries nothing usable for this
                    // claim. Consumes the attempt like a no-match frame.
                    tracing::debug!(attempt, matched = %matched, "best match is not the claimed identity");
                }
            }
        }

        Ok(finish(
            &mut observer,
            RunOutcome {
                success: false,
                message: "Face not recognized after maximum retries.".to_string(),
                verdict: Verdict::NotRecognized,
            },
        ))
    }

    /// One nearest-neighbor pass per probe, returning the first probe whose
    /// best label equals the claim within the provisional-label tolerance.
    fn candidate_for<'p>(
        &self,
        probes: &'p [Probe],
        claimed_identity: &str,
    ) -> Result<Option<(&'p Probe, MatchResult)>, MatchError> {
        for probe in probes {
            let best = self.matcher.nearest(&probe.embedding, self.gallery.entries())?;
            if best.label == claimed_identity && best.distance < self.config.match_tolerance {
                return Ok(Some((probe, best)));
            }
        }
        Ok(None)
    }
}

fn notify(observer: &mut Option<&mut dyn ProgressObserver>, success: bool, message: &str) {
    if let Some(obs) = observer.as_mut() {
        obs.notify(success, message);
    }
}

fn finish(observer: &mut Option<&mut dyn ProgressObserver>, outcome: RunOutcome) -> RunOutcome {
    notify(observer, outcome.success, &outcome.message);
    outcome
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Embedding, FaceRegion, GalleryEntry, Landmarks, LEFT_EYE, RIGHT_EYE};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    const DIM: usize = 4;

    fn frame() -> Frame {
        Frame { data: vec![0u8; 2 * 2 * 3], width: 2, height: 2 }
    }

    fn gallery_of(entries: &[(&str, [f32; DIM])]) -> Gallery {
        Gallery::from_entries(
            entries
                .iter()
                .map(|(label, values)| GalleryEntry {
                    label: label.to_string(),
                    embedding: Embedding::new(values.to_vec()),
                })
                .collect(),
        )
        .unwrap()
    }

    /// Probe at the given distance from the origin along the first axis,
    /// with or without usable eye contours.
    fn probe_at(distance: f32, frontal: bool) -> Probe {
        let mut values = vec![0.0; DIM];
        values[0] = distance;
        let mut landmarks = Landmarks::new();
        if frontal {
            landmarks.insert(LEFT_EYE, vec![(10.0, 10.0); 6]);
            landmarks.insert(RIGHT_EYE, vec![(20.0, 10.0); 6]);
        }
        Probe {
            region: FaceRegion { top: 0, right: 2, bottom: 2, left: 0 },
            embedding: Embedding::new(values),
            landmarks,
        }
    }

    struct ScriptedSource {
        open: bool,
        frames: VecDeque<Result<Frame, CaptureError>>,
        reads: Rc<Cell<usize>>,
    }

    impl ScriptedSource {
        fn frames(count: usize, reads: Rc<Cell<usize>>) -> Self {
            Self {
                open: true,
                frames: (0..count).map(|_| Ok(frame())).collect(),
                reads,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn is_open(&self) -> bool {
            self.open
        }

        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            self.reads.set(self.reads.get() + 1);
            self.frames
                .pop_front()
                .unwrap_or_else(|| Err(CaptureError("script exhausted".to_string())))
        }
    }

    /// Returns one scripted probe set per analyzed frame, empty once the
    /// script runs out.
    struct ScriptedAnalyzer {
        per_frame: VecDeque<Vec<Probe>>,
    }

    impl ScriptedAnalyzer {
        fn new(per_frame: Vec<Vec<Probe>>) -> Self {
            Self { per_frame: per_frame.into() }
        }

        fn repeating(probes: Vec<Probe>, count: usize) -> Self {
            Self::new((0..count).map(|_| probes.clone()).collect())
        }
    }

    impl FaceAnalyzer for ScriptedAnalyzer {
        fn analyze(&mut self, _frame: &Frame) -> Result<Vec<Probe>, AnalyzerError> {
            Ok(self.per_frame.pop_front().unwrap_or_default())
        }
    }

    struct CountingEvidence {
        saves: Rc<Cell<usize>>,
    }

    impl EvidenceStore for CountingEvidence {
        fn save(&mut self, _frame: &Frame, identity: &str) -> Result<PathBuf, EvidenceError> {
            let n = self.saves.get() + 1;
            self.saves.set(n);
            Ok(PathBuf::from(format!("/tmp/{identity}-{n}.jpg")))
        }
    }

    struct RecordingSink {
        records: Rc<RefCell<Vec<AttendanceRecord>>>,
    }

    impl AttendanceSink for RecordingSink {
        fn mark(&mut self, record: &AttendanceRecord) -> Result<(), SinkError> {
            self.records.borrow_mut().push(record.clone());
            Ok(())
        }
    }

    struct Harness {
        reads: Rc<Cell<usize>>,
        saves: Rc<Cell<usize>>,
        records: Rc<RefCell<Vec<AttendanceRecord>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                reads: Rc::new(Cell::new(0)),
                saves: Rc::new(Cell::new(0)),
                records: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn engine(
            &self,
            source: ScriptedSource,
            analyzer: ScriptedAnalyzer,
            gallery: Gallery,
        ) -> MarkingEngine<ScriptedSource, ScriptedAnalyzer, CountingEvidence, RecordingSink> {
            let config = EngineConfig { retry_delay: Duration::ZERO, ..EngineConfig::default() };
            MarkingEngine::new(
                source,
                analyzer,
                CountingEvidence { saves: self.saves.clone() },
                RecordingSink { records: self.records.clone() },
                gallery,
                config,
            )
        }
    }

    fn request() -> MarkRequest {
        MarkRequest {
            identity: "alice".to_string(),
            display_name: "Alice Moreau".to_string(),
            session: Some("morning".to_string()),
        }
    }

    #[test]
    fn test_accepts_on_first_attempt_with_confidence_in_message() {
        let h = Harness::new();
        let gallery = gallery_of(&[("alice", [0.0; DIM])]);
        let source = ScriptedSource::frames(3, h.reads.clone());
        // Distance 0.3 from alice → confidence 70.
        let analyzer = ScriptedAnalyzer::repeating(vec![probe_at(0.3, true)], 3);
        let mut engine = h.engine(source, analyzer, gallery);

        let outcome = engine.run(&request(), None).unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.verdict, Verdict::Marked { confidence: 70, attempt: 1 });
        assert!(outcome.message.contains("70"), "message: {}", outcome.message);
        assert!(outcome.message.contains('1'), "message: {}", outcome.message);
        assert_eq!(h.reads.get(), 1);
        assert_eq!(h.saves.get(), 1);

        let records = h.records.borrow();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity, "alice");
        assert_eq!(records[0].confidence, 70);
        assert_eq!(records[0].session.as_deref(), Some("morning"));
    }

    #[test]
    fn test_low_confidence_exhausts_full_budget() {
        let h = Harness::new();
        let gallery = gallery_of(&[("alice", [0.0; DIM])]);
        let source = ScriptedSource::frames(3, h.reads.clone());
        // Distance 0.9 → confidence 10, below the default 50, every attempt.
        let analyzer = ScriptedAnalyzer::repeating(vec![probe_at(0.9, true)], 3);
        let mut engine = h.engine(source, analyzer, gallery);

        let mut progress: Vec<(bool, String)> = Vec::new();
        let mut observer = |success: bool, message: &str| {
            progress.push((success, message.to_string()));
        };
        let outcome = engine.run(&request(), Some(&mut observer)).unwrap();

        assert!(!outcome.success);
        assert_eq!(
            outcome.verdict,
            Verdict::LowConfidence { confidence: 10, min_confidence: 50 }
        );
        assert!(outcome.message.contains("50"), "message: {}", outcome.message);
        assert!(outcome.message.contains("No more retries"), "message: {}", outcome.message);
        assert_eq!(h.reads.get(), 3);
        assert_eq!(h.saves.get(), 0);
        assert!(h.records.borrow().is_empty());

        // Two retry notifications plus the terminal one.
        assert_eq!(progress.len(), 3);
        assert!(progress[0].1.contains("Retrying"));
        assert!(progress[1].1.contains("Retrying"));
        assert_eq!(progress[2].1, outcome.message);
    }

    #[test]
    fn test_pose_invalid_then_threshold_accept_on_attempt_two() {
        let h = Harness::new();
        let gallery = gallery_of(&[("alice", [0.0; DIM])]);
        let source = ScriptedSource::frames(3, h.reads.clone());
        // Attempt 1: landmarks unusable. Attempt 2: distance 0.5 → exactly 50.
        let analyzer = ScriptedAnalyzer::new(vec![
            vec![probe_at(0.2, false)],
            vec![probe_at(0.5, true)],
        ]);
        let mut engine = h.engine(source, analyzer, gallery);

        let mut progress: Vec<(bool, String)> = Vec::new();
        let mut observer = |success: bool, message: &str| {
            progress.push((success, message.to_string()));
        };
        let outcome = engine.run(&request(), Some(&mut observer)).unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.verdict, Verdict::Marked { confidence: 50, attempt: 2 });
        assert_eq!(h.reads.get(), 2);
        assert_eq!(h.saves.get(), 1);
        assert_eq!(h.records.borrow().len(), 1);

        // The pose failure notifies guidance but never a low-confidence retry.
        assert!(progress[0].1.contains("not frontal"), "got: {}", progress[0].1);
        assert!(progress.iter().all(|(_, m)| !m.contains("Retrying")));
    }

    #[test]
    fn test_never_matching_runs_exactly_max_retries() {
        let h = Harness::new();
        let gallery = gallery_of(&[("alice", [0.0; DIM])]);
        let source = ScriptedSource::frames(5, h.reads.clone());
        // No faces at all in any frame.
        let analyzer = ScriptedAnalyzer::repeating(vec![], 5);
        let mut engine = h.engine(source, analyzer, gallery);

        let outcome = engine.run(&request(), None).unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.verdict, Verdict::NotRecognized);
        assert_eq!(outcome.message, "Face not recognized after maximum retries.");
        // Exactly the budget: never fewer, never more.
        assert_eq!(h.reads.get(), 3);
        assert_eq!(h.saves.get(), 0);
    }

    #[test]
    fn test_other_identity_is_never_marked() {
        let h = Harness::new();
        let gallery = gallery_of(&[("alice", [0.0; DIM]), ("bob", [1.0, 0.0, 0.0, 0.0])]);
        let source = ScriptedSource::frames(3, h.reads.clone());
        // The face in frame is a perfect match for bob, not alice.
        let analyzer = ScriptedAnalyzer::repeating(vec![probe_at(1.0, true)], 3);
        let mut engine = h.engine(source, analyzer, gallery);

        let outcome = engine.run(&request(), None).unwrap();

        assert_eq!(outcome.verdict, Verdict::NotRecognized);
        assert_eq!(h.saves.get(), 0);
        assert!(h.records.borrow().is_empty());
    }

    #[test]
    fn test_match_outside_tolerance_is_not_a_candidate() {
        let h = Harness::new();
        let gallery = gallery_of(&[("alice", [0.0; DIM])]);
        let source = ScriptedSource::frames(3, h.reads.clone());
        // Best label is alice but the distance (0.7) exceeds the 0.6
        // provisional-label tolerance — treated as nobody, not low confidence.
        let analyzer = ScriptedAnalyzer::repeating(vec![probe_at(0.7, true)], 3);
        let mut engine = h.engine(source, analyzer, gallery);

        let mut progress: Vec<(bool, String)> = Vec::new();
        let mut observer = |success: bool, message: &str| {
            progress.push((success, message.to_string()));
        };
        let outcome = engine.run(&request(), Some(&mut observer)).unwrap();

        assert_eq!(outcome.verdict, Verdict::NotRecognized);
        assert!(progress.iter().all(|(_, m)| !m.contains("Retrying")));
    }

    #[test]
    fn test_capture_failure_on_first_attempt_is_terminal() {
        let h = Harness::new();
        let gallery = gallery_of(&[("alice", [0.0; DIM])]);
        let source = ScriptedSource {
            open: true,
            frames: VecDeque::from([Err(CaptureError("device unplugged".to_string()))]),
            reads: h.reads.clone(),
        };
        let analyzer = ScriptedAnalyzer::repeating(vec![probe_at(0.0, true)], 3);
        let mut engine = h.engine(source, analyzer, gallery);

        let outcome = engine.run(&request(), None).unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.verdict, Verdict::CaptureFailed);
        assert!(outcome.message.contains("capture"), "message: {}", outcome.message);
        // No second attempt after a capture failure.
        assert_eq!(h.reads.get(), 1);
    }

    #[test]
    fn test_closed_source_fails_before_any_read() {
        let h = Harness::new();
        let gallery = gallery_of(&[("alice", [0.0; DIM])]);
        let mut source = ScriptedSource::frames(3, h.reads.clone());
        source.open = false;
        let analyzer = ScriptedAnalyzer::repeating(vec![probe_at(0.0, true)], 3);
        let mut engine = h.engine(source, analyzer, gallery);

        let outcome = engine.run(&request(), None).unwrap();

        assert_eq!(outcome.verdict, Verdict::CaptureFailed);
        assert!(outcome.message.contains("not started"), "message: {}", outcome.message);
        assert_eq!(h.reads.get(), 0);
    }

    #[test]
    fn test_terminal_outcome_reaches_observer() {
        let h = Harness::new();
        let gallery = gallery_of(&[("alice", [0.0; DIM])]);
        let source = ScriptedSource::frames(1, h.reads.clone());
        let analyzer = ScriptedAnalyzer::repeating(vec![probe_at(0.3, true)], 1);
        let mut engine = h.engine(source, analyzer, gallery);

        let mut seen: Vec<(bool, String)> = Vec::new();
        let mut observer = |success: bool, message: &str| {
            seen.push((success, message.to_string()));
        };
        let outcome = engine.run(&request(), Some(&mut observer)).unwrap();

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, outcome.success);
        assert_eq!(seen[0].1, outcome.message);
    }
}
