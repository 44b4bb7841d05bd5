//! rollcall-core — identity verification and confidence-gated attendance decisions.
//!
//! Matches a probe face embedding against a gallery of enrolled identities,
//! converts the match distance into a 0–100 confidence score, validates pose
//! quality from facial landmarks, and drives a bounded retry protocol that
//! decides whether a presence is recorded.
//!
//! The crate is pure decision logic: cameras, inference runtimes and storage
//! enter only through the capability traits in [`engine`].

pub mod engine;
pub mod gallery;
pub mod gate;
pub mod matcher;
pub mod types;

pub use engine::{
    AnalyzerError, AttendanceSink, CaptureError, EngineConfig, EngineError, EvidenceError,
    EvidenceStore, FaceAnalyzer, FrameSource, MarkRequest, MarkingEngine, ProgressObserver,
    RunOutcome, SinkError, Verdict,
};
pub use gallery::{Gallery, GalleryError};
pub use gate::{ConfidenceGate, GateOutcome};
pub use matcher::{EuclideanMatcher, MatchError, MatchResult, Matcher};
pub use types::{AttendanceRecord, Embedding, FaceRegion, Frame, GalleryEntry, Landmarks, Probe};
