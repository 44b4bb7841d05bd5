use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A captured color camera frame, height × width × 3 interleaved RGB bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Expected byte length for the frame dimensions.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// Axis-aligned face region in source-frame pixel coordinates.
///
/// Edges follow the (top, right, bottom, left) convention of the locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// True when the region lies fully inside a frame of the given dimensions.
    pub fn within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.left < self.right
            && self.top < self.bottom
            && self.right <= frame_width
            && self.bottom <= frame_height
    }
}

/// Landmark group name for the left eye contour.
pub const LEFT_EYE: &str = "left_eye";
/// Landmark group name for the right eye contour.
pub const RIGHT_EYE: &str = "right_eye";

/// Named facial-landmark point groups (e.g. `left_eye`, `right_eye`, `nose`),
/// each a list of (x, y) points in source-frame coordinates.
#[derive(Debug, Clone, Default)]
pub struct Landmarks {
    groups: BTreeMap<String, Vec<(f32, f32)>>,
}

impl Landmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, points: Vec<(f32, f32)>) {
        self.groups.insert(name.into(), points);
    }

    pub fn group(&self, name: &str) -> Option<&[(f32, f32)]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Face embedding vector of fixed dimension D.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another embedding of the same dimension.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One enrolled identity: a unique label and its embedding.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub label: String,
    pub embedding: Embedding,
}

/// One detected face in one frame: bounding region, embedding produced from
/// the same crop, and the named landmark groups the locator reported.
#[derive(Debug, Clone)]
pub struct Probe {
    pub region: FaceRegion,
    pub embedding: Embedding,
    pub landmarks: Landmarks,
}

/// A decision to mark presence. Created at most once per engine run; ownership
/// passes to the attendance sink as soon as it is emitted.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub identity: String,
    pub display_name: String,
    pub session: Option<String>,
    pub evidence_path: PathBuf,
    pub confidence: u8,
    pub marked_at: DateTime<Utc>,
}
