use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Axis-aligned face bounding box in pixel coordinates of the enhanced image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersect the box with an `image_width` × `image_height` canvas.
    ///
    /// Returns `None` when the clamped region has zero area.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Option<BoundingBox> {
        let x = self.x.min(image_width);
        let y = self.y.min(image_height);
        let width = self.width.min(image_width - x);
        let height = self.height.min(image_height - y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(BoundingBox {
            x,
            y,
            width,
            height,
        })
    }

    /// Intersection-over-Union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2.saturating_sub(x1) as u64) * (y2.saturating_sub(y1) as u64);
        let union = self.area() + other.area() - inter;

        if union > 0 {
            inter as f32 / union as f32
        } else {
            0.0
        }
    }
}

/// One candidate face from a detection strategy.
///
/// `confidence` is present for learned detectors and absent for the
/// geometric heuristics, which are pass/fail.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: Option<f32>,
}

/// Terminal result of the detection fallback chain.
#[derive(Debug, Clone)]
pub enum DetectionResult {
    Found {
        bbox: BoundingBox,
        /// Name of the strategy that produced the box (e.g. "geometric-strict").
        detector: &'static str,
        confidence: Option<f32>,
    },
    NotFound,
}

/// A stored facial signature: one record per external identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEmbedding {
    pub identity_key: String,
    /// Unit-norm descriptor vector of length `dim`.
    pub vector: Vec<f32>,
    pub dim: usize,
    /// Content reference for the enrollment upload (e.g. "sha256:<hex>").
    /// Kept for audit and debugging, never used in matching.
    pub source_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Summary row for listings; omits the vector payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSummary {
    pub identity_key: String,
    pub dim: usize,
    pub source_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of comparing a query vector against the full gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    Matched {
        identity_key: String,
        /// Cosine similarity of the accepted match, in [-1, 1].
        similarity: f32,
    },
    NoMatch {
        /// Best similarity seen, `None` when the gallery was empty.
        best_similarity: Option<f32>,
    },
}

/// Decision returned by the verification service.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Verified {
        identity_key: String,
        similarity: f32,
    },
    /// A valid negative outcome, distinct from any error.
    NoMatch { best_similarity: Option<f32> },
}

/// Decision returned by the enrollment service.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollOutcome {
    pub identity_key: String,
    /// True when a prior embedding for this key was overwritten.
    pub was_update: bool,
    pub source_ref: String,
}
