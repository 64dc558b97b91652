//! Face location: an ordered fallback chain of detection strategies.
//!
//! The chain is tried strictly in order; the first stage that yields at
//! least one candidate terminates it. A learned detector (when its
//! model loaded at startup) runs first, then three geometric passes
//! with progressively relaxed parameters, mirroring the degradation
//! ladder strong-model → cheap heuristic.
//!
//! The geometric detector is a Haar-like sliding-window heuristic over
//! an integral image: a window qualifies when its interior outshines
//! the surrounding ring, its eye band is darker than its cheek band,
//! and it is left/right symmetric. Qualifying windows are grouped by
//! overlap and a group must reach the parameter set's support count.

use image::RgbImage;

use crate::enhance::luma_plane;
use crate::types::{BoundingBox, Detection, DetectionResult};

/// One stage of the fallback chain.
pub trait DetectStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    /// All candidate faces this strategy finds, unranked.
    fn detect(&self, image: &RgbImage) -> Vec<Detection>;
}

/// Parameter set for one geometric pass.
#[derive(Debug, Clone, Copy)]
pub struct GeometricParams {
    pub name: &'static str,
    /// Multiplicative window growth between scan scales.
    pub scale_factor: f32,
    /// Minimum number of overlapping qualifying windows for a face.
    pub min_neighbors: usize,
    /// Smallest window side length scanned, in pixels.
    pub min_size: u32,
}

impl GeometricParams {
    pub fn strict() -> Self {
        Self {
            name: "geometric-strict",
            scale_factor: 1.10,
            min_neighbors: 4,
            min_size: 40,
        }
    }

    pub fn relaxed() -> Self {
        Self {
            name: "geometric-relaxed",
            scale_factor: 1.05,
            min_neighbors: 3,
            min_size: 30,
        }
    }

    pub fn very_relaxed() -> Self {
        Self {
            name: "geometric-very-relaxed",
            scale_factor: 1.03,
            min_neighbors: 2,
            min_size: 20,
        }
    }
}

// Window qualification thresholds, on 0–255 luminance means.
const INTERIOR_INSET_FRAC: f32 = 0.15;
const RING_CONTRAST_MIN: f32 = 12.0;
const EYE_CHEEK_CONTRAST_MIN: f32 = 6.0;
const SYMMETRY_MAX_DELTA: f32 = 24.0;
const EYE_BAND: (f32, f32) = (0.25, 0.40);
const CHEEK_BAND: (f32, f32) = (0.45, 0.65);
const BAND_X_INSET_FRAC: f32 = 0.18;
const GROUP_IOU_MIN: f32 = 0.3;

pub struct GeometricDetector {
    params: GeometricParams,
}

impl GeometricDetector {
    pub fn new(params: GeometricParams) -> Self {
        Self { params }
    }
}

impl DetectStrategy for GeometricDetector {
    fn name(&self) -> &'static str {
        self.params.name
    }

    fn detect(&self, image: &RgbImage) -> Vec<Detection> {
        let (width, height) = (image.width(), image.height());
        let max_window = width.min(height);
        if max_window < self.params.min_size {
            return Vec::new();
        }

        let integral = IntegralImage::new(&luma_plane(image), width, height);
        let mut groups: Vec<WindowGroup> = Vec::new();

        let mut size = self.params.min_size;
        while size <= max_window {
            let step = (size / 10).max(2);
            let mut y = 0;
            while y + size <= height {
                let mut x = 0;
                while x + size <= width {
                    if window_qualifies(&integral, x, y, size) {
                        accumulate(&mut groups, BoundingBox::new(x, y, size, size));
                    }
                    x += step;
                }
                y += step;
            }
            // Guarantee progress even when the factor rounds to the same size.
            size = ((size as f32 * self.params.scale_factor).round() as u32).max(size + 1);
        }

        groups
            .into_iter()
            .filter(|g| g.count >= self.params.min_neighbors)
            .map(|g| Detection {
                bbox: g.average(),
                confidence: None,
            })
            .collect()
    }
}

/// Summed-area table with an O(1) rectangle mean.
struct IntegralImage {
    sums: Vec<u64>,
    width: u32,
}

impl IntegralImage {
    fn new(luma: &[u8], width: u32, height: u32) -> Self {
        let w = width as usize;
        let mut sums = vec![0u64; (w + 1) * (height as usize + 1)];
        for y in 0..height as usize {
            let mut row = 0u64;
            for x in 0..w {
                row += luma[y * w + x] as u64;
                sums[(y + 1) * (w + 1) + x + 1] = sums[y * (w + 1) + x + 1] + row;
            }
        }
        Self { sums, width }
    }

    /// Sum over `[x0, x1) × [y0, y1)`.
    fn sum(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> u64 {
        let w = self.width as usize + 1;
        let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize, y1 as usize);
        self.sums[y1 * w + x1] + self.sums[y0 * w + x0]
            - self.sums[y0 * w + x1]
            - self.sums[y1 * w + x0]
    }

    fn mean(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> f32 {
        let area = (x1 - x0) as u64 * (y1 - y0) as u64;
        if area == 0 {
            return 0.0;
        }
        self.sum(x0, y0, x1, y1) as f32 / area as f32
    }
}

fn window_qualifies(integral: &IntegralImage, x: u32, y: u32, size: u32) -> bool {
    let inset = ((size as f32 * INTERIOR_INSET_FRAC) as u32).max(1);
    if size <= 2 * inset {
        return false;
    }

    let (ix0, iy0) = (x + inset, y + inset);
    let (ix1, iy1) = (x + size - inset, y + size - inset);

    // 1. Interior brighter than the surrounding ring.
    let window_sum = integral.sum(x, y, x + size, y + size);
    let interior_sum = integral.sum(ix0, iy0, ix1, iy1);
    let interior_area = ((ix1 - ix0) * (iy1 - iy0)) as u64;
    let ring_area = (size as u64 * size as u64) - interior_area;
    if ring_area == 0 {
        return false;
    }
    let interior_mean = interior_sum as f32 / interior_area as f32;
    let ring_mean = (window_sum - interior_sum) as f32 / ring_area as f32;
    if interior_mean < ring_mean + RING_CONTRAST_MIN {
        return false;
    }

    // 2. Eye band darker than cheek band.
    let band_x0 = x + (size as f32 * BAND_X_INSET_FRAC) as u32;
    let band_x1 = x + size - (size as f32 * BAND_X_INSET_FRAC) as u32;
    let eye_y0 = y + (size as f32 * EYE_BAND.0) as u32;
    let eye_y1 = y + (size as f32 * EYE_BAND.1) as u32;
    let cheek_y0 = y + (size as f32 * CHEEK_BAND.0) as u32;
    let cheek_y1 = y + (size as f32 * CHEEK_BAND.1) as u32;
    if band_x1 <= band_x0 || eye_y1 <= eye_y0 || cheek_y1 <= cheek_y0 {
        return false;
    }
    let eye_mean = integral.mean(band_x0, eye_y0, band_x1, eye_y1);
    let cheek_mean = integral.mean(band_x0, cheek_y0, band_x1, cheek_y1);
    if cheek_mean < eye_mean + EYE_CHEEK_CONTRAST_MIN {
        return false;
    }

    // 3. Left/right symmetry of the interior.
    let mid = (ix0 + ix1) / 2;
    let left_mean = integral.mean(ix0, iy0, mid, iy1);
    let right_mean = integral.mean(mid, iy0, ix1, iy1);
    (left_mean - right_mean).abs() <= SYMMETRY_MAX_DELTA
}

/// Overlapping qualifying windows, merged greedily against the first member.
struct WindowGroup {
    representative: BoundingBox,
    sum_x: u64,
    sum_y: u64,
    sum_size: u64,
    count: usize,
}

impl WindowGroup {
    fn average(&self) -> BoundingBox {
        let n = self.count as u64;
        BoundingBox::new(
            (self.sum_x / n) as u32,
            (self.sum_y / n) as u32,
            (self.sum_size / n) as u32,
            (self.sum_size / n) as u32,
        )
    }
}

fn accumulate(groups: &mut Vec<WindowGroup>, window: BoundingBox) {
    for group in groups.iter_mut() {
        if group.representative.iou(&window) > GROUP_IOU_MIN {
            group.sum_x += window.x as u64;
            group.sum_y += window.y as u64;
            group.sum_size += window.width as u64;
            group.count += 1;
            return;
        }
    }
    groups.push(WindowGroup {
        representative: window,
        sum_x: window.x as u64,
        sum_y: window.y as u64,
        sum_size: window.width as u64,
        count: 1,
    });
}

/// The ordered fallback chain.
pub struct FaceLocator {
    strategies: Vec<Box<dyn DetectStrategy>>,
}

impl FaceLocator {
    /// Production chain: learned detector (when present), then the
    /// three geometric passes.
    pub fn new(learned: Option<crate::dnn::DnnFaceDetector>) -> Self {
        let mut strategies: Vec<Box<dyn DetectStrategy>> = Vec::with_capacity(4);
        if let Some(detector) = learned {
            strategies.push(Box::new(detector));
        } else {
            tracing::warn!("learned detector unavailable; running geometric stages only");
        }
        strategies.push(Box::new(GeometricDetector::new(GeometricParams::strict())));
        strategies.push(Box::new(GeometricDetector::new(GeometricParams::relaxed())));
        strategies.push(Box::new(GeometricDetector::new(
            GeometricParams::very_relaxed(),
        )));
        Self { strategies }
    }

    /// Custom chain, used by tests and embedders with their own detectors.
    pub fn with_strategies(strategies: Vec<Box<dyn DetectStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run the chain over the enhanced image.
    pub fn locate(&self, image: &RgbImage) -> DetectionResult {
        for strategy in &self.strategies {
            let candidates = strategy.detect(image);
            if candidates.is_empty() {
                tracing::debug!(stage = strategy.name(), "no candidates, falling through");
                continue;
            }
            let pick = select_candidate(&candidates);
            tracing::debug!(
                stage = strategy.name(),
                candidates = candidates.len(),
                x = pick.bbox.x,
                y = pick.bbox.y,
                size = pick.bbox.width,
                "face located"
            );
            return DetectionResult::Found {
                bbox: pick.bbox,
                detector: strategy.name(),
                confidence: pick.confidence,
            };
        }
        DetectionResult::NotFound
    }
}

/// Pick one candidate from a stage's output.
///
/// Learned stages rank by confidence; geometric stages assume the
/// largest region is the primary subject. Strict comparisons keep the
/// first-seen candidate on ties.
fn select_candidate(candidates: &[Detection]) -> &Detection {
    let by_confidence = candidates.iter().all(|c| c.confidence.is_some());
    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        let better = if by_confidence {
            candidate.confidence > best.confidence
        } else {
            candidate.bbox.area() > best.bbox.area()
        };
        if better {
            best = candidate;
        }
    }
    best
}
