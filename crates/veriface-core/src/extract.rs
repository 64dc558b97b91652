//! Descriptor extraction: orientation-histogram (HOG) features over the
//! canonical face crop, globally L2-normalized.
//!
//! The same algorithm and parameters run at enrollment and at
//! verification; descriptors from different parameterizations are not
//! comparable.

use image::RgbImage;

use crate::enhance::luma_plane;
use crate::error::EngineError;

/// Cell side length in pixels.
const CELL_SIZE: u32 = 10;
/// Unsigned orientation bins over [0°, 180°).
const ORIENTATION_BINS: usize = 9;
/// Block side length in cells; blocks slide with stride 1 cell.
const BLOCK_SIZE: u32 = 2;
const BLOCK_NORM_EPS: f32 = 1e-6;

pub struct FeatureExtractor {
    face_size: u32,
}

impl FeatureExtractor {
    pub fn new(face_size: u32) -> Self {
        debug_assert!(face_size >= CELL_SIZE * BLOCK_SIZE);
        Self { face_size }
    }

    /// Fixed descriptor dimension D for this extractor's face size.
    pub fn descriptor_len(&self) -> usize {
        let cells = (self.face_size / CELL_SIZE) as usize;
        let blocks = cells - BLOCK_SIZE as usize + 1;
        blocks * blocks * (BLOCK_SIZE * BLOCK_SIZE) as usize * ORIENTATION_BINS
    }

    /// Compute the unit-norm descriptor for a canonical face crop.
    pub fn extract(&self, face: &RgbImage) -> Result<Vec<f32>, EngineError> {
        debug_assert_eq!(face.width(), self.face_size);
        debug_assert_eq!(face.height(), self.face_size);

        let size = self.face_size as usize;
        let luma: Vec<f32> = luma_plane(face).iter().map(|&v| v as f32).collect();

        // Central-difference gradients with replicated borders.
        let at = |x: usize, y: usize| luma[y * size + x];
        let cells = size / CELL_SIZE as usize;
        let mut histograms = vec![[0.0f32; ORIENTATION_BINS]; cells * cells];

        for y in 0..size {
            for x in 0..size {
                let gx = at((x + 1).min(size - 1), y) - at(x.saturating_sub(1), y);
                let gy = at(x, (y + 1).min(size - 1)) - at(x, y.saturating_sub(1));
                let magnitude = (gx * gx + gy * gy).sqrt();
                if magnitude == 0.0 {
                    continue;
                }

                // Unsigned orientation in [0, 180).
                let mut angle = gy.atan2(gx).to_degrees();
                if angle < 0.0 {
                    angle += 180.0;
                }
                if angle >= 180.0 {
                    angle -= 180.0;
                }

                // Linear vote split between the two nearest bins.
                let bin_width = 180.0 / ORIENTATION_BINS as f32;
                let position = angle / bin_width - 0.5;
                let low = position.floor();
                let high_weight = position - low;
                let low_bin =
                    ((low as i32).rem_euclid(ORIENTATION_BINS as i32)) as usize;
                let high_bin = (low_bin + 1) % ORIENTATION_BINS;

                let cell_x = (x / CELL_SIZE as usize).min(cells - 1);
                let cell_y = (y / CELL_SIZE as usize).min(cells - 1);
                let hist = &mut histograms[cell_y * cells + cell_x];
                hist[low_bin] += magnitude * (1.0 - high_weight);
                hist[high_bin] += magnitude * high_weight;
            }
        }

        // Block normalization: 2×2 cell blocks, stride 1, L2 per block.
        let blocks = cells - BLOCK_SIZE as usize + 1;
        let mut descriptor = Vec::with_capacity(self.descriptor_len());
        for by in 0..blocks {
            for bx in 0..blocks {
                let start = descriptor.len();
                for cy in 0..BLOCK_SIZE as usize {
                    for cx in 0..BLOCK_SIZE as usize {
                        descriptor
                            .extend_from_slice(&histograms[(by + cy) * cells + (bx + cx)]);
                    }
                }
                let norm = descriptor[start..]
                    .iter()
                    .map(|v| v * v)
                    .sum::<f32>()
                    .sqrt();
                if norm > BLOCK_NORM_EPS {
                    for v in &mut descriptor[start..] {
                        *v /= norm;
                    }
                }
            }
        }

        // Global unit norm; a featureless crop has nothing to normalize.
        let norm = descriptor.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm <= BLOCK_NORM_EPS {
            return Err(EngineError::DegenerateFeatures);
        }
        for v in &mut descriptor {
            *v /= norm;
        }

        debug_assert_eq!(descriptor.len(), self.descriptor_len());
        Ok(descriptor)
    }
}
