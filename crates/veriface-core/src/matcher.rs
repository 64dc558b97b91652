//! Nearest-neighbor matching: linear cosine scan over the gallery
//! snapshot under a strict acceptance threshold.

use crate::types::{FaceEmbedding, MatchDecision};

/// Cosine similarity in [-1, 1].
///
/// Computes the full quotient rather than a bare dot product: stored
/// vectors are unit-norm by invariant, but re-normalizing on read keeps
/// the comparison correct even if a record drifted.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "descriptor dimensions must match");

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

pub struct CosineMatcher {
    threshold: f32,
}

impl CosineMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Scan every gallery record and accept the maximum similarity when
    /// it strictly exceeds the threshold.
    ///
    /// Deterministic: the gallery arrives in the store's insertion
    /// order and ties at the exact maximum keep the first record seen.
    pub fn best_match(&self, query: &[f32], gallery: &[FaceEmbedding]) -> MatchDecision {
        let mut best: Option<(&FaceEmbedding, f32)> = None;

        for record in gallery {
            if record.vector.len() != query.len() {
                // Only possible when the canonical face size was changed
                // against an existing database.
                debug_assert!(false, "stored dimension {} != query {}", record.vector.len(), query.len());
                tracing::error!(
                    identity_key = %record.identity_key,
                    stored_dim = record.vector.len(),
                    query_dim = query.len(),
                    "skipping embedding with mismatched dimension"
                );
                continue;
            }
            let similarity = cosine_similarity(query, &record.vector);
            // Strict comparison keeps the first record on exact ties.
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((record, similarity));
            }
        }

        match best {
            Some((record, similarity)) if similarity > self.threshold => MatchDecision::Matched {
                identity_key: record.identity_key.clone(),
                similarity,
            },
            Some((_, similarity)) => MatchDecision::NoMatch {
                best_similarity: Some(similarity),
            },
            None => MatchDecision::NoMatch {
                best_similarity: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(key: &str, vector: Vec<f32>) -> FaceEmbedding {
        let now = Utc::now();
        FaceEmbedding {
            identity_key: key.to_string(),
            dim: vector.len(),
            vector,
            source_ref: "sha256:test".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = [0.6f32, 0.8, 0.0];
        let b = [0.0f32, 0.6, 0.8];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-7);
    }

    #[test]
    fn similarity_identical_and_opposite() {
        let a = [1.0f32, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_similarity_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn renormalizes_drifted_stored_vectors() {
        // A stored vector at twice unit length must still compare as
        // direction-identical.
        let matcher = CosineMatcher::new(0.6);
        let gallery = vec![record("alice", vec![2.0, 0.0])];
        match matcher.best_match(&[1.0, 0.0], &gallery) {
            MatchDecision::Matched { similarity, .. } => {
                assert!((similarity - 1.0).abs() < 1e-6)
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn threshold_is_exclusive() {
        let threshold = 0.6f32;
        let matcher = CosineMatcher::new(threshold);

        // Similarity exactly τ: cos = 0.6 via (0.6, 0.8)·(1, 0).
        let gallery = vec![record("edge", vec![0.6, 0.8])];
        match matcher.best_match(&[1.0, 0.0], &gallery) {
            MatchDecision::NoMatch {
                best_similarity: Some(s),
            } => assert!((s - threshold).abs() < 1e-5, "best {s}"),
            other => panic!("similarity at τ must not match, got {other:?}"),
        }

        // Nudge above τ.
        let gallery = vec![record("edge", vec![0.6 + 1e-3, 0.8])];
        assert!(matches!(
            matcher.best_match(&[1.0, 0.0], &gallery),
            MatchDecision::Matched { .. }
        ));
    }

    #[test]
    fn empty_gallery_reports_no_best() {
        let matcher = CosineMatcher::new(0.6);
        assert_eq!(
            matcher.best_match(&[1.0, 0.0], &[]),
            MatchDecision::NoMatch {
                best_similarity: None
            }
        );
    }

    #[test]
    fn exact_ties_keep_first_insertion_order() {
        let matcher = CosineMatcher::new(0.5);
        let gallery = vec![
            record("first", vec![1.0, 0.0]),
            record("second", vec![1.0, 0.0]),
        ];
        match matcher.best_match(&[1.0, 0.0], &gallery) {
            MatchDecision::Matched { identity_key, .. } => assert_eq!(identity_key, "first"),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn best_of_many_wins() {
        let matcher = CosineMatcher::new(0.1);
        let gallery = vec![
            record("far", vec![0.0, 1.0]),
            record("near", vec![0.96, 0.28]),
            record("opposite", vec![-1.0, 0.0]),
        ];
        match matcher.best_match(&[1.0, 0.0], &gallery) {
            MatchDecision::Matched { identity_key, .. } => assert_eq!(identity_key, "near"),
            other => panic!("expected match, got {other:?}"),
        }
    }
}
