//! Orchestration: the enrollment and verification services.
//!
//! Both run the same pipeline — decode → enhance → locate → normalize →
//! extract — and diverge at the end: verification matches the
//! descriptor against the gallery snapshot, enrollment upserts it.
//! Each stage fails fast; the only retry logic in the system is the
//! detector fallback chain inside [`FaceLocator`].
//!
//! Engine methods take `&self` and are safe to call from any number of
//! threads: model state is loaded once at construction and never
//! mutated, and the store handles its own write exclusivity.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::decode::ImageDecoder;
use crate::dnn::DnnFaceDetector;
use crate::enhance;
use crate::error::EngineError;
use crate::extract::FeatureExtractor;
use crate::locate::FaceLocator;
use crate::matcher::CosineMatcher;
use crate::normalize;
use crate::store::EmbeddingStore;
use crate::types::{DetectionResult, EnrollOutcome, MatchDecision, VerifyOutcome};

pub struct Engine {
    config: EngineConfig,
    decoder: ImageDecoder,
    locator: FaceLocator,
    extractor: FeatureExtractor,
    matcher: CosineMatcher,
    store: EmbeddingStore,
}

impl Engine {
    /// Build the engine. `learned` is the optional startup-loaded
    /// detector; passing `None` starts in the degraded state where the
    /// chain runs geometric stages only.
    pub fn new(config: EngineConfig, store: EmbeddingStore, learned: Option<DnnFaceDetector>) -> Self {
        let decoder = ImageDecoder::new(config.max_upload_bytes, &config.accepted_content_types);
        let locator = FaceLocator::new(learned);
        let extractor = FeatureExtractor::new(config.canonical_face_size);
        let matcher = CosineMatcher::new(config.similarity_threshold);
        tracing::info!(
            threshold = config.similarity_threshold,
            face_size = config.canonical_face_size,
            descriptor_dim = extractor.descriptor_len(),
            "engine ready"
        );
        Self {
            config,
            decoder,
            locator,
            extractor,
            matcher,
            store,
        }
    }

    /// Descriptor dimension D for this engine's canonical face size.
    pub fn descriptor_len(&self) -> usize {
        self.extractor.descriptor_len()
    }

    /// Run the shared pipeline up to the unit-norm descriptor.
    fn descriptor_for(&self, bytes: &[u8], content_type: &str) -> Result<Vec<f32>, EngineError> {
        let decoded = self.decoder.decode(bytes, content_type)?;
        let enhanced = enhance::enhance(&decoded);

        let (bbox, detector, confidence) = match self.locator.locate(&enhanced) {
            DetectionResult::Found {
                bbox,
                detector,
                confidence,
            } => (bbox, detector, confidence),
            DetectionResult::NotFound => return Err(EngineError::FaceNotDetected),
        };
        tracing::debug!(
            detector,
            confidence = confidence.unwrap_or(f32::NAN),
            x = bbox.x,
            y = bbox.y,
            w = bbox.width,
            h = bbox.height,
            "face located"
        );

        let face = normalize::canonical_crop(&enhanced, &bbox, self.config.canonical_face_size)?;
        self.extractor.extract(&face)
    }

    /// Verify an uploaded photo against every enrolled identity.
    pub fn verify(&self, bytes: &[u8], content_type: &str) -> Result<VerifyOutcome, EngineError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("verify", %request_id);
        let _enter = span.enter();

        let query = self.descriptor_for(bytes, content_type)?;
        let gallery = self.store.snapshot()?;

        match self.matcher.best_match(&query, &gallery) {
            MatchDecision::Matched {
                identity_key,
                similarity,
            } => {
                tracing::info!(%identity_key, similarity, "verified");
                // Last-seen bookkeeping and credential issuance belong
                // to the caller.
                Ok(VerifyOutcome::Verified {
                    identity_key,
                    similarity,
                })
            }
            MatchDecision::NoMatch { best_similarity } => {
                tracing::info!(
                    best_similarity = best_similarity.unwrap_or(f32::NAN),
                    gallery_size = gallery.len(),
                    "no match"
                );
                Ok(VerifyOutcome::NoMatch { best_similarity })
            }
        }
    }

    /// Enroll (or re-enroll) an identity from an uploaded photo.
    ///
    /// A prior embedding for the key is replaced wholesale — no
    /// averaging of old and new vectors.
    pub fn enroll(
        &self,
        identity_key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<EnrollOutcome, EngineError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("enroll", %request_id, identity_key);
        let _enter = span.enter();

        let vector = self.descriptor_for(bytes, content_type)?;
        let source_ref = source_reference(bytes);
        let was_update = self.store.upsert(identity_key, &vector, &source_ref)?;

        tracing::info!(was_update, source_ref, "enrolled");
        Ok(EnrollOutcome {
            identity_key: identity_key.to_string(),
            was_update,
            source_ref,
        })
    }

    /// Delete an identity's embedding. Policy belongs to the caller.
    pub fn remove(&self, identity_key: &str) -> Result<bool, EngineError> {
        let removed = self.store.remove(identity_key)?;
        tracing::info!(identity_key, removed, "remove");
        Ok(removed)
    }

    /// Summaries of every enrolled identity, insertion order.
    pub fn list(&self) -> Result<Vec<crate::types::EmbeddingSummary>, EngineError> {
        self.store.list()
    }
}

/// Content reference for the enrollment upload. The surrounding system
/// stores the image itself; the hash ties the record to that artifact.
fn source_reference(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("sha256:{digest:x}")
}
