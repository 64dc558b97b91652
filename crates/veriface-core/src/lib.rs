//! veriface-core — face enrollment and verification engine.
//!
//! Pipeline: decode → enhance → locate (fallback chain) → normalize →
//! extract (HOG descriptor) → match (cosine, strict threshold) or
//! store. One embedding record per external identity key.

pub mod config;
pub mod decode;
pub mod dnn;
pub mod engine;
pub mod enhance;
pub mod error;
pub mod extract;
pub mod locate;
pub mod matcher;
pub mod normalize;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use store::EmbeddingStore;
pub use types::{
    BoundingBox, DetectionResult, EnrollOutcome, FaceEmbedding, MatchDecision, VerifyOutcome,
};
