//! Engine configuration, read once at startup. Runtime changes are out
//! of scope: every value is fixed for the process lifetime.

use std::path::PathBuf;

use crate::normalize::DEFAULT_CANONICAL_FACE_SIZE;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.5;
pub const DEFAULT_ACCEPTED_CONTENT_TYPES: [&str; 3] =
    ["image/jpeg", "image/png", "image/webp"];

/// File name of the learned detector model inside the model directory.
pub const SSD_MODEL_FILE: &str = "ssd_face_300.onnx";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
    /// Declared content types the decoder accepts.
    pub accepted_content_types: Vec<String>,
    /// Acceptance threshold τ: similarity must strictly exceed it.
    pub similarity_threshold: f32,
    /// Confidence floor for the learned detector stage.
    pub confidence_floor: f32,
    /// Canonical face side length; must match the stored gallery.
    pub canonical_face_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            accepted_content_types: DEFAULT_ACCEPTED_CONTENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            canonical_face_size: DEFAULT_CANONICAL_FACE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Load from `VERIFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_upload_bytes: env_usize("VERIFACE_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            accepted_content_types: std::env::var("VERIFACE_ACCEPTED_TYPES")
                .map(|v| {
                    v.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.accepted_content_types),
            similarity_threshold: env_f32(
                "VERIFACE_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            ),
            confidence_floor: env_f32("VERIFACE_CONFIDENCE_FLOOR", defaults.confidence_floor),
            canonical_face_size: env_u32("VERIFACE_FACE_SIZE", defaults.canonical_face_size),
        }
    }
}

/// XDG data directory for veriface state.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("veriface")
}

/// Embedding database path (`VERIFACE_DB_PATH` override).
pub fn db_path_from_env() -> PathBuf {
    std::env::var("VERIFACE_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_data_dir().join("embeddings.db"))
}

/// Learned detector model path (`VERIFACE_MODEL_DIR` override).
pub fn model_path_from_env() -> PathBuf {
    std::env::var("VERIFACE_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_data_dir().join("models"))
        .join(SSD_MODEL_FILE)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.similarity_threshold, 0.6);
        assert_eq!(config.confidence_floor, 0.5);
        assert_eq!(config.canonical_face_size, 150);
        assert!(config
            .accepted_content_types
            .iter()
            .any(|t| t == "image/jpeg"));
    }
}
