//! Upload decoding: raw bytes → canonical RGB pixel grid.
//!
//! Checks run in a fixed order so an oversized upload short-circuits
//! before any pixel work: size limit, declared content type, pixel
//! decode, zero-area rejection.

use image::RgbImage;

use crate::error::EngineError;

pub struct ImageDecoder {
    max_bytes: usize,
    accepted_types: Vec<String>,
}

impl ImageDecoder {
    pub fn new(max_bytes: usize, accepted_types: &[String]) -> Self {
        Self {
            max_bytes,
            accepted_types: accepted_types
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Decode an uploaded image into an 8-bit RGB grid.
    pub fn decode(&self, bytes: &[u8], content_type: &str) -> Result<RgbImage, EngineError> {
        if bytes.len() > self.max_bytes {
            return Err(EngineError::OversizedInput {
                limit: self.max_bytes,
                actual: bytes.len(),
            });
        }

        // Declared type may carry parameters ("image/jpeg; charset=...").
        let declared = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if !self.accepted_types.iter().any(|t| t == &declared) {
            return Err(EngineError::UnsupportedFormat(content_type.to_string()));
        }

        let decoded = image::load_from_memory(bytes).map_err(|err| EngineError::CorruptImage {
            detail: err.to_string(),
        })?;

        let rgb = decoded.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(EngineError::CorruptImage {
                detail: "decoded image has zero area".into(),
            });
        }

        Ok(rgb)
    }
}
