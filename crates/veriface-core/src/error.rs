//! Engine-wide error taxonomy.
//!
//! Every variant except `StoreUnavailable` is caller-fixable: the
//! `Display` text doubles as the actionable guidance shown to the
//! uploader. `StoreUnavailable` is a system fault; transports should
//! replace its message with a generic one plus the request's
//! correlation id.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("image is {actual} bytes, which exceeds the {limit} byte upload limit")]
    OversizedInput { limit: usize, actual: usize },

    #[error("unsupported image content type '{0}' — upload a JPEG, PNG or WebP photo")]
    UnsupportedFormat(String),

    #[error("image could not be decoded ({detail}) — re-upload an uncorrupted photo")]
    CorruptImage { detail: String },

    #[error(
        "no face detected in the image — retake the photo with better lighting \
         and your face clearly visible"
    )]
    FaceNotDetected,

    #[error("detected face region is empty — retake the photo closer to the camera")]
    InvalidFaceRegion,

    #[error(
        "face features could not be computed from the image — retake the photo \
         with more contrast"
    )]
    DegenerateFeatures,

    #[error("embedding store unavailable: {0}")]
    StoreUnavailable(String),
}

impl EngineError {
    /// Whether a re-upload by the caller can resolve the failure.
    pub fn is_caller_fixable(&self) -> bool {
        !matches!(self, EngineError::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}
