//! Learned SSD face detector via ONNX Runtime.
//!
//! Runs a 300×300 single-shot face detector (res10-style export) over
//! the enhanced image. Output records are `[image_id, label, confidence,
//! x1, y1, x2, y2]` with normalized corner coordinates.
//!
//! This stage is optional: the engine starts without it when the model
//! file is missing, and any runtime failure degrades to an empty
//! candidate list so the geometric stages take over.

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::locate::DetectStrategy;
use crate::types::{BoundingBox, Detection};

const SSD_INPUT_SIZE: u32 = 300;
/// Channel means in BGR order, matching the detector's training input.
const SSD_MEAN_BGR: [f32; 3] = [104.0, 177.0, 123.0];
const SSD_RECORD_LEN: usize = 7;

#[derive(Error, Debug)]
pub enum DetectorLoadError {
    #[error("model file not found: {0} — place the SSD face detector ONNX export there")]
    ModelNotFound(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// SSD-based face detector.
pub struct DnnFaceDetector {
    // `Session::run` needs exclusive access; the weights themselves are
    // immutable for the process lifetime.
    session: Mutex<Session>,
    confidence_floor: f32,
}

impl DnnFaceDetector {
    /// Load the detector model from the given path.
    pub fn load(model_path: &Path, confidence_floor: f32) -> Result<Self, DetectorLoadError> {
        if !model_path.exists() {
            return Err(DetectorLoadError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded SSD face detector"
        );

        Ok(Self {
            session: Mutex::new(session),
            confidence_floor,
        })
    }

    fn run(&self, image: &RgbImage) -> Result<Vec<Detection>, ort::Error> {
        let input = preprocess(image);

        let mut session = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, records) = outputs[0].try_extract_tensor::<f32>()?;

        Ok(decode_records(
            records,
            image.width(),
            image.height(),
            self.confidence_floor,
        ))
    }
}

impl DetectStrategy for DnnFaceDetector {
    fn name(&self) -> &'static str {
        "dnn-ssd"
    }

    fn detect(&self, image: &RgbImage) -> Vec<Detection> {
        match self.run(image) {
            Ok(detections) => detections,
            Err(err) => {
                tracing::warn!(error = %err, "SSD inference failed; falling through to geometric stages");
                Vec::new()
            }
        }
    }
}

/// Resize to 300×300 and build a mean-subtracted NCHW tensor in BGR order.
fn preprocess(image: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(
        image,
        SSD_INPUT_SIZE,
        SSD_INPUT_SIZE,
        image::imageops::FilterType::Triangle,
    );

    let size = SSD_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        tensor[[0, 0, y as usize, x as usize]] = b as f32 - SSD_MEAN_BGR[0];
        tensor[[0, 1, y as usize, x as usize]] = g as f32 - SSD_MEAN_BGR[1];
        tensor[[0, 2, y as usize, x as usize]] = r as f32 - SSD_MEAN_BGR[2];
    }
    tensor
}

/// Decode stride-7 SSD records into pixel-space detections above the floor.
fn decode_records(records: &[f32], width: u32, height: u32, floor: f32) -> Vec<Detection> {
    let mut detections = Vec::new();

    for record in records.chunks_exact(SSD_RECORD_LEN) {
        let confidence = record[2];
        if confidence <= floor {
            continue;
        }

        let x1 = (record[3] * width as f32).clamp(0.0, width as f32);
        let y1 = (record[4] * height as f32).clamp(0.0, height as f32);
        let x2 = (record[5] * width as f32).clamp(0.0, width as f32);
        let y2 = (record[6] * height as f32).clamp(0.0, height as f32);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(Detection {
            bbox: BoundingBox::new(
                x1.round() as u32,
                y1.round() as u32,
                (x2 - x1).round().max(1.0) as u32,
                (y2 - y1).round().max(1.0) as u32,
            ),
            confidence: Some(confidence),
        });
    }

    detections
}
