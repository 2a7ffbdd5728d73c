//! Seams between the orchestration code and the face models.
//!
//! The cache builder and the match loop only see [`FaceLocator`] and
//! [`FaceEncoder`]. [`OnnxPipeline`] implements both with SCRFD and ArcFace.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Encoding};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds face boxes in an image.
pub trait FaceLocator {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, PipelineError>;
}

/// Computes one encoding per face box, in the same order.
pub trait FaceEncoder {
    fn encode(&mut self, image: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Encoding>, PipelineError>;
}

/// SCRFD + ArcFace running on ONNX Runtime.
pub struct OnnxPipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxPipeline {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceLocator for OnnxPipeline {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, PipelineError> {
        Ok(self.detector.detect(image)?)
    }
}

impl FaceEncoder for OnnxPipeline {
    fn encode(&mut self, image: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Encoding>, PipelineError> {
        faces
            .iter()
            .map(|face| self.recognizer.extract(image, face).map_err(PipelineError::from))
            .collect()
    }
}
