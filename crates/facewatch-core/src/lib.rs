//! facewatch-core: face encoding cache and real-time matching engine.
//!
//! Uses SCRFD for face detection and ArcFace for face encoding, both
//! running via ONNX Runtime. The cache builder and the match loop are
//! written against the [`FaceLocator`]/[`FaceEncoder`] seams so they can
//! be driven by fakes in tests.

pub mod alignment;
pub mod builder;
pub mod cache;
pub mod detector;
pub mod match_loop;
pub mod matcher;
pub mod pipeline;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use builder::{BuildError, BuildReport, CacheBuilder, ItemError};
pub use cache::{CacheError, EncodingCache, EncodingRecord};
pub use detector::FaceDetector;
pub use match_loop::{DetectState, KnownFaces, MatchLoop, MatchLoopError};
pub use matcher::{BestMatch, FirstMatch, MatchPolicy, MatchResult, Matcher};
pub use pipeline::{FaceEncoder, FaceLocator, OnnxPipeline, PipelineError};
pub use recognizer::{FaceRecognizer, ARCFACE_ENCODING_DIM};
pub use types::{BoundingBox, Detection, Encoding, FaceRect};

/// Default directory holding `det_10g.onnx` and `w600k_r50.onnx`.
///
/// `$XDG_DATA_HOME/facewatch/models`, falling back to
/// `$HOME/.local/share/facewatch/models`, then `./models`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(data) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data).join("facewatch/models");
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local/share/facewatch/models"),
        Err(_) => PathBuf::from("models"),
    }
}
