//! Frame → labeled detections.
//!
//! Every frame is downscaled by [`DOWNSCALE`] before any model runs. Detection
//! alternates with reuse of the previous boxes ([`DetectState`]), encodings
//! are recomputed every frame, and each encoding is matched against the
//! [`KnownFaces`] built once from the cache.

use crate::cache::EncodingCache;
use crate::matcher::{MatchPolicy, Matcher};
use crate::pipeline::{FaceEncoder, FaceLocator, PipelineError};
use crate::types::{BoundingBox, Detection, Encoding, UNKNOWN_FACE};
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

/// Scale applied to frames before detection and encoding.
pub const DOWNSCALE: f32 = 0.5;

/// Default Euclidean distance threshold for L2-normalised ArcFace encodings
/// (about 0.40 cosine similarity).
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.10;

#[derive(Error, Debug)]
pub enum MatchLoopError {
    #[error("no usable face encodings in the cache; run `facewatch build` first")]
    NoKnownFaces,
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Whether this iteration runs the detector or reuses the last boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectState {
    #[default]
    Detect,
    Reuse,
}

impl DetectState {
    pub fn next(self) -> Self {
        match self {
            DetectState::Detect => DetectState::Reuse,
            DetectState::Reuse => DetectState::Detect,
        }
    }
}

/// Known encodings and their labels, in cache key order.
#[derive(Debug, Clone, Default)]
pub struct KnownFaces {
    encodings: Vec<Encoding>,
    labels: Vec<String>,
}

impl KnownFaces {
    /// Take the first encoding of every cache record.
    ///
    /// Records without encodings, or whose encoding is not `dimension` long
    /// (e.g. 128-d caches from other encoders), are skipped. An empty result
    /// is fatal.
    pub fn from_cache(cache: &EncodingCache, dimension: usize) -> Result<Self, MatchLoopError> {
        let mut known = Self::default();
        let mut mismatched = 0usize;
        for (key, record) in cache.iter() {
            match record.primary() {
                Some(encoding) if encoding.len() == dimension => {
                    known.encodings.push(encoding.clone());
                    known.labels.push(record.name.clone());
                }
                Some(encoding) => {
                    mismatched += 1;
                    tracing::warn!(
                        key,
                        len = encoding.len(),
                        expected = dimension,
                        "skipping cache record with wrong encoding length"
                    );
                }
                None => tracing::debug!(key, "cache record has no encoding"),
            }
        }
        if known.is_empty() {
            return Err(MatchLoopError::NoKnownFaces);
        }
        if mismatched > 0 {
            tracing::warn!(skipped = mismatched, "rebuild the cache to re-encode skipped records");
        }
        tracing::info!(faces = known.len(), "loaded known faces");
        Ok(known)
    }

    pub fn len(&self) -> usize {
        self.encodings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }

    pub fn encodings(&self) -> &[Encoding] {
        &self.encodings
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }
}

/// Per-frame detect/encode/match driver.
pub struct MatchLoop<P> {
    pipeline: P,
    known: KnownFaces,
    matcher: Box<dyn Matcher + Send>,
    threshold: f32,
    state: DetectState,
    boxes: Vec<BoundingBox>,
}

impl<P> MatchLoop<P>
where
    P: FaceLocator + FaceEncoder,
{
    pub fn new(pipeline: P, known: KnownFaces, policy: MatchPolicy, threshold: f32) -> Self {
        Self {
            pipeline,
            known,
            matcher: policy.matcher(),
            threshold,
            state: DetectState::default(),
            boxes: Vec::new(),
        }
    }

    /// State the next call to [`process`](Self::process) will run in.
    pub fn state(&self) -> DetectState {
        self.state
    }

    /// Detect, encode and label the faces in `frame`.
    ///
    /// Returned rectangles are in `frame` coordinates. The detect/reuse
    /// state advances even when the models fail; a failed detection leaves
    /// no boxes for the following reuse iteration.
    pub fn process(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, MatchLoopError> {
        let state = self.state;
        self.state = state.next();

        let small = downscale(frame);
        if state == DetectState::Detect {
            self.boxes.clear();
            self.boxes = self.pipeline.locate(&small)?;
        }
        if self.boxes.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self.pipeline.encode(&small, &self.boxes)?;
        let detections = self
            .boxes
            .iter()
            .zip(encodings.iter())
            .map(|(face, encoding)| self.label(face, encoding))
            .collect();
        Ok(detections)
    }

    fn label(&self, face: &BoundingBox, encoding: &Encoding) -> Detection {
        let result = self.matcher.compare(encoding, self.known.encodings(), self.threshold);
        let label = result.index.and_then(|i| self.known.label(i));
        Detection {
            rect: face.to_rect().scaled(1.0 / DOWNSCALE),
            label: label.unwrap_or(UNKNOWN_FACE).to_string(),
            distance: label.map(|_| result.distance),
        }
    }
}

fn downscale(frame: &RgbImage) -> RgbImage {
    let w = ((frame.width() as f32 * DOWNSCALE).round() as u32).max(1);
    let h = ((frame.height() as f32 * DOWNSCALE).round() as u32).max(1);
    imageops::resize(frame, w, h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EncodingRecord;
    use crate::detector::DetectorError;
    use crate::types::FaceRect;
    use image::Rgb;

    /// A face is any pure-colour frame that is not black; its box covers the
    /// centre quarter and its encoding is the normalised colour.
    struct FakePipeline {
        locate_calls: usize,
        encode_calls: usize,
        fail_locate: bool,
    }

    impl FakePipeline {
        fn new() -> Self {
            Self { locate_calls: 0, encode_calls: 0, fail_locate: false }
        }
    }

    impl FaceLocator for FakePipeline {
        fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, PipelineError> {
            self.locate_calls += 1;
            if self.fail_locate {
                return Err(PipelineError::Detector(DetectorError::InferenceFailed("boom".into())));
            }
            if image.get_pixel(0, 0).0 == [0, 0, 0] {
                return Ok(vec![]);
            }
            let (w, h) = (image.width() as f32, image.height() as f32);
            Ok(vec![BoundingBox {
                x: w / 4.0, y: h / 4.0, width: w / 2.0, height: h / 2.0,
                confidence: 0.9, landmarks: None,
            }])
        }
    }

    impl FaceEncoder for FakePipeline {
        fn encode(&mut self, image: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Encoding>, PipelineError> {
            self.encode_calls += 1;
            let p = image.get_pixel(0, 0).0;
            let v: Vec<f32> = p.iter().map(|&c| c as f32 / 255.0).collect();
            Ok(faces.iter().map(|_| Encoding::new(v.clone())).collect())
        }
    }

    fn known() -> KnownFaces {
        let mut cache = EncodingCache::new();
        cache.insert("faces/Alice/a.png", EncodingRecord::new(Encoding::new(vec![1.0, 0.0, 0.0]), "Alice"));
        cache.insert("faces/Bob/b.png", EncodingRecord::new(Encoding::new(vec![0.0, 0.0, 1.0]), "Bob"));
        KnownFaces::from_cache(&cache, 3).unwrap()
    }

    fn frame(color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(64, 48, Rgb(color))
    }

    fn match_loop() -> MatchLoop<FakePipeline> {
        MatchLoop::new(FakePipeline::new(), known(), MatchPolicy::First, 0.5)
    }

    #[test]
    fn test_default_threshold_sits_at_cosine_040() {
        // Unit vectors at cosine c are sqrt(2 - 2c) apart.
        let unit = |cos: f32| Encoding::new(vec![cos, (1.0 - cos * cos).sqrt()]);
        let anchor = Encoding::new(vec![1.0, 0.0]);
        assert!(anchor.distance(&unit(0.41)) < DEFAULT_MATCH_THRESHOLD);
        assert!(anchor.distance(&unit(0.39)) > DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn test_detect_state_alternates() {
        assert_eq!(DetectState::default(), DetectState::Detect);
        assert_eq!(DetectState::Detect.next(), DetectState::Reuse);
        assert_eq!(DetectState::Reuse.next(), DetectState::Detect);
    }

    #[test]
    fn test_known_face_is_labeled() {
        let mut ml = match_loop();
        let detections = ml.process(&frame([255, 0, 0])).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "Alice");
        assert!(detections[0].distance.unwrap() < 1e-6);
    }

    #[test]
    fn test_unrecognized_face_is_unknown() {
        let mut ml = match_loop();
        let detections = ml.process(&frame([0, 255, 0])).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, UNKNOWN_FACE);
        assert_eq!(detections[0].distance, None);
    }

    #[test]
    fn test_rects_scaled_back_to_frame() {
        let mut ml = match_loop();
        let detections = ml.process(&frame([0, 0, 255])).unwrap();
        // Small frame is 32x24; centre box (8,6)-(24,18) doubles to (16,12)-(48,36).
        assert_eq!(detections[0].rect, FaceRect { top: 12, right: 48, bottom: 36, left: 16 });
    }

    #[test]
    fn test_no_faces_no_encoding() {
        let mut ml = match_loop();
        let detections = ml.process(&frame([0, 0, 0])).unwrap();
        assert!(detections.is_empty());
        assert_eq!(ml.pipeline.encode_calls, 0);
    }

    #[test]
    fn test_detection_runs_every_other_frame() {
        let mut ml = match_loop();
        for _ in 0..4 {
            ml.process(&frame([255, 0, 0])).unwrap();
        }
        assert_eq!(ml.pipeline.locate_calls, 2);
        assert_eq!(ml.pipeline.encode_calls, 4);
    }

    #[test]
    fn test_reuse_keeps_previous_boxes() {
        let mut ml = match_loop();
        ml.process(&frame([255, 0, 0])).unwrap();
        assert_eq!(ml.state(), DetectState::Reuse);

        // Reuse iteration: the black frame is not re-detected, so the old box
        // is re-encoded against the new pixels.
        let detections = ml.process(&frame([0, 0, 0])).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, UNKNOWN_FACE);

        // Next detect iteration clears it.
        assert!(ml.process(&frame([0, 0, 0])).unwrap().is_empty());
    }

    #[test]
    fn test_state_advances_on_failure() {
        let mut ml = match_loop();
        ml.pipeline.fail_locate = true;
        assert!(matches!(ml.process(&frame([255, 0, 0])), Err(MatchLoopError::Pipeline(_))));
        assert_eq!(ml.state(), DetectState::Reuse);

        // Reuse after a failed detect has nothing to re-encode.
        ml.pipeline.fail_locate = false;
        assert!(ml.process(&frame([255, 0, 0])).unwrap().is_empty());
        assert_eq!(ml.pipeline.locate_calls, 1);
        assert_eq!(ml.pipeline.encode_calls, 0);

        // Detection resumes on the next iteration.
        assert_eq!(ml.process(&frame([255, 0, 0])).unwrap()[0].label, "Alice");
    }

    #[test]
    fn test_failed_detect_drops_earlier_boxes() {
        let mut ml = match_loop();
        assert_eq!(ml.process(&frame([255, 0, 0])).unwrap().len(), 1);
        assert_eq!(ml.process(&frame([255, 0, 0])).unwrap().len(), 1);

        ml.pipeline.fail_locate = true;
        assert!(ml.process(&frame([255, 0, 0])).is_err());
        assert!(ml.process(&frame([255, 0, 0])).unwrap().is_empty());
    }

    #[test]
    fn test_empty_cache_is_fatal() {
        let err = KnownFaces::from_cache(&EncodingCache::new(), 3).unwrap_err();
        assert!(matches!(err, MatchLoopError::NoKnownFaces));

        let mut cache = EncodingCache::new();
        cache.insert("x.png", EncodingRecord { encodings: vec![], name: "unknown".into() });
        assert!(KnownFaces::from_cache(&cache, 3).is_err());
    }

    #[test]
    fn test_wrong_length_records_are_skipped() {
        let mut cache = EncodingCache::new();
        cache.insert("faces/Alice/a.png", EncodingRecord::new(Encoding::new(vec![1.0, 0.0]), "Alice"));
        cache.insert("faces/Bob/b.png", EncodingRecord::new(Encoding::new(vec![0.0, 0.0, 1.0]), "Bob"));
        cache.insert("faces/Carol/c.png", EncodingRecord::new(Encoding::new(vec![0.0, 1.0]), "Carol"));

        let k = KnownFaces::from_cache(&cache, 3).unwrap();
        assert_eq!(k.len(), 1);
        assert_eq!(k.label(0), Some("Bob"));
        assert_eq!(k.encodings()[0].len(), 3);
    }

    #[test]
    fn test_only_wrong_length_records_is_fatal() {
        let mut cache = EncodingCache::new();
        cache.insert("faces/Alice/a.png", EncodingRecord::new(Encoding::new(vec![1.0, 0.0]), "Alice"));
        cache.insert("faces/Bob/b.png", EncodingRecord::new(Encoding::new(vec![0.0, 1.0]), "Bob"));
        let err = KnownFaces::from_cache(&cache, 3).unwrap_err();
        assert!(matches!(err, MatchLoopError::NoKnownFaces));
    }

    #[test]
    fn test_known_faces_keep_cache_order() {
        let k = known();
        assert_eq!(k.len(), 2);
        assert_eq!(k.label(0), Some("Alice"));
        assert_eq!(k.label(1), Some("Bob"));
        assert_eq!(k.label(2), None);
    }
}
