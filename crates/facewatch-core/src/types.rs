use serde::{Deserialize, Serialize};

/// Label reported for a face that matches no cached encoding.
pub const UNKNOWN_FACE: &str = "Unknown";

/// Label stored for a cached image whose path has no parent directory.
pub const UNLABELED: &str = "unknown";

/// Bounding box for a detected face, with optional facial landmarks.
///
/// Coordinates are in the space of the image handed to the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Integer `(top, right, bottom, left)` rectangle covering this box.
    pub fn to_rect(&self) -> FaceRect {
        FaceRect {
            top: self.y.round() as i32,
            right: (self.x + self.width).round() as i32,
            bottom: (self.y + self.height).round() as i32,
            left: self.x.round() as i32,
        }
    }
}

/// Face rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl FaceRect {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Multiply every edge by `factor`, rounding to the nearest pixel.
    pub fn scaled(&self, factor: f32) -> FaceRect {
        let s = |v: i32| (v as f32 * factor).round() as i32;
        FaceRect {
            top: s(self.top),
            right: s(self.right),
            bottom: s(self.bottom),
            left: s(self.left),
        }
    }
}

/// Face encoding vector (512-dimensional, L2-normalised, for ArcFace).
///
/// Serialised as a bare JSON array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance to `other`.
    ///
    /// Encodings of different dimensionality never match: the distance is
    /// `f32::INFINITY`.
    pub fn distance(&self, other: &Encoding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One labeled face found in a frame. Lives for a single render cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Rectangle in full-resolution frame coordinates.
    pub rect: FaceRect,
    pub label: String,
    /// Distance to the matched cache entry, `None` for unknown faces.
    pub distance: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical() {
        let a = Encoding::new(vec![0.6, 0.8]);
        assert!(a.distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_distance_unit_axes() {
        let a = Encoding::new(vec![1.0, 0.0]);
        let b = Encoding::new(vec![0.0, 1.0]);
        assert!((a.distance(&b) - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_distance_dimension_mismatch_is_infinite() {
        let a = Encoding::new(vec![1.0, 0.0]);
        let b = Encoding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.distance(&b), f32::INFINITY);
    }

    #[test]
    fn test_bounding_box_to_rect() {
        let bbox = BoundingBox {
            x: 10.4, y: 20.6, width: 30.0, height: 40.0,
            confidence: 0.9, landmarks: None,
        };
        let rect = bbox.to_rect();
        assert_eq!(rect, FaceRect { top: 21, right: 40, bottom: 61, left: 10 });
        assert_eq!(rect.width(), 30);
        assert_eq!(rect.height(), 40);
    }

    #[test]
    fn test_rect_scaled_doubles_every_edge() {
        let rect = FaceRect { top: 5, right: 30, bottom: 25, left: 10 };
        assert_eq!(rect.scaled(2.0), FaceRect { top: 10, right: 60, bottom: 50, left: 20 });
    }

    #[test]
    fn test_encoding_serializes_as_array() {
        let enc = Encoding::new(vec![0.5, -0.25]);
        assert_eq!(serde_json::to_string(&enc).unwrap(), "[0.5,-0.25]");
    }
}
