use serde::{Deserialize, Serialize};

/// Label returned when the landmark provider finds no face.
pub const NO_FACE_DETECTED: &str = "No Face Detected";
/// Label returned when anything in the prediction chain fails at runtime.
pub const PREDICTION_ERROR: &str = "Error";
/// Label returned when the classifier artifacts could not be loaded.
pub const MODEL_ERROR: &str = "Model Error";

/// A facial landmark in normalized image coordinates ([0, 1] on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
}

impl Keypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Ordered landmarks for exactly one detected face.
///
/// The index of each keypoint is its anatomical identity (face-mesh
/// topology), so order must be preserved end to end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeypointSet(Vec<Keypoint>);

impl KeypointSet {
    pub fn new(points: Vec<Keypoint>) -> Self {
        Self(points)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Keypoint> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Keypoint> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Keypoint] {
        &self.0
    }
}

impl From<Vec<Keypoint>> for KeypointSet {
    fn from(points: Vec<Keypoint>) -> Self {
        Self(points)
    }
}

/// Classifier input: `[mouth_ratio, eye_ratio, brow_distance, x0', y0', ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    pub fn mouth_ratio(&self) -> Option<f64> {
        self.0.first().copied()
    }

    pub fn eye_ratio(&self) -> Option<f64> {
        self.0.get(1).copied()
    }

    pub fn brow_distance(&self) -> Option<f64> {
        self.0.get(2).copied()
    }

    /// Single-precision copy of the leading `n` values, the precision
    /// tree ensembles and ONNX graphs evaluate at.
    pub fn to_f32(&self, n: usize) -> Vec<f32> {
        self.0.iter().take(n).map(|&v| v as f32).collect()
    }
}

/// Whether a confidence value came from a probability distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Calibration {
    /// Confidence is the top class probability.
    Probabilistic,
    /// The model only yields a class index; confidence is pinned to 100.0.
    Uncalibrated,
}

/// Mood label plus confidence percentage in [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodPrediction {
    pub label: String,
    pub confidence: f64,
}

impl MoodPrediction {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    pub fn no_face() -> Self {
        Self::new(NO_FACE_DETECTED, 0.0)
    }

    pub fn error() -> Self {
        Self::new(PREDICTION_ERROR, 0.0)
    }

    pub fn model_error() -> Self {
        Self::new(MODEL_ERROR, 0.0)
    }

    /// True for the distinguished non-classification outcomes.
    pub fn is_sentinel(&self) -> bool {
        is_sentinel_label(&self.label)
    }

    pub fn into_pair(self) -> (String, f64) {
        (self.label, self.confidence)
    }
}

/// True if `label` is one of the sentinel outcomes rather than a mood.
pub fn is_sentinel_label(label: &str) -> bool {
    matches!(label, NO_FACE_DETECTED | PREDICTION_ERROR | MODEL_ERROR)
}

/// Result of running a landmark provider over one image.
#[derive(Debug, Clone, PartialEq)]
pub enum LandmarkOutcome {
    Detected(KeypointSet),
    NoFace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_have_zero_confidence() {
        for p in [
            MoodPrediction::no_face(),
            MoodPrediction::error(),
            MoodPrediction::model_error(),
        ] {
            assert_eq!(p.confidence, 0.0);
            assert!(p.is_sentinel());
        }
    }

    #[test]
    fn test_genuine_label_is_not_sentinel() {
        assert!(!MoodPrediction::new("Happy", 91.5).is_sentinel());
        assert!(!is_sentinel_label("Neutral"));
    }

    #[test]
    fn test_into_pair() {
        let (label, conf) = MoodPrediction::no_face().into_pair();
        assert_eq!(label, "No Face Detected");
        assert_eq!(conf, 0.0);
    }

    #[test]
    fn test_feature_vector_accessors() {
        let v = FeatureVector::new(vec![0.25, 0.5, 0.125, 1.0, -1.0]);
        assert_eq!(v.mouth_ratio(), Some(0.25));
        assert_eq!(v.eye_ratio(), Some(0.5));
        assert_eq!(v.brow_distance(), Some(0.125));
        assert_eq!(v.to_f32(4), vec![0.25f32, 0.5, 0.125, 1.0]);
        assert_eq!(v.to_f32(99).len(), 5);
    }
}
