//! Mood classifier adapter.
//!
//! Wraps an opaque pre-trained model and its label decoder behind
//! [`MoodClassifier::classify`]. Backends implement [`MoodModel`]; the native
//! gradient-boosted tree evaluator and the ONNX Runtime backend ship with the
//! crate.

use crate::booster::GradientBoostedModel;
use crate::onnx::OnnxMoodModel;
use crate::types::{Calibration, FeatureVector, MoodPrediction};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("label decoder has {decoder} classes but model predicts {model}")]
    LabelMismatch { decoder: usize, model: usize },
    #[error("model expects {expected} features, got {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },
    #[error("class index {0} is outside the label decoder")]
    UnknownClass(usize),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("loader panicked: {0}")]
    LoadPanicked(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Raw model output for one feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub class_index: usize,
    /// Per-class probabilities, when the model produces them.
    pub probabilities: Option<Vec<f32>>,
}

/// A pre-trained multi-class model.
pub trait MoodModel: Send + Sync {
    /// Number of features the model was trained on.
    fn n_features(&self) -> usize;

    /// Number of classes, if the model records it.
    fn n_classes(&self) -> Option<usize>;

    /// Classify exactly `n_features()` values.
    fn infer(&self, features: &[f32]) -> Result<Inference, ClassifierError>;
}

/// Maps class indices back to mood names.
///
/// Accepts either a bare JSON array or `{"classes": [...]}`, the shape of a
/// scikit-learn `LabelEncoder.classes_` export.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelDecoder {
    classes: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    Bare(Vec<String>),
    Wrapped { classes: Vec<String> },
}

impl LabelDecoder {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let classes = match serde_json::from_str::<LabelFile>(json)? {
            LabelFile::Bare(c) | LabelFile::Wrapped { classes: c } => c,
        };
        if classes.is_empty() {
            return Err(ClassifierError::InvalidModel("label decoder has no classes".into()));
        }
        Ok(Self { classes })
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::ModelNotFound(path.display().to_string()));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn decode(&self, index: usize) -> Result<&str, ClassifierError> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(ClassifierError::UnknownClass(index))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// A successful classification and how its confidence was derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub prediction: MoodPrediction,
    pub calibration: Calibration,
}

/// Model + decoder pair, loaded once and shared read-only.
pub struct MoodClassifier {
    model: Box<dyn MoodModel>,
    decoder: LabelDecoder,
}

impl std::fmt::Debug for MoodClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoodClassifier")
            .field("n_features", &self.model.n_features())
            .field("classes", &self.decoder.classes)
            .finish()
    }
}

impl MoodClassifier {
    /// Pair a model with its decoder; a class-count mismatch is rejected.
    pub fn new(model: Box<dyn MoodModel>, decoder: LabelDecoder) -> Result<Self, ClassifierError> {
        if let Some(n) = model.n_classes() {
            if n != decoder.len() {
                return Err(ClassifierError::LabelMismatch {
                    decoder: decoder.len(),
                    model: n,
                });
            }
        }
        Ok(Self { model, decoder })
    }

    /// Load a model file (`.json` XGBoost dump or `.onnx`) and a label file.
    pub fn load(model_path: &Path, decoder_path: &Path) -> Result<Self, ClassifierError> {
        let model: Box<dyn MoodModel> = match model_path.extension().and_then(|e| e.to_str()) {
            Some("onnx") => Box::new(OnnxMoodModel::load(model_path)?),
            Some("json") => Box::new(GradientBoostedModel::load(model_path)?),
            _ => {
                return Err(ClassifierError::InvalidModel(format!(
                    "unsupported model format: {} (expected .json or .onnx)",
                    model_path.display()
                )))
            }
        };
        let decoder = LabelDecoder::load(decoder_path)?;

        let classifier = Self::new(model, decoder)?;
        tracing::info!(
            model = %model_path.display(),
            n_features = classifier.n_features(),
            classes = ?classifier.decoder.classes,
            "mood classifier loaded"
        );
        Ok(classifier)
    }

    pub fn n_features(&self) -> usize {
        self.model.n_features()
    }

    pub fn decoder(&self) -> &LabelDecoder {
        &self.decoder
    }

    /// Classify a feature vector.
    ///
    /// Vectors longer than the model's input are truncated to the leading
    /// `n_features()` values; shorter ones are rejected.
    pub fn classify(&self, features: &FeatureVector) -> Result<Classification, ClassifierError> {
        let expected = self.model.n_features();
        if features.len() < expected {
            return Err(ClassifierError::FeatureCountMismatch {
                expected,
                actual: features.len(),
            });
        }
        if features.len() > expected {
            tracing::trace!(from = features.len(), to = expected, "truncating feature vector");
        }

        let inference = self.model.infer(&features.to_f32(expected))?;
        let label = self.decoder.decode(inference.class_index)?;

        let (confidence, calibration) = match &inference.probabilities {
            Some(probs) => (confidence_percent(probs), Calibration::Probabilistic),
            None => (100.0, Calibration::Uncalibrated),
        };

        Ok(Classification {
            prediction: MoodPrediction::new(label, confidence),
            calibration,
        })
    }
}

/// Highest probability as a percentage rounded to two decimals.
fn confidence_percent(probabilities: &[f32]) -> f64 {
    let top = probabilities
        .iter()
        .copied()
        .filter(|p| p.is_finite())
        .fold(0.0f32, f32::max) as f64;
    ((top * 100.0 * 100.0).round() / 100.0).clamp(0.0, 100.0)
}
