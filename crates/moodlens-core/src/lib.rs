//! moodlens-core — Facial mood recognition engine.
//!
//! SCRFD locates the face, a face-mesh model places the landmarks, and a
//! trained gradient-boosted classifier maps normalized landmark geometry to
//! a mood label. All models run on CPU via ONNX Runtime, except XGBoost JSON
//! models which are evaluated natively.

pub mod booster;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod features;
pub mod frame;
pub mod geometry;
pub mod landmarks;
pub mod onnx;
pub mod predictor;
pub mod types;

pub use classifier::{LabelDecoder, MoodClassifier, MoodModel};
pub use config::{default_model_dir, ModelFiles};
pub use dataset::{build_splits, DatasetBuilder, DatasetStats};
pub use features::{extract_features, KeypointLimit};
pub use frame::{ChannelOrder, Frame};
pub use landmarks::{FaceMeshProvider, LandmarkProvider};
pub use predictor::{MoodPredictor, PipelineState, PredictOutcome};
pub use types::{
    Calibration, FeatureVector, Keypoint, KeypointSet, LandmarkOutcome, MoodPrediction,
};
