//! End-to-end mood prediction for one image.
//!
//! [`MoodPredictor`] owns the landmark provider and the classifier. Both are
//! loaded lazily, exactly once: the first caller runs the loader while any
//! concurrent callers wait on the same [`OnceLock`] and then reuse the
//! result. A failed load is remembered, not retried.
//!
//! [`MoodPredictor::predict_mood`] is the error boundary: it never panics
//! outward and folds every failure into a sentinel [`MoodPrediction`].

use crate::classifier::{Classification, ClassifierError, MoodClassifier};
use crate::features::{extract_features, FeatureError, KeypointLimit};
use crate::frame::{Frame, FrameError};
use crate::landmarks::{LandmarkError, LandmarkProvider};
use crate::types::{LandmarkOutcome, MoodPrediction};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use thiserror::Error;

/// Source of the pipeline's heavyweight resources.
pub trait ResourceLoader: Send + Sync {
    fn load_classifier(&self) -> Result<MoodClassifier, ClassifierError>;
    fn load_landmarks(&self) -> Result<Box<dyn LandmarkProvider>, LandmarkError>;
}

/// Lifecycle of the lazily loaded resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unloaded,
    Loading,
    Loaded,
    /// The classifier could not be loaded; every prediction is `Model Error`.
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineState::Unloaded => "unloaded",
            PipelineState::Loading => "loading",
            PipelineState::Loaded => "loaded",
            PipelineState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("classifier unavailable: {0}")]
    ModelUnavailable(String),
    #[error("landmark provider unavailable: {0}")]
    LandmarksUnavailable(String),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    #[error("landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("features: {0}")]
    Features(#[from] FeatureError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Typed result of a prediction that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictOutcome {
    Classified(Classification),
    NoFace,
}

struct Resources {
    classifier: Result<MoodClassifier, ClassifierError>,
    landmarks: Result<Box<dyn LandmarkProvider>, LandmarkError>,
}

pub struct MoodPredictor {
    loader: Box<dyn ResourceLoader>,
    loading: AtomicBool,
    resources: OnceLock<Resources>,
}

impl MoodPredictor {
    pub fn new(loader: impl ResourceLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            loading: AtomicBool::new(false),
            resources: OnceLock::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        match self.resources.get() {
            Some(r) if r.classifier.is_ok() => PipelineState::Loaded,
            Some(_) => PipelineState::Failed,
            None if self.loading.load(Ordering::Acquire) => PipelineState::Loading,
            None => PipelineState::Unloaded,
        }
    }

    /// Load resources now instead of on the first prediction.
    pub fn warm_up(&self) -> PipelineState {
        self.resources();
        self.state()
    }

    fn resources(&self) -> &Resources {
        self.resources.get_or_init(|| {
            self.loading.store(true, Ordering::Release);
            tracing::info!("loading prediction resources");

            let classifier =
                panic::catch_unwind(AssertUnwindSafe(|| self.loader.load_classifier()))
                    .unwrap_or_else(|p| Err(ClassifierError::LoadPanicked(panic_message(p))));
            if let Err(e) = &classifier {
                tracing::error!(
                    error = %e,
                    "classifier failed to load; predictions will report Model Error"
                );
            }
            let landmarks =
                panic::catch_unwind(AssertUnwindSafe(|| self.loader.load_landmarks()))
                        .unwrap_or_else(|p| Err(LandmarkError::LoadPanicked(panic_message(p))));
            if let Err(e) = &landmarks {
                tracing::error!(error = %e, "landmark provider failed to load");
            }

            Resources {
                classifier,
                landmarks,
            }
        })
    }

    /// Sentinel for input that never became a [`Frame`], e.g. an undecodable
    /// upload: `Model Error` when the classifier is unavailable, `Error`
    /// otherwise.
    pub fn unreadable_input(&self) -> MoodPrediction {
        match self.warm_up() {
            PipelineState::Failed => MoodPrediction::model_error(),
            _ => MoodPrediction::error(),
        }
    }

    /// Run the full pipeline and return the typed outcome.
    pub fn predict_detailed(&self, frame: &Frame) -> Result<PredictOutcome, PredictError> {
        let resources = self.resources();
        let classifier = resources
            .classifier
            .as_ref()
            .map_err(|e| PredictError::ModelUnavailable(e.to_string()))?;
        let landmarks = resources
            .landmarks
            .as_ref()
            .map_err(|e| PredictError::LandmarksUnavailable(e.to_string()))?;

        let rgb = frame.to_rgb()?;
        let keypoints = match landmarks.detect(&rgb)? {
            LandmarkOutcome::NoFace => return Ok(PredictOutcome::NoFace),
            LandmarkOutcome::Detected(k) => k,
        };

        let features = extract_features(&keypoints, KeypointLimit::Live)?;
        let classification = classifier.classify(&features)?;
        Ok(PredictOutcome::Classified(classification))
    }

    /// Predict a mood, folding every non-success into a sentinel:
    /// `No Face Detected`, `Model Error` or `Error`, all with zero confidence.
    pub fn predict_mood(&self, frame: &Frame) -> MoodPrediction {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.predict_detailed(frame)));

        match result {
            Ok(Ok(PredictOutcome::Classified(c))) => {
                tracing::debug!(
                    mood = %c.prediction.label,
                    confidence = c.prediction.confidence,
                    calibration = ?c.calibration,
                    "mood predicted"
                );
                c.prediction
            }
            Ok(Ok(PredictOutcome::NoFace)) => {
                tracing::debug!("no face detected");
                MoodPrediction::no_face()
            }
            Ok(Err(PredictError::ModelUnavailable(_))) => MoodPrediction::model_error(),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "prediction failed");
                MoodPrediction::error()
            }
            Err(payload) => {
                tracing::error!(panic = %panic_message(payload), "prediction panicked");
                MoodPrediction::error()
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Inference, LabelDecoder, MoodModel};
    use crate::frame::ChannelOrder;
    use crate::types::{Calibration, Keypoint, KeypointSet};
    use image::RgbImage;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Face(usize),
        NoFace,
        Fail,
        Panic,
    }

    struct StubProvider {
        behaviour: Behaviour,
        seen_pixel: Arc<std::sync::Mutex<Option<[u8; 3]>>>,
    }

    impl LandmarkProvider for StubProvider {
        fn detect(&self, image: &RgbImage) -> Result<LandmarkOutcome, LandmarkError> {
            *self.seen_pixel.lock().unwrap() = Some(image.get_pixel(0, 0).0);
            match self.behaviour {
                Behaviour::Face(n) => Ok(LandmarkOutcome::Detected(face_points(n))),
                Behaviour::NoFace => Ok(LandmarkOutcome::NoFace),
                Behaviour::Fail => Err(LandmarkError::InferenceFailed("boom".into())),
                Behaviour::Panic => panic!("provider exploded"),
            }
        }
    }

    fn face_points(n: usize) -> KeypointSet {
        (0..n)
            .map(|i| Keypoint::new(0.3 + (i % 17) as f64 * 0.01, 0.4 + (i % 13) as f64 * 0.01))
            .collect::<Vec<_>>()
            .into()
    }

    struct StubModel {
        n_features: usize,
        seen: Arc<AtomicUsize>,
    }

    impl MoodModel for StubModel {
        fn n_features(&self) -> usize {
            self.n_features
        }
        fn n_classes(&self) -> Option<usize> {
            Some(2)
        }
        fn infer(&self, features: &[f32]) -> Result<Inference, ClassifierError> {
            self.seen.store(features.len(), Ordering::SeqCst);
            Ok(Inference {
                class_index: 1,
                probabilities: Some(vec![0.125, 0.875]),
            })
        }
    }

    struct StubLoader {
        behaviour: Behaviour,
        classifier_ok: bool,
        landmarks_ok: bool,
        n_features: usize,
        loads: Arc<AtomicUsize>,
        seen_features: Arc<AtomicUsize>,
        seen_pixel: Arc<std::sync::Mutex<Option<[u8; 3]>>>,
    }

    impl StubLoader {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                classifier_ok: true,
                landmarks_ok: true,
                n_features: 3 + 2 * 468,
                loads: Arc::default(),
                seen_features: Arc::default(),
                seen_pixel: Arc::default(),
            }
        }
    }

    impl ResourceLoader for StubLoader {
        fn load_classifier(&self) -> Result<MoodClassifier, ClassifierError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if !self.classifier_ok {
                return Err(ClassifierError::ModelNotFound("mood_model.json".into()));
            }
            let model = StubModel {
                n_features: self.n_features,
                seen: self.seen_features.clone(),
            };
            let decoder = LabelDecoder::new(vec!["Sad".into(), "Happy".into()]);
            MoodClassifier::new(Box::new(model), decoder)
        }

        fn load_landmarks(&self) -> Result<Box<dyn LandmarkProvider>, LandmarkError> {
            if !self.landmarks_ok {
                return Err(LandmarkError::ModelNotFound("face_landmark.onnx".into()));
            }
            Ok(Box::new(StubProvider {
                behaviour: self.behaviour,
                seen_pixel: self.seen_pixel.clone(),
            }))
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![10, 20, 30].repeat(4), 2, 2, ChannelOrder::Rgb)
    }

    #[test]
    fn test_successful_prediction() {
        let predictor = MoodPredictor::new(StubLoader::new(Behaviour::Face(468)));
        let p = predictor.predict_mood(&frame());
        assert_eq!(p.into_pair(), ("Happy".to_string(), 87.5));
    }

    #[test]
    fn test_detailed_reports_calibration() {
        let predictor = MoodPredictor::new(StubLoader::new(Behaviour::Face(468)));
        match predictor.predict_detailed(&frame()).unwrap() {
            PredictOutcome::Classified(c) => assert_eq!(c.calibration, Calibration::Probabilistic),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_no_face_sentinel() {
        let predictor = MoodPredictor::new(StubLoader::new(Behaviour::NoFace));
        assert_eq!(
            predictor.predict_mood(&frame()).into_pair(),
            ("No Face Detected".to_string(), 0.0)
        );
    }

    #[test]
    fn test_model_error_sentinel_for_any_input() {
        let mut loader = StubLoader::new(Behaviour::Face(468));
        loader.classifier_ok = false;
        let predictor = MoodPredictor::new(loader);

        assert_eq!(predictor.predict_mood(&frame()), MoodPrediction::model_error());
        let garbage = Frame::new(vec![1, 2], 7, 7, ChannelOrder::Bgr);
        assert_eq!(
            predictor.predict_mood(&garbage).into_pair(),
            ("Model Error".to_string(), 0.0)
        );
        assert_eq!(predictor.state(), PipelineState::Failed);
    }

    #[test]
    fn test_failed_load_is_not_retried() {
        let mut loader = StubLoader::new(Behaviour::Face(468));
        loader.classifier_ok = false;
        let loads = loader.loads.clone();
        let predictor = MoodPredictor::new(loader);
        for _ in 0..3 {
            predictor.predict_mood(&frame());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_landmark_load_failure_is_error() {
        let mut loader = StubLoader::new(Behaviour::Face(468));
        loader.landmarks_ok = false;
        let predictor = MoodPredictor::new(loader);
        assert_eq!(predictor.predict_mood(&frame()), MoodPrediction::error());
        assert_eq!(predictor.state(), PipelineState::Loaded);
    }

    #[test]
    fn test_provider_failure_is_error() {
        let predictor = MoodPredictor::new(StubLoader::new(Behaviour::Fail));
        assert_eq!(predictor.predict_mood(&frame()), MoodPrediction::error());
    }

    #[test]
    fn test_provider_panic_is_contained() {
        let predictor = MoodPredictor::new(StubLoader::new(Behaviour::Panic));
        assert_eq!(predictor.predict_mood(&frame()), MoodPrediction::error());
    }

    #[test]
    fn test_malformed_frame_is_error() {
        let predictor = MoodPredictor::new(StubLoader::new(Behaviour::Face(468)));
        let bad = Frame::new(vec![0; 5], 2, 2, ChannelOrder::Rgb);
        assert_eq!(predictor.predict_mood(&bad), MoodPrediction::error());
    }

    #[test]
    fn test_too_few_keypoints_is_error() {
        let predictor = MoodPredictor::new(StubLoader::new(Behaviour::Face(50)));
        assert_eq!(predictor.predict_mood(&frame()), MoodPrediction::error());
    }

    #[test]
    fn test_refined_mesh_is_capped_and_truncated() {
        let mut loader = StubLoader::new(Behaviour::Face(478));
        loader.n_features = 900;
        let seen = loader.seen_features.clone();
        let predictor = MoodPredictor::new(loader);
        assert_eq!(predictor.predict_mood(&frame()).label, "Happy");
        assert_eq!(seen.load(Ordering::SeqCst), 900);
    }

    #[test]
    fn test_bgr_frame_reaches_provider_as_rgb() {
        let loader = StubLoader::new(Behaviour::NoFace);
        let pixel = loader.seen_pixel.clone();
        let predictor = MoodPredictor::new(loader);
        let bgr = Frame::new(vec![30, 20, 10].repeat(4), 2, 2, ChannelOrder::Bgr);
        predictor.predict_mood(&bgr);
        assert_eq!(*pixel.lock().unwrap(), Some([10, 20, 30]));
    }

    #[test]
    fn test_state_transitions() {
        let predictor = MoodPredictor::new(StubLoader::new(Behaviour::NoFace));
        assert_eq!(predictor.state(), PipelineState::Unloaded);
        assert_eq!(predictor.warm_up(), PipelineState::Loaded);
        assert_eq!(predictor.state().to_string(), "loaded");
    }

    #[test]
    fn test_concurrent_first_use_loads_once() {
        let loader = StubLoader::new(Behaviour::Face(468));
        let loads = loader.loads.clone();
        let predictor = MoodPredictor::new(loader);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| predictor.predict_mood(&frame())))
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap().label, "Happy");
            }
        });
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    struct PanickingLoader {
        loads: Arc<AtomicUsize>,
    }

    impl ResourceLoader for PanickingLoader {
        fn load_classifier(&self) -> Result<MoodClassifier, ClassifierError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            panic!("model file is corrupt");
        }

        fn load_landmarks(&self) -> Result<Box<dyn LandmarkProvider>, LandmarkError> {
            panic!("landmark model is corrupt");
        }
    }

    #[test]
    fn test_panicking_loader_is_memoized_as_failed() {
        let loads = Arc::new(AtomicUsize::new(0));
        let predictor = MoodPredictor::new(PanickingLoader {
            loads: loads.clone(),
        });

        for _ in 0..3 {
            assert_eq!(predictor.predict_mood(&frame()), MoodPrediction::model_error());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(predictor.state(), PipelineState::Failed);
        assert_eq!(predictor.warm_up(), PipelineState::Failed);
    }

    #[test]
    fn test_unreadable_input_sentinel() {
        let mut loader = StubLoader::new(Behaviour::Face(468));
        loader.classifier_ok = false;
        assert_eq!(
            MoodPredictor::new(loader).unreadable_input(),
            MoodPrediction::model_error()
        );

        let predictor = MoodPredictor::new(StubLoader::new(Behaviour::Face(468)));
        assert_eq!(predictor.unreadable_input(), MoodPrediction::error());
        assert_eq!(predictor.state(), PipelineState::Loaded);
    }
}
