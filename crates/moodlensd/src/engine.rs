use moodlens_core::{Frame, MoodPrediction, MoodPredictor, PipelineState};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("prediction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Clone-safe handle to the shared predictor.
///
/// Decoding and inference are CPU bound, so every request runs on tokio's
/// blocking pool. The predictor serializes model access internally.
#[derive(Clone)]
pub struct EngineHandle {
    predictor: Arc<MoodPredictor>,
}

impl EngineHandle {
    pub fn new(predictor: MoodPredictor) -> Self {
        Self {
            predictor: Arc::new(predictor),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.predictor.state()
    }

    /// Load models ahead of the first request.
    pub async fn warm_up(&self) -> Result<PipelineState, EngineError> {
        let predictor = Arc::clone(&self.predictor);
        Ok(tokio::task::spawn_blocking(move || predictor.warm_up()).await?)
    }

    /// Classify an encoded image. Undecodable bytes yield `Error`, or
    /// `Model Error` when the classifier is unavailable.
    pub async fn predict_bytes(&self, bytes: Vec<u8>) -> Result<MoodPrediction, EngineError> {
        let predictor = Arc::clone(&self.predictor);
        let prediction = tokio::task::spawn_blocking(move || match Frame::decode(&bytes) {
            Ok(frame) => predictor.predict_mood(&frame),
            Err(e) => {
                tracing::warn!(error = %e, len = bytes.len(), "could not decode upload");
                predictor.unreadable_input()
            }
        })
        .await?;
        Ok(prediction)
    }

    /// Classify an image on the local filesystem.
    pub async fn predict_file(&self, path: PathBuf) -> Result<MoodPrediction, EngineError> {
        let predictor = Arc::clone(&self.predictor);
        let prediction = tokio::task::spawn_blocking(move || match Frame::open(&path) {
            Ok(frame) => predictor.predict_mood(&frame),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "could not read image");
                predictor.unreadable_input()
            }
        })
        .await?;
        Ok(prediction)
    }
}
