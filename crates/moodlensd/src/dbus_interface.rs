use crate::engine::EngineHandle;
use moodlens_advice::{AdviceResponder, GeminiClient};
use moodlens_core::MoodPrediction;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.freedesktop.MoodLens1";
pub const OBJECT_PATH: &str = "/org/freedesktop/MoodLens1";

/// JSON body returned by `Predict` and `PredictFile`.
#[derive(Debug, Serialize)]
struct PredictionReply {
    mood: String,
    confidence: f64,
    suggestion: String,
}

/// D-Bus interface for the MoodLens daemon.
///
/// Bus name: org.freedesktop.MoodLens1
/// Object path: /org/freedesktop/MoodLens1
pub struct MoodLensService {
    engine: EngineHandle,
    advice: Arc<AdviceResponder<GeminiClient>>,
    max_image_bytes: usize,
}

impl MoodLensService {
    pub fn new(
        engine: EngineHandle,
        advice: AdviceResponder<GeminiClient>,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            engine,
            advice: Arc::new(advice),
            max_image_bytes,
        }
    }

    async fn reply(&self, prediction: MoodPrediction, role: &str) -> zbus::fdo::Result<String> {
        let suggestion = self.advice.advise(&prediction.label, role).await;
        tracing::info!(
            mood = %prediction.label,
            confidence = prediction.confidence,
            role,
            "prediction served"
        );
        let (mood, confidence) = prediction.into_pair();
        serde_json::to_string(&PredictionReply {
            mood,
            confidence,
            suggestion,
        })
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    async fn handle_predict(&self, image: Vec<u8>, role: &str) -> zbus::fdo::Result<String> {
        if image.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("No image uploaded".into()));
        }
        if image.len() > self.max_image_bytes {
            return Err(zbus::fdo::Error::LimitsExceeded(format!(
                "image is {} bytes, limit is {}",
                image.len(),
                self.max_image_bytes
            )));
        }
        let prediction = self
            .engine
            .predict_bytes(image)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        self.reply(prediction, role).await
    }

    async fn handle_predict_file(&self, path: &str, role: &str) -> zbus::fdo::Result<String> {
        if path.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("No image uploaded".into()));
        }
        let prediction = self
            .engine
            .predict_file(PathBuf::from(path))
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        self.reply(prediction, role).await
    }

    fn status_json(&self) -> String {
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "pipeline": self.engine.state().to_string(),
            "advice_configured": self.advice.is_configured(),
            "max_image_bytes": self.max_image_bytes,
        })
        .to_string()
    }
}

#[interface(name = "org.freedesktop.MoodLens1")]
impl MoodLensService {
    /// Classify an encoded image and return `{mood, confidence, suggestion}`.
    async fn predict(&self, image: Vec<u8>, role: &str) -> zbus::fdo::Result<String> {
        tracing::debug!(bytes = image.len(), role, "predict requested");
        self.handle_predict(image, role).await
    }

    /// Same as `Predict` for an image readable by the daemon.
    async fn predict_file(&self, path: &str, role: &str) -> zbus::fdo::Result<String> {
        tracing::debug!(path, role, "predict_file requested");
        self.handle_predict_file(path, role).await
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.status_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodlens_core::{ModelFiles, MoodPredictor};

    fn service(max_image_bytes: usize) -> MoodLensService {
        let engine = EngineHandle::new(MoodPredictor::new(ModelFiles {
            model_dir: PathBuf::from("/nonexistent/moodlens"),
            ..ModelFiles::default()
        }));
        MoodLensService::new(engine, AdviceResponder::unconfigured(), max_image_bytes)
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let err = service(1024).handle_predict(Vec::new(), "Friend").await.unwrap_err();
        assert!(matches!(err, zbus::fdo::Error::InvalidArgs(msg) if msg == "No image uploaded"));
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let err = service(4).handle_predict(vec![0u8; 5], "Friend").await.unwrap_err();
        assert!(matches!(err, zbus::fdo::Error::LimitsExceeded(_)));
    }

    #[tokio::test]
    async fn test_undecodable_upload_without_models_reply() {
        let body = service(1024)
            .handle_predict(b"garbage".to_vec(), "Roaster")
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["mood"], "Model Error");
        assert_eq!(json["confidence"], 0.0);
        assert_eq!(json["suggestion"], "Could not detect face properly.");
    }

    #[tokio::test]
    async fn test_sentinel_reply_skips_advice() {
        let body = service(1024)
            .reply(MoodPrediction::no_face(), "Friend")
            .await
            .unwrap();
        assert_eq!(
            body,
            concat!(
                r#"{"mood":"No Face Detected","confidence":0.0,"#,
                r#""suggestion":"Could not detect face properly."}"#
            )
        );
    }

    #[tokio::test]
    async fn test_every_core_sentinel_skips_advice() {
        let service = service(1024);
        for prediction in [
            MoodPrediction::no_face(),
            MoodPrediction::error(),
            MoodPrediction::model_error(),
        ] {
            assert!(prediction.is_sentinel());
            let body = service.reply(prediction, "Poet").await.unwrap();
            let json: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(json["suggestion"], "Could not detect face properly.");
        }
    }

    #[tokio::test]
    async fn test_mood_reply_uses_fallback_without_gemini() {
        let body = service(1024)
            .reply(MoodPrediction::new("Happy", 91.25), "Friend")
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["mood"], "Happy");
        assert_eq!(json["confidence"], 91.25);
        assert_eq!(json["suggestion"], "Great energy! Keep crushing it!");
    }

    #[test]
    fn test_status_json() {
        let json: serde_json::Value = serde_json::from_str(&service(1024).status_json()).unwrap();
        assert_eq!(json["pipeline"], "unloaded");
        assert_eq!(json["advice_configured"], false);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
