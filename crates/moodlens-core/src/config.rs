use crate::classifier::{ClassifierError, MoodClassifier};
use crate::landmarks::{FaceMeshProvider, LandmarkError, LandmarkProvider};
use crate::predictor::ResourceLoader;
use std::path::{Path, PathBuf};

/// Locations of the artifacts the prediction pipeline loads at startup.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    /// Directory the relative file names below resolve against.
    pub model_dir: PathBuf,
    /// Trained classifier (`.json` XGBoost model or `.onnx`).
    pub classifier: PathBuf,
    /// Label decoder (JSON list of class names).
    pub label_encoder: PathBuf,
    /// SCRFD face detection model.
    pub face_detector: PathBuf,
    /// Face-mesh landmark model.
    pub face_mesh: PathBuf,
    /// Minimum face-presence probability reported by the mesh model.
    pub presence_threshold: f32,
}

impl Default for ModelFiles {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            classifier: PathBuf::from("mood_model.json"),
            label_encoder: PathBuf::from("label_encoder.json"),
            face_detector: PathBuf::from("det_10g.onnx"),
            face_mesh: PathBuf::from("face_landmark.onnx"),
            presence_threshold: 0.5,
        }
    }
}

impl ModelFiles {
    /// Load from `MOODLENS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_dir: env_path("MOODLENS_MODEL_DIR").unwrap_or(defaults.model_dir),
            classifier: env_path("MOODLENS_CLASSIFIER").unwrap_or(defaults.classifier),
            label_encoder: env_path("MOODLENS_LABEL_ENCODER").unwrap_or(defaults.label_encoder),
            face_detector: env_path("MOODLENS_FACE_DETECTOR").unwrap_or(defaults.face_detector),
            face_mesh: env_path("MOODLENS_FACE_MESH").unwrap_or(defaults.face_mesh),
            presence_threshold: std::env::var("MOODLENS_PRESENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.presence_threshold),
        }
    }

    /// Resolve a configured file against `model_dir` (absolute paths win).
    pub fn resolve(&self, file: &Path) -> PathBuf {
        self.model_dir.join(file)
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.resolve(&self.classifier)
    }

    pub fn label_encoder_path(&self) -> PathBuf {
        self.resolve(&self.label_encoder)
    }

    pub fn face_detector_path(&self) -> PathBuf {
        self.resolve(&self.face_detector)
    }

    pub fn face_mesh_path(&self) -> PathBuf {
        self.resolve(&self.face_mesh)
    }

    /// Load only the landmark stage (used by the dataset builder).
    pub fn load_face_mesh(&self) -> Result<FaceMeshProvider, LandmarkError> {
        FaceMeshProvider::load(
            &self.face_detector_path(),
            &self.face_mesh_path(),
            self.presence_threshold,
        )
    }
}

impl ResourceLoader for ModelFiles {
    fn load_classifier(&self) -> Result<MoodClassifier, ClassifierError> {
        MoodClassifier::load(&self.classifier_path(), &self.label_encoder_path())
    }

    fn load_landmarks(&self) -> Result<Box<dyn LandmarkProvider>, LandmarkError> {
        Ok(Box::new(self.load_face_mesh()?))
    }
}

/// `$XDG_DATA_HOME/moodlens/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("moodlens/models")
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file_names() {
        let files = ModelFiles {
            model_dir: PathBuf::from("/models"),
            ..ModelFiles::default()
        };
        assert_eq!(files.classifier_path(), PathBuf::from("/models/mood_model.json"));
        assert_eq!(files.label_encoder_path(), PathBuf::from("/models/label_encoder.json"));
        assert_eq!(files.face_detector_path(), PathBuf::from("/models/det_10g.onnx"));
        assert_eq!(files.face_mesh_path(), PathBuf::from("/models/face_landmark.onnx"));
    }

    #[test]
    fn test_absolute_paths_ignore_model_dir() {
        let files = ModelFiles {
            model_dir: PathBuf::from("/models"),
            classifier: PathBuf::from("/srv/custom.onnx"),
            ..ModelFiles::default()
        };
        assert_eq!(files.classifier_path(), PathBuf::from("/srv/custom.onnx"));
    }

    #[test]
    fn test_missing_classifier_fails_to_load() {
        let files = ModelFiles {
            model_dir: PathBuf::from("/nonexistent"),
            ..ModelFiles::default()
        };
        assert!(matches!(
            files.load_classifier(),
            Err(ClassifierError::ModelNotFound(_))
        ));
    }
}
