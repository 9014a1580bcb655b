//! ONNX Runtime classifier backend.
//!
//! Serves models exported by skl2onnx / onnxmltools with `zipmap=False`: a
//! float input of shape `[N, n_features]`, an int64 `label` output and,
//! for probabilistic models, a float `probabilities` output.

use crate::classifier::{ClassifierError, Inference, MoodModel};
use ndarray::Array2;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use std::path::Path;
use std::sync::Mutex;

const LABEL_OUTPUT: &str = "label";
const PROBABILITY_OUTPUT: &str = "probabilities";

pub struct OnnxMoodModel {
    session: Mutex<Session>,
    n_features: usize,
    has_probabilities: bool,
}

impl OnnxMoodModel {
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let n_features = match session.inputs().first().map(|i| i.dtype()) {
            Some(ValueType::Tensor { shape, .. }) => shape.last().copied().unwrap_or(-1),
            _ => -1,
        };
        if n_features <= 0 {
            return Err(ClassifierError::InvalidModel(format!(
                "{}: input feature dimension is not fixed",
                model_path.display()
            )));
        }

        let output_names: Vec<&str> = session.outputs().iter().map(|o| o.name()).collect();
        if !output_names.contains(&LABEL_OUTPUT) {
            return Err(ClassifierError::InvalidModel(format!(
                "{}: no '{LABEL_OUTPUT}' output (got {output_names:?})",
                model_path.display()
            )));
        }
        let has_probabilities = output_names.contains(&PROBABILITY_OUTPUT);

        tracing::info!(
            path = %model_path.display(),
            n_features,
            outputs = ?output_names,
            "loaded ONNX mood model"
        );

        Ok(Self {
            n_features: n_features as usize,
            has_probabilities,
            session: Mutex::new(session),
        })
    }
}

impl MoodModel for OnnxMoodModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> Option<usize> {
        None
    }

    fn infer(&self, features: &[f32]) -> Result<Inference, ClassifierError> {
        let input = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| ClassifierError::InferenceFailed(format!("input shape: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::InferenceFailed("session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, labels) = outputs[LABEL_OUTPUT]
            .try_extract_tensor::<i64>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("label output: {e}")))?;
        let class_index = labels
            .first()
            .copied()
            .and_then(|l| usize::try_from(l).ok())
            .ok_or_else(|| ClassifierError::InferenceFailed("empty or negative label".into()))?;

        let probabilities = if self.has_probabilities {
            let (_, probs) = outputs[PROBABILITY_OUTPUT]
                .try_extract_tensor::<f32>()
                .map_err(|e| ClassifierError::InferenceFailed(format!("probability output: {e}")))?;
            Some(probs.to_vec())
        } else {
            None
        };

        Ok(Inference {
            class_index,
            probabilities,
        })
    }
}
