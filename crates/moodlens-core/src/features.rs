//! Geometric feature extraction from face-mesh keypoints.
//!
//! Produces `[mouth_ratio, eye_ratio, brow_distance, x0', y0', x1', y1', ...]`
//! where the primed coordinates are re-centered on the nose tip and scaled by
//! the outer eye-corner span. Trained classifiers depend on this exact layout,
//! so both the live predictor and the dataset builder go through
//! [`extract_features`].

use crate::geometry::distance;
use crate::types::{FeatureVector, Keypoint, KeypointSet};
use thiserror::Error;

// --- Face-mesh landmark indices ---
const UPPER_INNER_LIP: usize = 13;
const LOWER_INNER_LIP: usize = 14;
const MOUTH_LEFT_CORNER: usize = 78;
const MOUTH_RIGHT_CORNER: usize = 308;
const LEFT_EYE_UPPER_LID: usize = 159;
const LEFT_EYE_LOWER_LID: usize = 145;
const LEFT_EYE_OUTER_CORNER: usize = 33;
const LEFT_EYE_INNER_CORNER: usize = 133;
const LEFT_BROW: usize = 70;
const NOSE_TIP: usize = 1;
const RIGHT_EYE_OUTER_CORNER: usize = 263;

/// Guards ratio denominators against a degenerate (zero) span.
pub const EPSILON: f64 = 1e-6;

/// Maximum number of keypoints flattened on the live path. Iris refinement
/// appends 10 extra points to the 468-point mesh; they are dropped here.
pub const LIVE_KEYPOINT_CAP: usize = 468;

/// Number of scalar features ahead of the flattened coordinates.
pub const SCALAR_FEATURES: usize = 3;

/// How many keypoints are flattened into the vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypointLimit {
    /// Serving path: at most [`LIVE_KEYPOINT_CAP`] keypoints.
    Live,
    /// Offline dataset path: every keypoint the provider returned.
    All,
}

impl KeypointLimit {
    fn cap(self) -> usize {
        match self {
            KeypointLimit::Live => LIVE_KEYPOINT_CAP,
            KeypointLimit::All => usize::MAX,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum FeatureError {
    #[error("keypoint {index} missing: face has only {available} keypoints")]
    MissingKeypoint { index: usize, available: usize },
}

/// Expected vector length for `keypoints` landmarks under `limit`.
pub fn feature_len(keypoints: usize, limit: KeypointLimit) -> usize {
    SCALAR_FEATURES + 2 * keypoints.min(limit.cap())
}

/// Convert one face's keypoints into a feature vector.
pub fn extract_features(
    keypoints: &KeypointSet,
    limit: KeypointLimit,
) -> Result<FeatureVector, FeatureError> {
    let kp = |index: usize| -> Result<&Keypoint, FeatureError> {
        keypoints.get(index).ok_or(FeatureError::MissingKeypoint {
            index,
            available: keypoints.len(),
        })
    };

    let mouth_ratio = distance(kp(UPPER_INNER_LIP)?, kp(LOWER_INNER_LIP)?)
        / (distance(kp(MOUTH_LEFT_CORNER)?, kp(MOUTH_RIGHT_CORNER)?) + EPSILON);
    let eye_ratio = distance(kp(LEFT_EYE_UPPER_LID)?, kp(LEFT_EYE_LOWER_LID)?)
        / (distance(kp(LEFT_EYE_OUTER_CORNER)?, kp(LEFT_EYE_INNER_CORNER)?) + EPSILON);
    let brow_distance = distance(kp(LEFT_BROW)?, kp(LEFT_EYE_UPPER_LID)?);

    let reference = *kp(NOSE_TIP)?;
    let scale = distance(kp(LEFT_EYE_OUTER_CORNER)?, kp(RIGHT_EYE_OUTER_CORNER)?) + EPSILON;

    let mut values = Vec::with_capacity(feature_len(keypoints.len(), limit));
    values.extend([mouth_ratio, eye_ratio, brow_distance]);
    for p in keypoints.iter().take(limit.cap()) {
        values.push((p.x - reference.x) / scale);
        values.push((p.y - reference.y) / scale);
    }

    Ok(FeatureVector::new(values))
}
