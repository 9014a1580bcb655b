//! Planar geometry over normalized keypoints.

use crate::types::Keypoint;

/// Euclidean distance between two keypoints in normalized image space.
pub fn distance(a: &Keypoint, b: &Keypoint) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}
