//! Face-mesh landmark provider.
//!
//! Two stages, matching a static-image face mesh limited to one face: SCRFD
//! picks the most confident face box, then a face-landmark network regresses
//! 468 (or 478 with iris refinement) keypoints on a square crop around it.
//! Keypoints are returned in normalized coordinates of the full image.

use crate::detector::{DetectorError, FaceBox, FaceDetector};
use crate::types::{Keypoint, KeypointSet, LandmarkOutcome};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

const MESH_INPUT_SIZE: u32 = 192;
/// Crop side relative to the longer side of the detected box.
const MESH_CROP_MARGIN: f32 = 1.5;
/// Smallest landmark count a face-mesh model produces.
const MESH_MIN_KEYPOINTS: usize = 468;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face mesh session lock poisoned")]
    Poisoned,
    #[error("loader panicked: {0}")]
    LoadPanicked(String),
    #[error("face detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that can turn an RGB image into keypoints for at most one face.
pub trait LandmarkProvider: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<LandmarkOutcome, LandmarkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TensorLayout {
    Nhwc,
    Nchw,
}

/// Square crop window in source-image pixels; may extend past the edges.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CropWindow {
    x: f32,
    y: f32,
    side: f32,
}

impl CropWindow {
    fn around(face: &FaceBox) -> Self {
        let side = face.width.max(face.height) * MESH_CROP_MARGIN;
        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;
        Self {
            x: cx - side / 2.0,
            y: cy - side / 2.0,
            side,
        }
    }

    /// Map a point in mesh-input pixels back to normalized image coordinates.
    fn to_normalized(&self, mx: f32, my: f32, width: u32, height: u32) -> Keypoint {
        let k = self.side / MESH_INPUT_SIZE as f32;
        Keypoint::new(
            ((self.x + mx * k) / width as f32) as f64,
            ((self.y + my * k) / height as f32) as f64,
        )
    }
}

/// SCRFD + face-mesh landmark provider backed by ONNX Runtime.
pub struct FaceMeshProvider {
    detector: FaceDetector,
    mesh: Mutex<Session>,
    layout: TensorLayout,
    output_count: usize,
    presence_threshold: f32,
}

impl FaceMeshProvider {
    /// Load both ONNX models.
    pub fn load(
        detector_path: &Path,
        mesh_path: &Path,
        presence_threshold: f32,
    ) -> Result<Self, LandmarkError> {
        let detector = FaceDetector::load(detector_path)?;

        if !mesh_path.exists() {
            return Err(LandmarkError::ModelNotFound(mesh_path.display().to_string()));
        }
        let mesh = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(mesh_path)?;

        let layout = match mesh.inputs().first().map(|i| i.dtype()) {
            Some(ValueType::Tensor { shape, .. }) if shape.len() == 4 && shape[1] == 3 => {
                TensorLayout::Nchw
            }
            _ => TensorLayout::Nhwc,
        };
        let output_count = mesh.outputs().len();

        tracing::info!(
            path = %mesh_path.display(),
            ?layout,
            outputs = ?mesh.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            presence_threshold,
            "loaded face mesh model"
        );

        Ok(Self {
            detector,
            mesh: Mutex::new(mesh),
            layout,
            output_count,
            presence_threshold,
        })
    }

    fn run_mesh(&self, input: Array4<f32>) -> Result<(Vec<f32>, Option<f32>), LandmarkError> {
        let mut session = self.mesh.lock().map_err(|_| LandmarkError::Poisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let tensors: Vec<Vec<f32>> = (0..self.output_count)
            .filter_map(|idx| outputs[idx].try_extract_tensor::<f32>().ok())
            .map(|(_, data)| data.to_vec())
            .collect();
        select_mesh_outputs(&tensors)
    }
}

impl LandmarkProvider for FaceMeshProvider {
    fn detect(&self, image: &RgbImage) -> Result<LandmarkOutcome, LandmarkError> {
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.first() else {
            return Ok(LandmarkOutcome::NoFace);
        };

        let window = CropWindow::around(face);
        let crop = crop_square(image, &window);
        let (coords, presence) = self.run_mesh(mesh_tensor(&crop, self.layout))?;

        if !face_present(presence, self.presence_threshold) {
            tracing::debug!(?presence, "face mesh rejected the crop");
            return Ok(LandmarkOutcome::NoFace);
        }

        let (width, height) = image.dimensions();
        let keypoints: Vec<Keypoint> = coords
            .chunks_exact(3)
            .map(|p| window.to_normalized(p[0], p[1], width, height))
            .collect();

        tracing::trace!(count = keypoints.len(), box_score = face.score, "face mesh keypoints");
        Ok(LandmarkOutcome::Detected(KeypointSet::new(keypoints)))
    }
}

/// Pick the landmark tensor and the optional face-presence logit out of the
/// mesh outputs. The first flat tensor holding at least 468 xyz triples is
/// the landmarks; the first single-element tensor is the presence logit.
fn select_mesh_outputs(outputs: &[Vec<f32>]) -> Result<(Vec<f32>, Option<f32>), LandmarkError> {
    let coords = outputs
        .iter()
        .find(|data| data.len() >= MESH_MIN_KEYPOINTS * 3 && data.len() % 3 == 0)
        .cloned()
        .ok_or_else(|| {
            LandmarkError::InferenceFailed("no landmark tensor among mesh outputs".into())
        })?;
    let presence = outputs.iter().find(|data| data.len() == 1).map(|data| data[0]);
    Ok((coords, presence))
}

/// Models without a presence head always count as a face.
fn face_present(presence: Option<f32>, threshold: f32) -> bool {
    presence.map_or(true, |logit| sigmoid(logit) >= threshold)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Cut `window` out of `image` and resize it to the mesh input size.
/// Parts of the window outside the image are black.
fn crop_square(image: &RgbImage, window: &CropWindow) -> RgbImage {
    let side = window.side.round().max(1.0) as u32;
    let mut canvas = RgbImage::new(side, side);

    let x0 = window.x.round() as i64;
    let y0 = window.y.round() as i64;
    let src_x = x0.max(0) as u32;
    let src_y = y0.max(0) as u32;
    let src_right = (x0 + side as i64).clamp(0, image.width() as i64) as u32;
    let src_bottom = (y0 + side as i64).clamp(0, image.height() as i64) as u32;

    if src_right > src_x && src_bottom > src_y {
        let (width, height) = (src_right - src_x, src_bottom - src_y);
        let visible = imageops::crop_imm(image, src_x, src_y, width, height).to_image();
        imageops::replace(&mut canvas, &visible, src_x as i64 - x0, src_y as i64 - y0);
    }

    imageops::resize(&canvas, MESH_INPUT_SIZE, MESH_INPUT_SIZE, FilterType::Triangle)
}

/// Scale pixels to [0, 1] in the layout the mesh model expects.
fn mesh_tensor(crop: &RgbImage, layout: TensorLayout) -> Array4<f32> {
    let size = MESH_INPUT_SIZE as usize;
    let mut tensor = match layout {
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, size, size, 3)),
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, size, size)),
    };
    for (x, y, px) in crop.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let v = px[c] as f32 / 255.0;
            match layout {
                TensorLayout::Nhwc => tensor[[0, y, x, c]] = v,
                TensorLayout::Nchw => tensor[[0, c, y, x]] = v,
            }
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_window_is_centered_square() {
        let face = FaceBox { x: 100.0, y: 50.0, width: 80.0, height: 100.0, score: 0.9 };
        let w = CropWindow::around(&face);
        assert_eq!(w.side, 150.0);
        assert_eq!(w.x + w.side / 2.0, 140.0);
        assert_eq!(w.y + w.side / 2.0, 100.0);
    }

    #[test]
    fn test_to_normalized_maps_mesh_corners() {
        let w = CropWindow { x: 64.0, y: 32.0, side: 192.0 };
        let tl = w.to_normalized(0.0, 0.0, 640, 480);
        assert!((tl.x - 0.1).abs() < 1e-6 && (tl.y - 32.0 / 480.0).abs() < 1e-6);
        let br = w.to_normalized(192.0, 192.0, 640, 480);
        assert!((br.x - 256.0 / 640.0).abs() < 1e-6);
        assert!((br.y - 224.0 / 480.0).abs() < 1e-6);
    }

    #[test]
    fn test_crop_square_pads_outside_with_black() {
        let img = RgbImage::from_pixel(100, 100, image::Rgb([200, 200, 200]));
        let window = CropWindow { x: -100.0, y: -100.0, side: 200.0 };
        let crop = crop_square(&img, &window);
        assert_eq!(crop.dimensions(), (MESH_INPUT_SIZE, MESH_INPUT_SIZE));
        assert_eq!(crop.get_pixel(10, 10).0, [0, 0, 0]);
        assert_eq!(crop.get_pixel(180, 180).0, [200, 200, 200]);
    }

    #[test]
    fn test_crop_square_fully_outside_is_black() {
        let img = RgbImage::from_pixel(10, 10, image::Rgb([255, 255, 255]));
        let window = CropWindow { x: 500.0, y: 500.0, side: 50.0 };
        let crop = crop_square(&img, &window);
        assert!(crop.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_mesh_tensor_layouts() {
        let mut crop = RgbImage::new(MESH_INPUT_SIZE, MESH_INPUT_SIZE);
        crop.put_pixel(3, 5, image::Rgb([255, 0, 51]));

        let nhwc = mesh_tensor(&crop, TensorLayout::Nhwc);
        assert_eq!(nhwc.shape(), &[1, 192, 192, 3]);
        assert_eq!(nhwc[[0, 5, 3, 0]], 1.0);
        assert!((nhwc[[0, 5, 3, 2]] - 0.2).abs() < 1e-6);

        let nchw = mesh_tensor(&crop, TensorLayout::Nchw);
        assert_eq!(nchw.shape(), &[1, 3, 192, 192]);
        assert_eq!(nchw[[0, 0, 5, 3]], 1.0);
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_select_mesh_outputs_with_presence_head() {
        let outputs = vec![vec![0.0; 1404], vec![2.5]];
        let (coords, presence) = select_mesh_outputs(&outputs).unwrap();
        assert_eq!(coords.len(), 1404);
        assert_eq!(presence, Some(2.5));
    }

    #[test]
    fn test_select_mesh_outputs_with_iris_refinement() {
        let outputs = vec![vec![0.0; 16], vec![1.0; 478 * 3]];
        let (coords, presence) = select_mesh_outputs(&outputs).unwrap();
        assert_eq!(coords.len(), 1434);
        assert_eq!(presence, None);
    }

    #[test]
    fn test_select_mesh_outputs_without_landmarks() {
        let outputs = vec![vec![0.0; 1403], vec![0.9]];
        let err = select_mesh_outputs(&outputs).unwrap_err();
        assert!(matches!(err, LandmarkError::InferenceFailed(_)));
    }

    #[test]
    fn test_face_present_threshold() {
        assert!(!face_present(Some(-5.0), 0.5));
        assert!(face_present(Some(5.0), 0.5));
        assert!(face_present(None, 0.5));
    }
}
