//! Offline dataset builder.
//!
//! Walks a `{root}/{label}/{image}` corpus, runs the landmark provider on
//! every image and writes one CSV row per detected face: the feature vector
//! followed by the label. Features come from the same
//! [`extract_features`] the live predictor uses, uncapped.

use crate::features::{extract_features, KeypointLimit};
use crate::frame::Frame;
use crate::landmarks::LandmarkProvider;
use crate::types::{FeatureVector, LandmarkOutcome};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// Splits processed by [`build_splits`] and the CSV each one produces.
pub const SPLITS: [(&str, &str); 2] = [("train", "face_train.csv"), ("test", "face_test.csv")];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("folder not found: {0}")]
    FolderNotFound(String),
    #[error("no data found in {0}")]
    Empty(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// One training sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub features: FeatureVector,
    pub label: String,
}

/// What happened to the images under a dataset folder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetStats {
    pub images: usize,
    pub unreadable: usize,
    pub no_face: usize,
    pub failed: usize,
    /// Extracted samples per label.
    pub per_label: BTreeMap<String, usize>,
}

impl DatasetStats {
    pub fn extracted(&self) -> usize {
        self.per_label.values().sum()
    }
}

/// Extracted samples for one folder.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub source: PathBuf,
    pub samples: Vec<Sample>,
    pub stats: DatasetStats,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Widest row (features plus label column).
    pub fn width(&self) -> usize {
        self.samples.iter().map(|s| s.features.len() + 1).max().unwrap_or(0)
    }

    /// Write the samples as CSV with a numeric header row `0,1,...`.
    ///
    /// Shorter rows are padded with empty cells before the label so every
    /// row has the same column count and the label stays last.
    pub fn write_csv(&self, path: &Path) -> Result<(), DatasetError> {
        if self.is_empty() {
            return Err(DatasetError::Empty(self.source.display().to_string()));
        }
        let file = fs::File::create(path)?;
        self.write_to(BufWriter::new(file))?;
        tracing::info!(path = %path.display(), rows = self.samples.len(), "saved dataset");
        Ok(())
    }

    fn write_to<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        let width = self.width();
        let header: Vec<String> = (0..width).map(|i| i.to_string()).collect();
        writeln!(out, "{}", header.join(","))?;

        for sample in &self.samples {
            let mut cells: Vec<String> =
                sample.features.as_slice().iter().map(|v| v.to_string()).collect();
            cells.resize(width - 1, String::new());
            cells.push(csv_escape(&sample.label));
            writeln!(out, "{}", cells.join(","))?;
        }
        out.flush()
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Sorted entries of `dir` matching `keep`.
fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, DatasetError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| keep(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Runs a landmark provider over a labeled image tree.
pub struct DatasetBuilder<'a> {
    provider: &'a dyn LandmarkProvider,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(provider: &'a dyn LandmarkProvider) -> Self {
        Self { provider }
    }

    /// Extract samples from every `{folder}/{label}/*.{jpg,png}` image.
    pub fn build(&self, folder: &Path) -> Result<Dataset, DatasetError> {
        if !folder.is_dir() {
            return Err(DatasetError::FolderNotFound(folder.display().to_string()));
        }

        let mut dataset = Dataset {
            source: folder.to_path_buf(),
            ..Dataset::default()
        };

        for label_dir in sorted_entries(folder, Path::is_dir)? {
            let Some(label) = label_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let label = label.to_owned();
            let images = sorted_entries(&label_dir, |p| p.is_file() && is_image(p))?;
            tracing::info!(label = %label, images = images.len(), "processing label");

            let before = dataset.samples.len();
            for image in images {
                dataset.stats.images += 1;
                self.process_image(&image, &label, &mut dataset);
            }
            let extracted = dataset.samples.len() - before;
            *dataset.stats.per_label.entry(label.clone()).or_default() += extracted;
            tracing::info!(label = %label, extracted, "label done");
        }

        Ok(dataset)
    }

    fn process_image(&self, path: &Path, label: &str, dataset: &mut Dataset) {
        let rgb = match Frame::open(path).and_then(|f| f.to_rgb()) {
            Ok(rgb) => rgb,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable image");
                dataset.stats.unreadable += 1;
                return;
            }
        };

        let keypoints = match self.provider.detect(&rgb) {
            Ok(LandmarkOutcome::Detected(k)) => k,
            Ok(LandmarkOutcome::NoFace) => {
                dataset.stats.no_face += 1;
                return;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "landmark detection failed");
                dataset.stats.failed += 1;
                return;
            }
        };

        match extract_features(&keypoints, KeypointLimit::All) {
            Ok(features) => dataset.samples.push(Sample {
                features,
                label: label.to_string(),
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "feature extraction failed");
                dataset.stats.failed += 1;
            }
        }
    }
}

/// Build `{root}/train` and `{root}/test` into `face_train.csv` and
/// `face_test.csv` under `out_dir`. A missing or empty split is logged and
/// skipped; the other split still runs.
pub fn build_splits(
    provider: &dyn LandmarkProvider,
    root: &Path,
    out_dir: &Path,
) -> Vec<(String, Result<DatasetStats, DatasetError>)> {
    let builder = DatasetBuilder::new(provider);
    SPLITS
        .iter()
        .map(|&(split, file)| {
            let result = builder.build(&root.join(split)).and_then(|dataset| {
                dataset.write_csv(&out_dir.join(file))?;
                Ok(dataset.stats)
            });
            if let Err(e) = &result {
                tracing::warn!(split, error = %e, "split not written");
            }
            (split.to_string(), result)
        })
        .collect()
}
