//! Native evaluator for XGBoost gradient-boosted tree models.
//!
//! Reads the JSON document written by `Booster.save_model("model.json")` and
//! scores feature vectors without the XGBoost runtime. Each tree is stored
//! as parallel node arrays; `tree_info` assigns trees to classes.
//!
//! Node traversal follows XGBoost: go left when `value < split_condition`,
//! follow `default_left` for NaN, and read leaf values out of
//! `split_conditions`.

use crate::classifier::{ClassifierError, Inference, MoodModel};
use serde::Deserialize;
use std::path::Path;

/// How raw margins become a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Softmax over per-class margins.
    SoftProb,
    /// Argmax of per-class margins; no probabilities.
    SoftMax,
    /// Single sigmoid margin, two classes.
    Logistic,
}

impl Objective {
    fn parse(name: &str) -> Result<Self, ClassifierError> {
        match name {
            "multi:softprob" => Ok(Self::SoftProb),
            "multi:softmax" => Ok(Self::SoftMax),
            "binary:logistic" => Ok(Self::Logistic),
            other => Err(ClassifierError::InvalidModel(format!("unsupported objective: {other}"))),
        }
    }
}

/// One regression tree in flattened form. Node 0 is the root.
#[derive(Debug, Clone)]
pub struct Tree {
    left: Vec<i32>,
    right: Vec<i32>,
    feature: Vec<u32>,
    condition: Vec<f32>,
    default_left: Vec<bool>,
}

impl Tree {
    /// Walk from the root to a leaf and return the leaf value.
    pub fn leaf_value(&self, features: &[f32]) -> f32 {
        let mut node = 0usize;
        loop {
            let left = self.left[node];
            if left < 0 {
                return self.condition[node];
            }
            let value = features
                .get(self.feature[node] as usize)
                .copied()
                .unwrap_or(f32::NAN);
            let go_left = if value.is_nan() {
                self.default_left[node]
            } else {
                value < self.condition[node]
            };
            node = if go_left { left as usize } else { self.right[node] as usize };
        }
    }

    fn validate(&self, id: usize, n_features: usize) -> Result<(), ClassifierError> {
        let n = self.left.len();
        let invalid = |msg: String| ClassifierError::InvalidModel(format!("tree {id}: {msg}"));

        if n == 0 {
            return Err(invalid("no nodes".into()));
        }
        if [self.right.len(), self.feature.len(), self.condition.len(), self.default_left.len()]
            .iter()
            .any(|&len| len != n)
        {
            return Err(invalid("node arrays differ in length".into()));
        }
        for node in 0..n {
            if self.left[node] < 0 {
                continue;
            }
            // children always follow their parent, which guarantees the walk ends
            for child in [self.left[node], self.right[node]] {
                if child as usize <= node || child as usize >= n {
                    return Err(invalid(format!("node {node} has bad child {child}")));
                }
            }
            if self.feature[node] as usize >= n_features {
                return Err(invalid(format!(
                    "node {node} splits on feature {} of {n_features}",
                    self.feature[node]
                )));
            }
        }
        Ok(())
    }
}

/// Gradient-boosted tree ensemble.
#[derive(Debug, Clone)]
pub struct GradientBoostedModel {
    objective: Objective,
    n_features: usize,
    n_groups: usize,
    base_margin: Vec<f32>,
    trees: Vec<Tree>,
    tree_group: Vec<usize>,
}

// --- XGBoost JSON document ---

#[derive(Deserialize)]
struct Document {
    learner: Learner,
}

#[derive(Deserialize)]
struct Learner {
    learner_model_param: LearnerParam,
    objective: ObjectiveParam,
    gradient_booster: GradientBooster,
}

#[derive(Deserialize)]
struct LearnerParam {
    base_score: String,
    num_class: String,
    num_feature: String,
}

#[derive(Deserialize)]
struct ObjectiveParam {
    name: String,
}

#[derive(Deserialize)]
struct GradientBooster {
    model: BoosterModel,
}

#[derive(Deserialize)]
struct BoosterModel {
    trees: Vec<TreeJson>,
    tree_info: Vec<usize>,
}

#[derive(Deserialize)]
struct TreeJson {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
}

/// `default_left` is written as 0/1 by some versions and booleans by others.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl From<Flag> for bool {
    fn from(f: Flag) -> bool {
        match f {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

fn parse_count(field: &str, raw: &str) -> Result<usize, ClassifierError> {
    raw.trim()
        .parse()
        .map_err(|_| ClassifierError::InvalidModel(format!("{field} is not a count: {raw:?}")))
}

/// `base_score` is `"5E-1"` in older dumps and `"[5E-1]"` or a per-class
/// list in newer ones.
fn parse_base_score(raw: &str) -> Result<Vec<f32>, ClassifierError> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<f32>()
                .map_err(|_| ClassifierError::InvalidModel(format!("bad base_score: {raw:?}")))
        })
        .collect()
}

impl GradientBoostedModel {
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::ModelNotFound(path.display().to_string()));
        }
        let model = Self::from_json(&std::fs::read_to_string(path)?)?;
        tracing::info!(
            path = %path.display(),
            objective = ?model.objective,
            trees = model.trees.len(),
            n_features = model.n_features,
            "loaded gradient-boosted model"
        );
        Ok(model)
    }

    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let doc: Document = serde_json::from_str(json)?;
        let learner = doc.learner;

        let objective = Objective::parse(&learner.objective.name)?;
        let n_features = parse_count("num_feature", &learner.learner_model_param.num_feature)?;
        let num_class = parse_count("num_class", &learner.learner_model_param.num_class)?;
        let n_groups = match objective {
            Objective::Logistic => 1,
            _ if num_class >= 2 => num_class,
            _ => {
                return Err(ClassifierError::InvalidModel(format!(
                    "multi-class objective with num_class = {num_class}"
                )))
            }
        };

        let scores = parse_base_score(&learner.learner_model_param.base_score)?;
        let base_margin = match (scores.len(), objective) {
            (1, Objective::Logistic) => vec![prob_to_margin(scores[0])],
            (1, _) => vec![scores[0]; n_groups],
            (n, Objective::Logistic) if n == n_groups => {
                scores.iter().map(|&p| prob_to_margin(p)).collect()
            }
            (n, _) if n == n_groups => scores,
            (n, _) => {
                return Err(ClassifierError::InvalidModel(format!(
                    "base_score has {n} entries for {n_groups} output groups"
                )))
            }
        };

        let booster = learner.gradient_booster.model;
        if booster.tree_info.len() != booster.trees.len() {
            return Err(ClassifierError::InvalidModel(format!(
                "tree_info lists {} trees, model has {}",
                booster.tree_info.len(),
                booster.trees.len()
            )));
        }
        if let Some(bad) = booster.tree_info.iter().find(|&&g| g >= n_groups) {
            return Err(ClassifierError::InvalidModel(format!("tree assigned to group {bad}")));
        }

        let trees: Vec<Tree> = booster
            .trees
            .into_iter()
            .map(|t| Tree {
                left: t.left_children,
                right: t.right_children,
                feature: t.split_indices,
                condition: t.split_conditions,
                default_left: t.default_left.into_iter().map(bool::from).collect(),
            })
            .collect();
        for (id, tree) in trees.iter().enumerate() {
            tree.validate(id, n_features)?;
        }

        Ok(Self {
            objective,
            n_features,
            n_groups,
            base_margin,
            trees,
            tree_group: booster.tree_info,
        })
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Raw per-group margins (base score plus the sum of leaf values).
    pub fn margins(&self, features: &[f32]) -> Vec<f32> {
        let mut margins = self.base_margin.clone();
        for (tree, &group) in self.trees.iter().zip(&self.tree_group) {
            margins[group] += tree.leaf_value(features);
        }
        margins
    }
}

impl MoodModel for GradientBoostedModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> Option<usize> {
        Some(match self.objective {
            Objective::Logistic => 2,
            _ => self.n_groups,
        })
    }

    fn infer(&self, features: &[f32]) -> Result<Inference, ClassifierError> {
        if features.len() != self.n_features {
            return Err(ClassifierError::FeatureCountMismatch {
                expected: self.n_features,
                actual: features.len(),
            });
        }

        let margins = self.margins(features);
        let inference = match self.objective {
            Objective::SoftProb => {
                let probs = softmax(&margins);
                Inference {
                    class_index: argmax(&probs),
                    probabilities: Some(probs),
                }
            }
            Objective::SoftMax => Inference {
                class_index: argmax(&margins),
                probabilities: None,
            },
            Objective::Logistic => {
                let p = sigmoid(margins[0]);
                Inference {
                    class_index: usize::from(p > 0.5),
                    probabilities: Some(vec![1.0 - p, p]),
                }
            }
        };
        Ok(inference)
    }
}

fn prob_to_margin(p: f32) -> f32 {
    let p = p.clamp(1e-7, 1.0 - 1e-7);
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(margins: &[f32]) -> Vec<f32> {
    let max = margins.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = margins.iter().map(|m| (m - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the first one wins ties.
fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}
