//! Optional learned scoring of descriptor vectors.
//!
//! The engine only ever calls [`score`], which never fails: bad inputs are
//! sanitised, backend failures become probability 0.0, and the result is
//! clamped to [0, 1].
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::descriptors::FEATURE_COUNT;
use crate::error::{Result, SummitError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("model expects {expected} features, descriptor has {got}")]
    FeatureMismatch { expected: usize, got: usize },

    #[error("tree {tree} references missing node {node}")]
    BrokenTree { tree: usize, node: usize },

    #[error("model produced non-finite probability {0}")]
    NonFinite(f64),
}

/// Positive-class probability of a descriptor vector.
pub trait SummitClassifier: Send + Sync {
    fn predict_probability(&self, features: &[f64; FEATURE_COUNT]) -> std::result::Result<f64, ClassifierError>;
}

/// Score a descriptor vector, downgrading every failure to 0.0.
pub fn score(classifier: &dyn SummitClassifier, features: &[f64; FEATURE_COUNT]) -> f64 {
    let mut clean = *features;
    for v in clean.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
    match classifier.predict_probability(&clean) {
        Ok(p) if p.is_finite() => p.clamp(0.0, 1.0),
        Ok(p) => {
            warn!(error = %ClassifierError::NonFinite(p), "classifier output downgraded to 0.0");
            0.0
        }
        Err(e) => {
            warn!(error = %e, "classifier failed; probability downgraded to 0.0");
            0.0
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

// ── Logistic regression ──────────────────────────────────────────────────────

/// `p = σ(w · ((x − mean) / scale) + intercept)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub mean: Option<Vec<f64>>,
    #[serde(default)]
    pub scale: Option<Vec<f64>>,
}

impl SummitClassifier for LogisticModel {
    fn predict_probability(&self, features: &[f64; FEATURE_COUNT]) -> std::result::Result<f64, ClassifierError> {
        let check = |len: usize| {
            if len == FEATURE_COUNT {
                Ok(())
            } else {
                Err(ClassifierError::FeatureMismatch { expected: len, got: FEATURE_COUNT })
            }
        };
        check(self.weights.len())?;
        if let Some(mean) = &self.mean {
            check(mean.len())?;
        }
        if let Some(scale) = &self.scale {
            check(scale.len())?;
        }

        let mut z = self.intercept;
        for (i, &x) in features.iter().enumerate() {
            let m = self.mean.as_ref().map_or(0.0, |m| m[i]);
            let s = self.scale.as_ref().map_or(1.0, |s| s[i]);
            // Zero-variance features were constant in training.
            let s = if s == 0.0 { 1.0 } else { s };
            z += self.weights[i] * (x - m) / s;
        }
        Ok(sigmoid(z))
    }
}

// ── Random forest ────────────────────────────────────────────────────────────

/// One node of a binary decision tree: either a split or a leaf.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// `x[feature] <= threshold` goes left.
    Split { feature: usize, threshold: f64, left: usize, right: usize },
    /// Positive-class probability at this leaf.
    Leaf { value: f64 },
}

/// Nodes indexed from 0; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn predict(&self, tree: usize, x: &[f64; FEATURE_COUNT]) -> std::result::Result<f64, ClassifierError> {
        let mut idx = 0usize;
        // A well-formed tree reaches a leaf in at most `nodes.len()` steps.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split { feature, threshold, left, right }) => {
                    let v = x.get(*feature).ok_or(ClassifierError::FeatureMismatch {
                        expected: feature + 1,
                        got: FEATURE_COUNT,
                    })?;
                    idx = if *v <= *threshold { *left } else { *right };
                }
                None => return Err(ClassifierError::BrokenTree { tree, node: idx }),
            }
        }
        Err(ClassifierError::BrokenTree { tree, node: idx })
    }
}

/// Mean of the per-tree leaf probabilities.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForestModel {
    pub trees: Vec<DecisionTree>,
}

impl SummitClassifier for ForestModel {
    fn predict_probability(&self, features: &[f64; FEATURE_COUNT]) -> std::result::Result<f64, ClassifierError> {
        if self.trees.is_empty() {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for (i, tree) in self.trees.iter().enumerate() {
            total += tree.predict(i, features)?;
        }
        Ok(total / self.trees.len() as f64)
    }
}

// ── Model files ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelFile {
    Logistic(LogisticModel),
    Forest(ForestModel),
}

impl ModelFile {
    pub fn into_classifier(self) -> Box<dyn SummitClassifier> {
        match self {
            ModelFile::Logistic(m) => Box::new(m),
            ModelFile::Forest(m) => Box::new(m),
        }
    }
}

/// Parse a JSON model. Any read or parse failure is `ModelLoadFailed`.
pub fn load_model(path: &Path) -> Result<Box<dyn SummitClassifier>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SummitError::ModelLoadFailed(format!("{}: {e}", path.display())))?;
    parse_model(&text).map_err(|e| match e {
        SummitError::ModelLoadFailed(msg) => SummitError::ModelLoadFailed(format!("{}: {msg}", path.display())),
        other => other,
    })
}

pub fn parse_model(json: &str) -> Result<Box<dyn SummitClassifier>> {
    let model: ModelFile = serde_json::from_str(json).map_err(|e| SummitError::ModelLoadFailed(e.to_string()))?;
    Ok(model.into_classifier())
}
