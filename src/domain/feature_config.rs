// ============================================================
// Layer 3 — Feature-Config Document
// ============================================================
// The encoder's full state as a JSON document. A serving system
// loads exactly this to turn a raw request into the
// [sparse_inputs, dense_inputs] pair the exported graph expects.
//
// Class-list order defines the index assignment: position in
// label_encoders[name] is the encoded index, and the unseen
// sentinel is the last entry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Which scoring function produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    #[serde(rename = "deepfm")]
    DeepFm,
    #[serde(rename = "logistic_regression")]
    LogisticRegression,
}

impl ModelType {
    /// The tag written into `model_type`.
    pub fn tag(&self) -> &'static str {
        match self {
            ModelType::DeepFm             => "deepfm",
            ModelType::LogisticRegression => "logistic_regression",
        }
    }

    /// Short prefix used for graph file names.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            ModelType::DeepFm             => "deepfm",
            ModelType::LogisticRegression => "lr",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ModelType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deepfm"                    => Ok(ModelType::DeepFm),
            "logistic_regression" | "lr" => Ok(ModelType::LogisticRegression),
            other => anyhow::bail!("unknown model type '{other}' (expected deepfm or logistic_regression)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub sparse_features:    Vec<String>,
    pub dense_features:     Vec<String>,
    pub sparse_vocab_sizes: Vec<usize>,
    pub dense_means:        Vec<f64>,
    pub dense_stds:         Vec<f64>,
    pub label_encoders:     BTreeMap<String, Vec<String>>,
    pub model_type:         ModelType,
}

impl FeatureConfig {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
