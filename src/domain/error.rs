// ============================================================
// Layer 3 — Pipeline Errors
// ============================================================
// Precondition violations that must stop a run before any model
// parameters are initialised. Data-quality problems (nulls,
// unseen values, missing feature columns) are NOT errors and
// never show up here: the encoder degrades instead.

use thiserror::Error;

use crate::domain::row::Partition;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No categorical feature was declared, so there is nothing to embed.
    #[error("no categorical features declared")]
    NoFeatures,

    /// The TRAIN or VALIDATE partition has no rows left after filtering.
    #[error("{partition} partition is empty")]
    EmptyPartition {
        /// The partition that came up empty.
        partition: Partition,
    },

    /// A column required by the corpus contract is missing from the input.
    #[error("required column '{column}' is missing from the corpus")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// A feature-config document whose lists disagree with each other.
    #[error("invalid feature config: {0}")]
    InvalidFeatureConfig(String),
}
