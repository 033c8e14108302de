//! ONNX export of the evaluation-mode scoring function.
//!
//! `proto` holds the protobuf messages, `graph` the builder the models
//! append their ops to. Nothing here depends on burn.

pub mod graph;
pub mod proto;

use std::{fs, path::Path};

use anyhow::{Context, Result};

use self::proto::ModelProto;

/// Serialise `model` to `path`.
pub fn write_model(model: &ModelProto, path: &Path) -> Result<()> {
    fs::write(path, graph::encode(model))
        .with_context(|| format!("Cannot write ONNX graph to '{}'", path.display()))?;
    tracing::debug!("Wrote ONNX graph to '{}'", path.display());
    Ok(())
}
