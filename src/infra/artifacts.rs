// ============================================================
// Layer 6 — Artifact Naming and Publishing
// ============================================================
// A finished run leaves two files in the artifact directory:
//
//   {model}_model.onnx     ← the scoring graph
//   feature_config.json    ← the encoder state serving needs
//
// Publishing copies each of them twice under models/pctr/:
// once with a run timestamp and once as the "latest" alias
// serving polls. The remote names depend on the NamingScheme:
//
//   scheme    model   graph                       feature config
//   ───────   ──────  ──────────────────────────  ───────────────────────────────────
//   legacy    deepfm  deepfm_model_{ts}.onnx      feature_config_deepfm_{ts}.json
//   legacy    lr      lr_model_{ts}.onnx          feature_config_{ts}.json
//   unified   any     {model_type}_model_{ts}.onnx feature_config_{model_type}_{ts}.json
//
// Publishing is best effort: a failed copy is logged and
// reported, never fatal. Local artifacts stay in place.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::feature_config::ModelType;
use crate::domain::traits::ArtifactSink;

/// Every remote name lives under this prefix.
pub const REMOTE_PREFIX: &str = "models/pctr/";

pub const LOCAL_FEATURE_CONFIG: &str = "feature_config.json";

/// `chrono` format for the run timestamp, e.g. `20241031-142501`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingScheme {
    /// What serving reads today; the LR config carries no model tag.
    #[default]
    Legacy,
    /// `{model_type}` in every name, for both variants.
    Unified,
}

impl fmt::Display for NamingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingScheme::Legacy  => write!(f, "legacy"),
            NamingScheme::Unified => write!(f, "unified"),
        }
    }
}

impl FromStr for NamingScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "legacy"  => Ok(NamingScheme::Legacy),
            "unified" => Ok(NamingScheme::Unified),
            other     => anyhow::bail!("unknown naming scheme '{other}' (expected legacy or unified)"),
        }
    }
}

/// All names one run produces, local and remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub local_model:          String,
    pub local_feature_config: String,
    pub model_timestamped:    String,
    pub model_latest:         String,
    pub config_timestamped:   String,
    pub config_latest:        String,
}

impl ArtifactNames {
    pub fn new(scheme: NamingScheme, model_type: ModelType, timestamp: &str) -> Self {
        let model_stem = match scheme {
            NamingScheme::Legacy  => model_type.file_prefix(),
            NamingScheme::Unified => model_type.tag(),
        };
        let config_stem = match (scheme, model_type) {
            (NamingScheme::Legacy, ModelType::LogisticRegression) => "feature_config".to_string(),
            _ => format!("feature_config_{}", model_stem),
        };

        Self {
            local_model:          format!("{model_stem}_model.onnx"),
            local_feature_config: LOCAL_FEATURE_CONFIG.to_string(),
            model_timestamped:    format!("{REMOTE_PREFIX}{model_stem}_model_{timestamp}.onnx"),
            model_latest:         format!("{REMOTE_PREFIX}{model_stem}_model_latest.onnx"),
            config_timestamped:   format!("{REMOTE_PREFIX}{config_stem}_{timestamp}.json"),
            config_latest:        format!("{REMOTE_PREFIX}{config_stem}_latest.json"),
        }
    }
}

/// Local wall-clock run timestamp in [`TIMESTAMP_FORMAT`].
pub fn run_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

// ─── DirectorySink ────────────────────────────────────────────────────────────
/// Copies artifacts into a mounted directory (a bucket mount, a shared volume).
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactSink for DirectorySink {
    fn publish(&self, source: &Path, destination: &str) -> Result<()> {
        let target = self.root.join(destination);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        fs::copy(source, &target).with_context(|| {
            format!("Cannot copy '{}' to '{}'", source.display(), target.display())
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Publish graph and feature config under their timestamped and latest names.
///
/// Returns `false` if any copy failed; the failure is logged, not raised.
pub fn publish_all(
    sink:           &dyn ArtifactSink,
    names:          &ArtifactNames,
    model_path:     &Path,
    config_path:    &Path,
) -> bool {
    let uploads = [
        (model_path, &names.model_timestamped),
        (model_path, &names.model_latest),
        (config_path, &names.config_timestamped),
        (config_path, &names.config_latest),
    ];

    let mut ok = true;
    for (source, destination) in uploads {
        match sink.publish(source, destination) {
            Ok(()) => tracing::info!("Uploaded {} to {}/{}", source.display(), sink.describe(), destination),
            Err(e) => {
                tracing::error!("Failed to publish '{}' to {}: {:#}", destination, sink.describe(), e);
                ok = false;
            }
        }
    }
    ok
}
