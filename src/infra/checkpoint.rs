// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the trained evaluation-mode model so the
// `score` command can run without an ONNX runtime.
//
// What gets saved per run:
//   1. {model}_model.mpk.gz  — every parameter and BN running statistic
//   2. train_config.json     — architecture and features used
//
// The config is what lets `score` rebuild an identically shaped
// model before loading the record into it.
//
// Records are full precision (not CompactRecorder's f16) so a
// reloaded model scores exactly like the exported graph.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;

const TRAIN_CONFIG_FILE: &str = "train_config.json";

type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Path without extension; the recorder appends `.mpk.gz`.
    fn model_stem(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}_model"))
    }

    /// Returns the path of the written record.
    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M, name: &str) -> Result<PathBuf> {
        let stem = self.model_stem(name);
        CheckpointRecorder::new()
            .record(model.clone().into_record(), stem.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", stem.display()))?;

        let path = stem.with_extension("mpk.gz");
        tracing::debug!("Saved checkpoint '{}'", path.display());
        Ok(path)
    }

    /// Load weights into `model`, which must already have the saved shape.
    pub fn load_model<B: Backend, M: Module<B>>(
        &self,
        model:  M,
        name:   &str,
        device: &B::Device,
    ) -> Result<M> {
        let stem = self.model_stem(name);
        let record = CheckpointRecorder::new()
            .load(stem.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Have you trained the model first?",
                    stem.display()
                )
            })?;
        tracing::info!("Loaded checkpoint '{}'", stem.display());
        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'score'.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed training config '{}'", path.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
