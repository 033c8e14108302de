// ============================================================
// Layer 2 — ScoreUseCase
// ============================================================
// Scores raw requests with the artifacts of a previous run:
//
//   Step 1: Load train_config.json + checkpoint   (Layer 6 - infra)
//   Step 2: Restore the encoder from feature_config.json
//   Step 3: Encode the requests                   (Layer 4 - data)
//   Step 4: Predict in evaluation mode            (Layer 5 - ml)

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};

use crate::data::encoder::FittedEncoder;
use crate::domain::{feature_config::FeatureConfig, traits::CorpusSource};
use crate::infra::{artifacts::LOCAL_FEATURE_CONFIG, checkpoint::CheckpointManager};
use crate::ml::{backend::ExecutionDevice, inferencer::Inferencer};

pub struct ScoreUseCase {
    artifact_dir: PathBuf,
    device:       ExecutionDevice,
}

impl ScoreUseCase {
    pub fn new(artifact_dir: impl Into<PathBuf>, device: ExecutionDevice) -> Self {
        Self { artifact_dir: artifact_dir.into(), device }
    }

    /// One click probability per request row, in input order.
    pub fn score(&self, requests: &dyn CorpusSource, batch_size: usize) -> Result<Vec<f32>> {
        let ckpt_manager = CheckpointManager::new(&self.artifact_dir)?;
        let train_config = ckpt_manager.load_config()?;

        let path = self.artifact_dir.join(LOCAL_FEATURE_CONFIG);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read feature config '{}'", path.display()))?;
        let feature_config = FeatureConfig::from_json(&json)
            .with_context(|| format!("Malformed feature config '{}'", path.display()))?;
        let encoder = FittedEncoder::from_feature_config(&feature_config)?;

        let inferencer = Inferencer::from_checkpoint(
            &ckpt_manager,
            &train_config,
            &feature_config,
            self.device.resolve(),
        )?;

        let corpus  = requests.load()?;
        let encoded = encoder.transform(&corpus);
        tracing::info!("Scoring {} requests in batches of {}", encoded.len(), batch_size);

        inferencer.predict(&encoded, batch_size)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untrained_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let use_case = ScoreUseCase::new(dir.path(), ExecutionDevice::Cpu);
        let requests = crate::data::synthetic::SyntheticCorpus::new(5, 1);
        let err = use_case.score(&requests, 16).unwrap_err();
        assert!(format!("{err:#}").contains("train_config.json"));
    }
}
