// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds the trained model from train_config.json and its
// checkpoint, then scores encoded requests in evaluation mode.
// The encoding itself happens upstream with the FittedEncoder
// restored from feature_config.json.

use anyhow::{ensure, Result};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::CtrBatcher, encoder::EncodedFeatures};
use crate::domain::feature_config::{FeatureConfig, ModelType};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::backend::{Device, InnerBackend};
use crate::ml::deepfm::{DeepFm, DeepFmConfig};
use crate::ml::logistic::{LogisticRegression, LogisticRegressionConfig};
use crate::ml::model::{tensor_values, ScoringModel};

enum LoadedModel {
    DeepFm(DeepFm<InnerBackend>),
    LogisticRegression(LogisticRegression<InnerBackend>),
}

pub struct Inferencer {
    model:      LoadedModel,
    num_sparse: usize,
    num_dense:  usize,
    device:     Device,
}

impl Inferencer {
    pub fn from_checkpoint(
        ckpt_manager:   &CheckpointManager,
        train_config:   &TrainConfig,
        feature_config: &FeatureConfig,
        device:         Device,
    ) -> Result<Self> {
        ensure!(
            feature_config.model_type == train_config.model_type,
            "feature config is for {} but the checkpoint is {}",
            feature_config.model_type, train_config.model_type
        );

        let vocab_sizes = feature_config.sparse_vocab_sizes.clone();
        let num_sparse  = vocab_sizes.len();
        let num_dense   = feature_config.dense_features.len();
        let name        = train_config.model_type.file_prefix();

        let model = match train_config.model_type {
            ModelType::DeepFm => {
                let fresh = DeepFmConfig::new(vocab_sizes, num_dense)
                    .with_embedding_dim(train_config.embedding_dim)
                    .with_hidden_units(train_config.hidden_units.clone())
                    .with_dropout(train_config.dropout)
                    .init(&device);
                LoadedModel::DeepFm(ckpt_manager.load_model(fresh, name, &device)?)
            }
            ModelType::LogisticRegression => {
                let fresh = LogisticRegressionConfig::new(vocab_sizes, num_dense).init(&device);
                LoadedModel::LogisticRegression(ckpt_manager.load_model(fresh, name, &device)?)
            }
        };

        tracing::info!("{} model loaded from checkpoint", train_config.model_type);
        Ok(Self { model, num_sparse, num_dense, device })
    }

    /// One click probability per encoded row, in row order.
    pub fn predict(&self, encoded: &EncodedFeatures, batch_size: usize) -> Result<Vec<f32>> {
        ensure!(
            encoded.sparse.iter().all(|r| r.len() == self.num_sparse)
                && encoded.dense.iter().all(|r| r.len() == self.num_dense),
            "encoded rows do not match the model's {} sparse / {} dense inputs",
            self.num_sparse, self.num_dense
        );

        match &self.model {
            LoadedModel::DeepFm(m)             => self.predict_with(m, encoded, batch_size),
            LoadedModel::LogisticRegression(m) => self.predict_with(m, encoded, batch_size),
        }
    }

    fn predict_with<M: ScoringModel<InnerBackend>>(
        &self,
        model:      &M,
        encoded:    &EncodedFeatures,
        batch_size: usize,
    ) -> Result<Vec<f32>> {
        let batcher = CtrBatcher::<InnerBackend>::new(self.device.clone());
        let mut probs = Vec::with_capacity(encoded.len());

        for (sparse, dense) in encoded
            .sparse
            .chunks(batch_size.max(1))
            .zip(encoded.dense.chunks(batch_size.max(1)))
        {
            let (sparse, dense) = batcher.inputs(sparse, dense);
            probs.extend(tensor_values(model.score(sparse, dense))?);
        }

        tracing::debug!("Scored {} rows", probs.len());
        Ok(probs)
    }
}
