// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run end to end:
//
//   Step 1: Load labelled rows          (Layer 4 - data)
//   Step 2: Fit + apply the encoder     (Layer 4 - data)
//   Step 3: Split TRAIN / VALIDATE      (Layer 4 - data)
//   Step 4: Save config, open metrics   (Layer 6 - infra)
//   Step 5: Train the chosen model      (Layer 5 - ml)
//   Step 6: Export graph + feature cfg  (Layer 5 / 6)
//   Step 7: Publish, best effort        (Layer 6 - infra)
//
// Steps 1–3 reject bad input (no features, empty partitions)
// before anything is written or any parameter is initialised.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::attach_labels,
    encoder::{FeatureEncoder, FittedEncoder},
    loader::CsvCorpusLoader,
    splitter::{ensure_non_empty, split_by_partition},
};
use crate::domain::{
    feature_config::ModelType,
    row::{DEFAULT_DENSE_FEATURES, DEFAULT_SPARSE_FEATURES},
    traits::{ArtifactSink, CorpusSource},
};
use crate::infra::{
    artifacts::{publish_all, run_timestamp, ArtifactNames, DirectorySink, NamingScheme},
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
};
use crate::ml::{
    backend::{ExecutionDevice, InnerBackend, TrainBackend},
    deepfm::{DeepFm, DeepFmConfig},
    logistic::{LogisticRegression, LogisticRegressionConfig},
    model::{export_onnx, ScoringModel},
    onnx::write_model,
    trainer::{fit, TrainingOptions, TrainingReport},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a run depends on. Persisted as train_config.json
// so `score` can rebuild the same architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub input_path:      String,
    pub artifact_dir:    String,
    pub publish_dir:     Option<String>,
    pub sparse_features: Vec<String>,
    pub dense_features:  Vec<String>,
    pub model_type:      ModelType,
    pub naming:          NamingScheme,
    pub embedding_dim:   usize,
    pub hidden_units:    Vec<usize>,
    pub dropout:         f64,
    pub lr:              f64,
    pub batch_size:      usize,
    pub epochs:          usize,
    pub device:          ExecutionDevice,
    pub seed:            u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            input_path:      "data/events.csv".to_string(),
            artifact_dir:    "artifacts".to_string(),
            publish_dir:     None,
            sparse_features: DEFAULT_SPARSE_FEATURES.iter().map(|s| s.to_string()).collect(),
            dense_features:  DEFAULT_DENSE_FEATURES.iter().map(|s| s.to_string()).collect(),
            model_type:      ModelType::DeepFm,
            naming:          NamingScheme::Legacy,
            embedding_dim:   8,
            hidden_units:    vec![64, 32],
            dropout:         0.5,
            lr:              1e-3,
            batch_size:      1024,
            epochs:          5,
            device:          ExecutionDevice::Cpu,
            seed:            42,
        }
    }
}

/// What a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub report:              TrainingReport,
    pub names:               ArtifactNames,
    pub model_path:          PathBuf,
    pub feature_config_path: PathBuf,
    pub checkpoint_path:     PathBuf,
    pub metrics_path:        PathBuf,
    /// `None` when no sink was configured.
    pub published:           Option<bool>,
}

struct LocalArtifacts {
    model_path:          PathBuf,
    feature_config_path: PathBuf,
    checkpoint_path:     PathBuf,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train from the configured CSV and publish to `publish_dir` if set.
    pub fn execute(&self) -> Result<TrainOutcome> {
        let source = CsvCorpusLoader::labelled(&self.config.input_path);
        let sink   = self.config.publish_dir.as_ref().map(DirectorySink::new);
        self.run(&source, sink.as_ref().map(|s| s as &dyn ArtifactSink))
    }

    pub fn run(&self, source: &dyn CorpusSource, sink: Option<&dyn ArtifactSink>) -> Result<TrainOutcome> {
        let cfg = &self.config;

        // ── Steps 1–3: corpus → encoded, split samples ───────────────────────
        let corpus = source.load()?;
        tracing::info!("Loaded {} labelled rows", corpus.len());

        let encoder = FeatureEncoder::new(cfg.sparse_features.clone(), cfg.dense_features.clone())?;
        let (encoded, fitted) = encoder.fit_transform(&corpus);
        let (train, valid) = split_by_partition(attach_labels(encoded, &corpus.rows));
        ensure_non_empty(&train, &valid)?;
        tracing::info!("Split: {} train, {} validation", train.len(), valid.len());

        // ── Step 4: run bookkeeping ──────────────────────────────────────────
        let artifact_dir = PathBuf::from(&cfg.artifact_dir);
        let ckpt_manager = CheckpointManager::new(&artifact_dir)?;
        ckpt_manager.save_config(cfg)?;
        let metrics = MetricsLogger::create(&artifact_dir)?;
        tracing::info!("Logging epoch metrics to '{}'", metrics.csv_path().display());

        let names   = ArtifactNames::new(cfg.naming, cfg.model_type, &run_timestamp());
        let device  = cfg.device.resolve();
        let options = TrainingOptions {
            epochs:     cfg.epochs,
            batch_size: cfg.batch_size,
            lr:         cfg.lr,
            seed:       cfg.seed,
        };
        let vocab_sizes = fitted.vocab_sizes();
        let num_dense   = fitted.dense_features().len();

        // ── Steps 5–6: train, then export the evaluation-mode model ──────────
        let (report, local) = match cfg.model_type {
            ModelType::DeepFm => {
                let model_cfg = DeepFmConfig::new(vocab_sizes, num_dense)
                    .with_embedding_dim(cfg.embedding_dim)
                    .with_hidden_units(cfg.hidden_units.clone())
                    .with_dropout(cfg.dropout);
                let (model, report) = fit::<TrainBackend, DeepFm<TrainBackend>>(
                    |device| model_cfg.init(device),
                    train, valid, &options, &device, Some(&metrics),
                )?;
                (report, self.persist(&model, &fitted, &ckpt_manager, &names)?)
            }
            ModelType::LogisticRegression => {
                let model_cfg = LogisticRegressionConfig::new(vocab_sizes, num_dense);
                let (model, report) = fit::<TrainBackend, LogisticRegression<TrainBackend>>(
                    |device| model_cfg.init(device),
                    train, valid, &options, &device, Some(&metrics),
                )?;
                (report, self.persist(&model, &fitted, &ckpt_manager, &names)?)
            }
        };

        let last = report.last();
        tracing::info!(
            "Final: train_loss={:.4} (start {:.4}), val_loss={:.4}, val_acc={:.4} (baseline {:.4})",
            last.train_loss, report.initial_loss(), last.val_loss,
            last.val_accuracy, report.majority_baseline,
        );

        // ── Step 7: publish ──────────────────────────────────────────────────
        let published = match sink {
            Some(sink) => {
                tracing::info!("Publishing artifacts to {}", sink.describe());
                Some(publish_all(sink, &names, &local.model_path, &local.feature_config_path))
            }
            None => {
                tracing::info!("No artifact sink configured, keeping artifacts in '{}'", artifact_dir.display());
                None
            }
        };

        Ok(TrainOutcome {
            report,
            names,
            model_path:          local.model_path,
            feature_config_path: local.feature_config_path,
            checkpoint_path:     local.checkpoint_path,
            metrics_path:        metrics.csv_path().to_path_buf(),
            published,
        })
    }

    /// Write graph, feature config and checkpoint into the artifact dir.
    fn persist<M: ScoringModel<InnerBackend>>(
        &self,
        model:        &M,
        fitted:       &FittedEncoder,
        ckpt_manager: &CheckpointManager,
        names:        &ArtifactNames,
    ) -> Result<LocalArtifacts> {
        let dir: &Path = ckpt_manager.dir();

        let graph = export_onnx::<InnerBackend, M>(
            model,
            fitted.sparse_features().len(),
            fitted.dense_features().len(),
        )?;
        let model_path = dir.join(&names.local_model);
        write_model(&graph, &model_path)?;

        let feature_config_path = dir.join(&names.local_feature_config);
        let feature_config = fitted.to_feature_config(model.model_type());
        fs::write(&feature_config_path, feature_config.to_json()?).with_context(|| {
            format!("Cannot write feature config to '{}'", feature_config_path.display())
        })?;

        let checkpoint_path =
            ckpt_manager.save_model::<InnerBackend, M>(model, self.config.model_type.file_prefix())?;

        tracing::info!(
            "Saved '{}' and '{}'",
            model_path.display(),
            feature_config_path.display()
        );
        Ok(LocalArtifacts { model_path, feature_config_path, checkpoint_path })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::score_use_case::ScoreUseCase;
    use crate::data::{encoder::FittedEncoder, synthetic::SyntheticCorpus};
    use crate::domain::{
        error::PipelineError,
        feature_config::FeatureConfig,
        row::{Corpus, LabeledRow, Partition, RawRow},
    };
    use crate::ml::onnx::runtime;

    struct FixedCorpus(Corpus);

    impl CorpusSource for FixedCorpus {
        fn load(&self) -> Result<Corpus> {
            Ok(self.0.clone())
        }
    }

    fn config(dir: &Path, model_type: ModelType) -> TrainConfig {
        TrainConfig {
            artifact_dir: dir.display().to_string(),
            model_type,
            batch_size: 64,
            lr: 0.01,
            seed: 7,
            ..TrainConfig::default()
        }
    }

    /// VALIDATE rows of `corpus` only, as an unlabelled scoring corpus.
    fn validate_rows(corpus: &Corpus) -> Corpus {
        let rows = corpus
            .rows
            .iter()
            .filter(|r| r.partition == Partition::Validate)
            .cloned()
            .collect();
        Corpus { columns: corpus.columns.clone(), rows }
    }

    /// Probabilities from the exported graph for `corpus`, encoded with the
    /// exported feature config.
    fn onnx_scores(outcome: &TrainOutcome, corpus: &Corpus) -> Vec<f32> {
        let json    = fs::read_to_string(&outcome.feature_config_path).unwrap();
        let encoder = FittedEncoder::from_feature_config(&FeatureConfig::from_json(&json).unwrap()).unwrap();
        let encoded = encoder.transform(corpus);
        let bytes   = fs::read(&outcome.model_path).unwrap();
        runtime::run(&bytes, &encoded.sparse, &encoded.dense)
    }

    #[test]
    fn test_deepfm_end_to_end() {
        let dir    = tempfile::tempdir().unwrap();
        let corpus = SyntheticCorpus::new(10_000, 42).load().unwrap();
        // production hyperparameters: batch 1024, lr 1e-3, 5 epochs
        let cfg = TrainConfig {
            artifact_dir: dir.path().display().to_string(),
            ..TrainConfig::default()
        };

        let outcome = TrainUseCase::new(cfg)
            .run(&FixedCorpus(corpus.clone()), None)
            .unwrap();
        let report = &outcome.report;

        assert_eq!(report.epochs.len(), 5);
        // fresh model is approximately the constant p = 0.5
        assert!(
            (report.initial_loss() - std::f64::consts::LN_2).abs() < 0.05,
            "initial loss {}", report.initial_loss()
        );
        assert!(report.last().train_loss < report.initial_loss());
        assert!(
            report.last().val_accuracy > report.majority_baseline,
            "val_acc {} vs baseline {}", report.last().val_accuracy, report.majority_baseline
        );
        assert_eq!(outcome.names.local_model, "deepfm_model.onnx");
        assert!(outcome.published.is_none());

        // the exported graph reproduces the evaluation-mode model
        let requests = validate_rows(&corpus);
        let expected = ScoreUseCase::new(dir.path(), ExecutionDevice::Cpu)
            .score(&FixedCorpus(requests.clone()), 512)
            .unwrap();
        let actual = onnx_scores(&outcome, &requests);

        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-4, "onnx {a} vs burn {e}");
        }

        assert_eq!(outcome.metrics_path, dir.path().join("metrics.csv"));
        let metrics = fs::read_to_string(&outcome.metrics_path).unwrap();
        assert_eq!(metrics.lines().count(), 1 + 1 + 5);
    }

    #[test]
    fn test_logistic_regression_end_to_end() {
        let dir    = tempfile::tempdir().unwrap();
        let corpus = SyntheticCorpus::new(3_000, 5).load().unwrap();
        let cfg    = TrainConfig { epochs: 3, ..config(dir.path(), ModelType::LogisticRegression) };

        let outcome = TrainUseCase::new(cfg).run(&FixedCorpus(corpus.clone()), None).unwrap();
        assert!(outcome.report.last().train_loss < outcome.report.initial_loss());
        assert_eq!(outcome.names.local_model, "lr_model.onnx");

        let requests = validate_rows(&corpus);
        let expected = ScoreUseCase::new(dir.path(), ExecutionDevice::Cpu)
            .score(&FixedCorpus(requests.clone()), 256)
            .unwrap();
        let actual = onnx_scores(&outcome, &requests);
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-4, "onnx {a} vs burn {e}");
        }

        let doc = FeatureConfig::from_json(&fs::read_to_string(&outcome.feature_config_path).unwrap()).unwrap();
        assert_eq!(doc.model_type, ModelType::LogisticRegression);
        assert_eq!(doc.sparse_vocab_sizes.len(), DEFAULT_SPARSE_FEATURES.len());
    }

    #[test]
    fn test_missing_declared_feature_degrades() {
        let dir    = tempfile::tempdir().unwrap();
        let corpus = SyntheticCorpus::new(1_000, 11).load().unwrap();
        let mut cfg = TrainConfig { epochs: 1, ..config(dir.path(), ModelType::DeepFm) };
        cfg.sparse_features.push("publisher_id".to_string());
        cfg.dense_features.push("floor_price".to_string());

        let outcome = TrainUseCase::new(cfg).run(&FixedCorpus(corpus), None).unwrap();

        let doc = FeatureConfig::from_json(&fs::read_to_string(&outcome.feature_config_path).unwrap()).unwrap();
        assert_eq!(doc.sparse_vocab_sizes.last(), Some(&1));
        assert_eq!(doc.label_encoders["publisher_id"], vec!["<UNK>".to_string()]);
        assert_eq!(doc.dense_means.last(), Some(&0.0));
        assert_eq!(doc.dense_stds.last(), Some(&1.0));
    }

    #[test]
    fn test_empty_train_partition_writes_nothing() {
        let dir  = tempfile::tempdir().unwrap();
        let out  = dir.path().join("artifacts");
        let rows = (0..20)
            .map(|i| LabeledRow::new(RawRow::new().with("device", "mobile"), (i % 2) as f32, Partition::Validate))
            .collect();
        let corpus = Corpus::new(["device"], rows);

        let cfg = TrainConfig {
            sparse_features: vec!["device".to_string()],
            dense_features:  Vec::new(),
            ..config(&out, ModelType::LogisticRegression)
        };
        let err = TrainUseCase::new(cfg).run(&FixedCorpus(corpus), None).unwrap_err();

        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::EmptyPartition { partition: Partition::Train })
        );
        assert!(!out.exists());
    }

    #[test]
    fn test_no_categorical_features_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig { sparse_features: Vec::new(), ..config(dir.path(), ModelType::DeepFm) };
        let err = TrainUseCase::new(cfg)
            .run(&SyntheticCorpus::new(10, 1), None)
            .unwrap_err();
        assert_eq!(err.downcast_ref::<PipelineError>(), Some(&PipelineError::NoFeatures));
    }

    #[test]
    fn test_publish_to_directory_sink() {
        let dir    = tempfile::tempdir().unwrap();
        let bucket = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            epochs: 1,
            naming: NamingScheme::Unified,
            ..config(dir.path(), ModelType::LogisticRegression)
        };
        let sink = DirectorySink::new(bucket.path());

        let outcome = TrainUseCase::new(cfg)
            .run(&SyntheticCorpus::new(500, 2), Some(&sink))
            .unwrap();

        assert_eq!(outcome.published, Some(true));
        assert!(bucket.path().join("models/pctr/logistic_regression_model_latest.onnx").exists());
        assert!(bucket.path().join(&outcome.names.config_timestamped).exists());
    }
}
