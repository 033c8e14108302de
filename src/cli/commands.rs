// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Three subcommands and their flags. The enums parse through
// their FromStr impls, so `--model-type lr` and
// `--naming unified` work without clap-specific derives in the
// domain layer.

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::domain::feature_config::ModelType;
use crate::domain::row::{DEFAULT_DENSE_FEATURES, DEFAULT_SPARSE_FEATURES};
use crate::infra::artifacts::NamingScheme;
use crate::ml::backend::ExecutionDevice;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a pCTR model and export it as ONNX plus a feature config
    Train(TrainArgs),

    /// Score a CSV of raw requests with a trained checkpoint
    Score(ScoreArgs),

    /// Write a synthetic labelled corpus for demos and smoke tests
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Labelled CSV export with `label` and `data_split` columns
    #[arg(long, default_value = "data/events.csv")]
    pub input: String,

    /// Where the graph, feature config, checkpoint and metrics go
    #[arg(long, default_value = "artifacts")]
    pub artifact_dir: String,

    /// Mounted bucket directory to publish into; local only if omitted
    #[arg(long)]
    pub publish_dir: Option<String>,

    /// deepfm or logistic_regression (lr)
    #[arg(long, default_value = "deepfm")]
    pub model_type: ModelType,

    /// Remote naming scheme: legacy or unified
    #[arg(long, default_value = "legacy")]
    pub naming: NamingScheme,

    /// Comma-separated categorical columns (default: the standard 11)
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub sparse_features: Option<Vec<String>>,

    /// Comma-separated numeric columns (default: the standard 5).
    /// Pass the flag with no value for a sparse-only model.
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub dense_features: Option<Vec<String>>,

    /// Width K of every DeepFM embedding
    #[arg(long, default_value_t = 8)]
    pub embedding_dim: usize,

    /// Hidden layer widths of the deep part
    #[arg(long, value_delimiter = ',', default_values_t = vec![64, 32])]
    pub hidden_units: Vec<usize>,

    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 1024)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 5)]
    pub epochs: usize,

    /// cpu or gpu (gpu needs the `wgpu` feature)
    #[arg(long, default_value = "cpu")]
    pub device: ExecutionDevice,

    /// Seeds parameter init and batch shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        // absent flag → defaults; `--flag` or `--flag=` → no columns
        let or_default = |given: Option<Vec<String>>, default: &[&str]| match given {
            Some(names) => names.into_iter().filter(|n| !n.is_empty()).collect(),
            None        => default.iter().map(|s| s.to_string()).collect(),
        };

        TrainConfig {
            input_path:      a.input,
            artifact_dir:    a.artifact_dir,
            publish_dir:     a.publish_dir,
            sparse_features: or_default(a.sparse_features, &DEFAULT_SPARSE_FEATURES),
            dense_features:  or_default(a.dense_features, &DEFAULT_DENSE_FEATURES),
            model_type:      a.model_type,
            naming:          a.naming,
            embedding_dim:   a.embedding_dim,
            hidden_units:    a.hidden_units,
            dropout:         a.dropout,
            lr:              a.lr,
            batch_size:      a.batch_size,
            epochs:          a.epochs,
            device:          a.device,
            seed:            a.seed,
        }
    }
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// CSV of raw requests (label / data_split columns are not needed)
    #[arg(long)]
    pub input: String,

    /// Artifact directory of the training run
    #[arg(long, default_value = "artifacts")]
    pub artifact_dir: String,

    #[arg(long, default_value_t = 1024)]
    pub batch_size: usize,

    #[arg(long, default_value = "cpu")]
    pub device: ExecutionDevice,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Destination CSV
    #[arg(long, default_value = "data/events.csv")]
    pub output: String,

    #[arg(long, default_value_t = 100_000)]
    pub rows: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults_map_to_config() {
        let cli = Cli::try_parse_from(["ctr-trainer", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg, TrainConfig { input_path: "data/events.csv".into(), ..TrainConfig::default() });
    }

    #[test]
    fn test_train_flags() {
        let cli = Cli::try_parse_from([
            "ctr-trainer", "train",
            "--model-type", "lr",
            "--naming", "unified",
            "--sparse-features", "device,os",
            "--hidden-units", "16,8,4",
            "--publish-dir", "/mnt/bucket",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();

        assert_eq!(cfg.model_type, ModelType::LogisticRegression);
        assert_eq!(cfg.naming, NamingScheme::Unified);
        assert_eq!(cfg.sparse_features, vec!["device", "os"]);
        assert_eq!(cfg.dense_features.len(), DEFAULT_DENSE_FEATURES.len());
        assert_eq!(cfg.hidden_units, vec![16, 8, 4]);
        assert_eq!(cfg.publish_dir.as_deref(), Some("/mnt/bucket"));
    }

    #[test]
    fn test_empty_dense_features_means_sparse_only() {
        for flag in [&["--dense-features"][..], &["--dense-features="][..]] {
            let argv = ["ctr-trainer", "train"].iter().chain(flag).copied();
            let cli = Cli::try_parse_from(argv).unwrap();
            let Commands::Train(args) = cli.command else { panic!("expected train") };
            let cfg: TrainConfig = args.into();

            assert!(cfg.dense_features.is_empty(), "{flag:?}: {:?}", cfg.dense_features);
            assert_eq!(cfg.sparse_features.len(), DEFAULT_SPARSE_FEATURES.len());
        }
    }

    #[test]
    fn test_unknown_model_type_is_rejected() {
        assert!(Cli::try_parse_from(["ctr-trainer", "train", "--model-type", "gbdt"]).is_err());
    }
}
