// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and hands off to Layer 2.
//
//   train     fit a model, export ONNX + feature config, publish
//   score     print one pCTR per request row
//   generate  write a synthetic labelled corpus
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, GenerateArgs, ScoreArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "ctr-trainer",
    version,
    about = "Train logistic-regression and DeepFM pCTR models and export them for serving."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => Self::run_train(args),
            Commands::Score(args)    => Self::run_score(args),
            Commands::Generate(args) => Self::run_generate(args),
        }
    }

    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        tracing::info!("Training {} on '{}'", args.model_type, args.input);
        let outcome = TrainUseCase::new(args.into()).execute()?;

        let last = outcome.report.last();
        println!(
            "Validation:     loss {:.4}, accuracy {:.4} (majority baseline {:.4})",
            last.val_loss, last.val_accuracy, outcome.report.majority_baseline,
        );
        println!("Model:          {}", outcome.model_path.display());
        println!("Feature config: {}", outcome.feature_config_path.display());
        println!("Metrics:        {}", outcome.metrics_path.display());
        match outcome.published {
            Some(true)  => println!("Published:      {}", outcome.names.model_latest),
            Some(false) => println!("Publishing failed; artifacts kept locally."),
            None        => {}
        }
        Ok(())
    }

    fn run_score(args: ScoreArgs) -> Result<()> {
        use crate::application::score_use_case::ScoreUseCase;
        use crate::data::loader::CsvCorpusLoader;

        let requests = CsvCorpusLoader::unlabelled(&args.input);
        let scores = ScoreUseCase::new(&args.artifact_dir, args.device)
            .score(&requests, args.batch_size)?;

        for p in scores {
            println!("{p:.6}");
        }
        Ok(())
    }

    fn run_generate(args: GenerateArgs) -> Result<()> {
        use crate::data::synthetic::SyntheticCorpus;
        use crate::domain::traits::CorpusSource;

        if let Some(parent) = std::path::Path::new(&args.output).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let corpus = SyntheticCorpus::new(args.rows, args.seed).load()?;
        SyntheticCorpus::write_csv(&corpus, &args.output)?;
        println!("Wrote {} rows to {}", corpus.len(), args.output);
        Ok(())
    }
}
