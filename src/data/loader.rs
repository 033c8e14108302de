// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads a labelled event export from a CSV file with a header
// row. The header defines the schema: a declared feature that
// is not a header column is "absent" and the encoder degrades
// it. The label and split columns follow the warehouse query:
//
//   label       COALESCE(is_clicked, 0) → empty/garbage reads as 0
//   data_split  TRAIN | VALIDATE | anything else = IGNORE
//
// Scoring corpora (raw requests) carry neither column; the
// loader is told which kind it reads.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::error::PipelineError;
use crate::domain::row::{Corpus, LabeledRow, Partition, RawRow, LABEL_COLUMN, SPLIT_COLUMN};
use crate::domain::traits::CorpusSource;

pub struct CsvCorpusLoader {
    path:     PathBuf,
    labelled: bool,
}

impl CsvCorpusLoader {
    /// Loader for training data: `label` is required.
    pub fn labelled(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), labelled: true }
    }

    /// Loader for raw requests: rows get label 0 and partition IGNORE.
    pub fn unlabelled(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), labelled: false }
    }
}

impl CorpusSource for CsvCorpusLoader {
    fn load(&self) -> Result<Corpus> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Cannot open corpus '{}'", self.path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Cannot read header of '{}'", self.path.display()))?
            .iter()
            .map(str::to_string)
            .collect();

        if self.labelled && !headers.iter().any(|h| h == LABEL_COLUMN) {
            return Err(PipelineError::MissingColumn { column: LABEL_COLUMN.to_string() }.into());
        }
        if self.labelled && !headers.iter().any(|h| h == SPLIT_COLUMN) {
            tracing::warn!(
                "Corpus '{}' has no '{}' column, every row will be ignored",
                self.path.display(),
                SPLIT_COLUMN
            );
        }

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.with_context(|| {
                format!("Malformed CSV record {} in '{}'", line + 2, self.path.display())
            })?;

            let mut features  = RawRow::new();
            let mut label     = 0.0f32;
            let mut partition = Partition::Ignore;

            for (column, value) in headers.iter().zip(record.iter()) {
                match column.as_str() {
                    LABEL_COLUMN => label = parse_label(value),
                    SPLIT_COLUMN => partition = Partition::parse(value),
                    _            => features.set(column.clone(), value),
                }
            }
            rows.push(LabeledRow::new(features, label, partition));
        }

        tracing::info!("Loaded {} rows from '{}'", rows.len(), self.path.display());

        let columns = headers
            .into_iter()
            .filter(|h| h != LABEL_COLUMN && h != SPLIT_COLUMN);
        Ok(Corpus::new(columns, rows))
    }
}

fn parse_label(value: &str) -> f32 {
    match value.trim() {
        "1" | "true" | "TRUE" | "True" => 1.0,
        other => match other.parse::<f32>() {
            Ok(v) if v >= 0.5 => 1.0,
            _ => 0.0,
        },
    }
}
