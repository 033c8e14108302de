// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two I/O seams of the pipeline. Everything between them
// (encoding, training, export) is pure computation.
//
//   CorpusSource  — where labelled rows come from
//                   (CsvCorpusLoader, the synthetic generator)
//   ArtifactSink  — where finished artifacts get published
//                   (DirectorySink, or nothing at all)

use std::path::Path;

use anyhow::Result;

use crate::domain::row::Corpus;

/// Any component that can produce a corpus in the input contract.
pub trait CorpusSource {
    fn load(&self) -> Result<Corpus>;
}

/// Any destination that accepts finished artifacts.
///
/// `destination` is a store-relative name such as
/// `models/pctr/deepfm_model_latest.onnx`. Publishing the same name
/// twice overwrites it.
pub trait ArtifactSink {
    fn publish(&self, source: &Path, destination: &str) -> Result<()>;

    /// Human-readable location for log lines.
    fn describe(&self) -> String;
}
