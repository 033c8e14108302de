// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from a raw event export to backend-ready tensor
// batches:
//
//   CSV / generator
//       │
//       ▼
//   CsvCorpusLoader   → Corpus (schema + labelled rows)
//       │
//       ▼
//   FeatureEncoder    → vocab indices + standardised values
//       │
//       ▼
//   split_by_partition → TRAIN / VALIDATE (IGNORE dropped)
//       │
//       ▼
//   CtrDataset        → burn Dataset
//       │
//       ▼
//   CtrBatcher        → [batch, N] Int + [batch, D] Float

/// CSV corpus reader
pub mod loader;

/// Vocabularies, scaler, fit_transform / transform
pub mod encoder;

/// Encoded samples and burn's Dataset impl
pub mod dataset;

/// burn Batcher producing model inputs
pub mod batcher;

/// TRAIN / VALIDATE routing and precondition checks
pub mod splitter;

/// Seeded synthetic corpus in the input contract
pub mod synthetic;
