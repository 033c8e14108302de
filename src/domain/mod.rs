// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that define what the
// pipeline talks about: raw rows, partitions, the
// feature-config document and the precondition errors.
//
// Rules for this layer:
//   - NO burn types
//   - NO file I/O
//   - Only data and contracts

/// Raw rows, partitions and the corpus schema
pub mod row;

/// The serving-facing feature-config document
pub mod feature_config;

/// Precondition violations
pub mod error;

/// CorpusSource and ArtifactSink seams
pub mod traits;
