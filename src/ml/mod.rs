// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All burn-specific code lives here. Layers above hand in
// encoded samples and get back reports, probabilities and an
// ONNX graph.
//
//   backend.rs    — NdArray / Wgpu selection, train vs. inner backend
//   model.rs      — ScoringModel capability, shared LinearTerm
//   logistic.rs   — logistic regression
//   deepfm.rs     — linear + FM + deep network
//   trainer.rs    — DataLoader + Adam + BCE loop, evaluation
//   inferencer.rs — checkpoint-backed scoring
//   onnx/         — protobuf messages and the graph builder
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Guo et al. (2017) DeepFM
//            Rendle (2010) Factorization Machines

pub mod backend;

/// ScoringModel trait and the first-order term
pub mod model;

pub mod logistic;

pub mod deepfm;

/// Training loop with validation
pub mod trainer;

/// Checkpoint-backed scoring
pub mod inferencer;

/// ONNX graph export
pub mod onnx;
