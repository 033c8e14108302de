// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only. No model math, no printing,
// no file formats: those belong to Layers 1, 4, 5 and 6.

/// Fit encoder, train, export, publish
pub mod train_use_case;

/// Score raw requests with a previous run's artifacts
pub mod score_use_case;
