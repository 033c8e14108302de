// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence used by the use cases:
//
//   checkpoint.rs — burn records + train_config.json, so the
//                   `score` command can rebuild the model
//
//   artifacts.rs  — local artifact names, the NamingScheme for
//                   remote names, and best-effort publishing
//                   through an ArtifactSink
//
//   metrics.rs    — per-epoch loss / accuracy CSV
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Records and Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Artifact naming and publishing
pub mod artifacts;

/// Training metrics CSV logger
pub mod metrics;
