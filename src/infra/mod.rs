// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the file system, the process table
// or the OS signal machinery:
//
//   model_dir.rs  — experiment directory layout, blueprint copy,
//                   params.json and descriptor persistence
//
//   checkpoint.rs — `<epoch>.<suffix>` weight files, written
//                   with burn's BinBytesRecorder and renamed
//                   into place
//
//   metrics.rs    — train.csv / lr_finder.csv writers
//
//   process.rs    — runs the preprocess and extraction scripts
//
//   readiness.rs  — polls for a file with an optional deadline
//
//   shutdown.rs   — Ctrl+C flag shared by one run
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Experiment directory and config persistence
pub mod model_dir;

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// External command execution
pub mod process;

/// Checkpoint readiness polling
pub mod readiness;

/// Interrupt flag
pub mod shutdown;
