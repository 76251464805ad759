// ============================================================
// Layer 2 — Application / Stages
// ============================================================
// This layer strings the other layers together into one launch:
//
//   pipeline.rs          — Stage trait, failure policy, driver
//   preprocess_stage.rs  — phases 0–2 via the preprocess script
//   train_use_case.rs    — phase 3: training or the LR finder
//   extract_use_case.rs  — phase 4: the extraction matrix
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// Stage driver
pub mod pipeline;

/// Feature preparation and chunk egs
pub mod preprocess_stage;

/// Training workflow
pub mod train_use_case;

/// Embedding extraction workflow
pub mod extract_use_case;
