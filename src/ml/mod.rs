// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model, optimizer and training-loop code lives here.
//
//   model.rs      — x-vector TDNN with stats pooling and
//                   near/far tap points
//
//   factory.rs    — blueprint file, ModelFactory trait and the
//                   registry of "xvector" / "extended-xvector"
//
//   optimizer.rs  — sgd / adam / adamW from the parameter set
//
//   scheduler.rs  — warmR / stepLR / constant learning rates
//
//   lr_finder.rs  — geometric learning-rate sweep
//
//   trainer.rs    — backend selection, epoch loop, validation,
//                   checkpoints, LR-finder driver
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// X-vector TDNN architecture
pub mod model;

/// Blueprint-driven model factories
pub mod factory;

/// Optimizer selection
pub mod optimizer;

/// Learning-rate schedules
pub mod scheduler;

/// Learning-rate range test
pub mod lr_finder;

/// Training session with validation and checkpointing
pub mod trainer;
