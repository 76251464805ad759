// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Turns the egs directory written by the preprocess stage into
// tensor batches for the trainer.
//
//   egs_dir/info + *.egs.csv
//       │
//       ▼
//   EgsInfo / EgsEntry  → dimensions and chunk pointers
//       │
//       ▼
//   ChunkEgsDataset     → Burn Dataset, reads Kaldi archives
//       │                  lazily, applies SpecAugment
//       ▼
//   ChunkBatcher        → [batch, feat_dim, frames] tensors
//       │
//       ▼
//   DataLoader          → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Kaldi binary matrix reader
pub mod kaldi;

/// egs directory index (info files and CSVs)
pub mod egs;

/// Frequency and time masking
pub mod augment;

/// Implements Burn's Dataset trait for chunk egs
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Training + validation datasets of one egs directory
pub mod bunch;
