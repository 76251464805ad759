// ============================================================
// Layer 4 — Chunk Batcher
// ============================================================
// Implements Burn's Batcher trait to stack ChunkSamples into
// the tensors the TDNN consumes.
//
//   Input:  N samples, each frames × feat_dim (row-major)
//   Output: features [N, feat_dim, frames]   (channels first)
//           labels   [N]
//
// Chunks in one batch normally share a length. When they do
// not, every chunk is cut to the shortest one.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::ChunkSample;

// ─── ChunkBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ChunkBatch<B: Backend> {
    /// [batch_size, feat_dim, frames]
    pub features: Tensor<B, 3>,

    /// [batch_size] speaker class indices
    pub labels: Tensor<B, 1, Int>,
}

// ─── ChunkBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ChunkBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ChunkBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<ChunkSample, ChunkBatch<B>> for ChunkBatcher<B> {
    fn batch(&self, items: Vec<ChunkSample>) -> ChunkBatch<B> {
        let batch_size = items.len();
        let feat_dim   = items.first().map_or(0, |s| s.feat_dim);
        let frames     = items.iter().map(|s| s.frames).min().unwrap_or(0);

        // ── Flatten features, cropping to the shortest chunk ─────────────────
        let flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.features[..frames * feat_dim].iter().copied())
            .collect();

        let labels: Vec<i32> = items.iter().map(|s| s.label as i32).collect();

        // [N, frames, feat_dim] → [N, feat_dim, frames]
        let features = Tensor::<B, 3>::from_data(
            TensorData::new(flat, [batch_size, frames, feat_dim]),
            &self.device,
        )
        .swap_dims(1, 2);

        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        ChunkBatch { features, labels }
    }
}
