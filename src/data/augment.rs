// ============================================================
// Layer 4 — SpecAugment
// ============================================================
// Masks one random band of feature bins and one random span of
// frames in each training chunk, in place. Mask widths are
// drawn uniformly from [0, ratio × size].
//
//   frames →
//   ┌──────────────┐
//   │    ░░        │
//   │▓▓▓▓░░▓▓▓▓▓▓▓▓│  ← frequency mask
//   │    ░░        │
//   └──────────────┘
//        ↑ frame mask
//
// Reference: Park et al. (2019) SpecAugment

use rand::Rng;

use crate::domain::params::AugParams;

#[derive(Debug, Clone, PartialEq)]
pub struct SpecAugment {
    frequency_ratio: f64,
    frame_ratio:     f64,
}

impl SpecAugment {
    pub fn new(params: &AugParams) -> Self {
        Self {
            frequency_ratio: params.frequency.clamp(0.0, 1.0),
            frame_ratio:     params.frame.clamp(0.0, 1.0),
        }
    }

    /// `features` is frames × feat_dim, row-major.
    pub fn apply<R: Rng>(&self, features: &mut [f32], frames: usize, feat_dim: usize, rng: &mut R) {
        if frames == 0 || feat_dim == 0 {
            return;
        }

        let (f0, fw) = draw_span(rng, feat_dim, self.frequency_ratio);
        for frame in features.chunks_exact_mut(feat_dim) {
            frame[f0..f0 + fw].fill(0.0);
        }

        let (t0, tw) = draw_span(rng, frames, self.frame_ratio);
        features[t0 * feat_dim..(t0 + tw) * feat_dim].fill(0.0);
    }
}

/// Start and width of a mask over `size` slots.
fn draw_span<R: Rng>(rng: &mut R, size: usize, ratio: f64) -> (usize, usize) {
    let max_width = ((size as f64) * ratio).floor() as usize;
    let width     = rng.gen_range(0..=max_width.min(size));
    let start     = rng.gen_range(0..=size - width);
    (start, width)
}
