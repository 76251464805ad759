// ============================================================
// Layer 5 — X-vector TDNN
// ============================================================
// Frame-level TDNN layers, statistics pooling and two segment
// layers. The embedding is the affine output of one segment
// layer:
//
//   features [B, feat_dim, T]
//       │  dropout (aug_dropout)
//       ▼
//   TDNN blocks: Conv1d(dilation) → act → LayerNorm(channels)
//       │
//       ▼
//   stats pooling: mean ‖ std over T          [B, 2C]
//       │
//       ▼
//   segment6: Linear → (near) → act → norm    [B, E]
//   segment7: Linear → (far)  → act → norm    [B, E]
//       │
//       ▼
//   output: Linear → logits                   [B, num_targets]
//           (training mode only)
//
// Reference: Snyder et al. (2018) X-vectors
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        conv::{Conv1d, Conv1dConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation,
};

use crate::domain::descriptor::TapPoint;

const STD_FLOOR: f64 = 1e-5;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct TdnnLayerConfig {
    pub channels: usize,
    pub kernel:   usize,
    pub dilation: usize,
}

#[derive(Config, Debug)]
pub struct XvectorConfig {
    pub feat_dim:      usize,
    pub num_targets:   usize,
    pub frame_layers:  Vec<TdnnLayerConfig>,
    #[config(default = 512)]
    pub embedding_dim: usize,
    /// 0 selects ReLU, anything else LeakyReLU with this slope.
    #[config(default = 0.0)]
    pub leaky_slope:   f64,
    #[config(default = 0.0)]
    pub aug_dropout:   f64,
    /// Without it the output layer is not built.
    #[config(default = true)]
    pub training:      bool,
}

impl XvectorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Xvector<B> {
        let mut channels_in = self.feat_dim;
        let mut frame_layers = Vec::with_capacity(self.frame_layers.len());
        for layer in &self.frame_layers {
            frame_layers.push(TdnnBlock {
                conv: Conv1dConfig::new(channels_in, layer.channels, layer.kernel)
                    .with_dilation(layer.dilation)
                    .init(device),
                norm: LayerNormConfig::new(layer.channels).init(device),
            });
            channels_in = layer.channels;
        }

        let pooled_dim = 2 * channels_in;
        let segment6   = LinearConfig::new(pooled_dim, self.embedding_dim).init(device);
        let norm6      = LayerNormConfig::new(self.embedding_dim).init(device);
        let segment7   = LinearConfig::new(self.embedding_dim, self.embedding_dim).init(device);
        let norm7      = LayerNormConfig::new(self.embedding_dim).init(device);
        let output     = self
            .training
            .then(|| LinearConfig::new(self.embedding_dim, self.num_targets).init(device));

        Xvector {
            input_dropout: DropoutConfig::new(self.aug_dropout).init(),
            frame_layers,
            segment6, norm6,
            segment7, norm7,
            output,
            leaky_slope: self.leaky_slope,
        }
    }

    /// Frames the frame layers consume before producing one output frame.
    pub fn receptive_field(&self) -> usize {
        1 + self
            .frame_layers
            .iter()
            .map(|l| (l.kernel - 1) * l.dilation)
            .sum::<usize>()
    }
}

#[derive(Module, Debug)]
pub struct TdnnBlock<B: Backend> {
    pub conv: Conv1d<B>,
    pub norm: LayerNorm<B>,
}

#[derive(Module, Debug)]
pub struct Xvector<B: Backend> {
    pub input_dropout: Dropout,
    pub frame_layers:  Vec<TdnnBlock<B>>,
    pub segment6:      Linear<B>,
    pub norm6:         LayerNorm<B>,
    pub segment7:      Linear<B>,
    pub norm7:         LayerNorm<B>,
    pub output:        Option<Linear<B>>,
    pub leaky_slope:   f64,
}

/// Affine outputs of both segment layers plus the last hidden state.
struct SegmentOutputs<B: Backend> {
    near:   Tensor<B, 2>,
    far:    Tensor<B, 2>,
    hidden: Tensor<B, 2>,
}

impl<B: Backend> Xvector<B> {
    fn act<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        if self.leaky_slope == 0.0 {
            activation::relu(x)
        } else {
            activation::leaky_relu(x, self.leaky_slope)
        }
    }

    fn segments(&self, features: Tensor<B, 3>) -> SegmentOutputs<B> {
        let mut x = self.input_dropout.forward(features);

        for block in &self.frame_layers {
            let y = self.act(block.conv.forward(x));
            // LayerNorm normalises the last dim, so move channels there and back.
            x = block.norm.forward(y.swap_dims(1, 2)).swap_dims(1, 2);
        }

        // ── Statistics pooling ────────────────────────────────────────────────
        let mean   = x.clone().mean_dim(2);
        let std    = x.var(2).clamp_min(STD_FLOOR).sqrt();
        let pooled = Tensor::cat(vec![mean, std], 1).flatten::<2>(1, 2);

        let near   = self.segment6.forward(pooled);
        let h6     = self.norm6.forward(self.act(near.clone()));
        let far    = self.segment7.forward(h6);
        let hidden = self.norm7.forward(self.act(far.clone()));
        SegmentOutputs { near, far, hidden }
    }

    /// [B, feat_dim, T] → [B, embedding_dim] at `tap_point`.
    pub fn extract_embedding(&self, features: Tensor<B, 3>, tap_point: TapPoint) -> Tensor<B, 2> {
        let out = self.segments(features);
        match tap_point {
            TapPoint::Near => out.near,
            TapPoint::Far  => out.far,
        }
    }

    /// [B, feat_dim, T] → logits [B, num_targets]. A model built for
    /// inference has no output layer and returns the last hidden state.
    pub fn forward(&self, features: Tensor<B, 3>) -> Tensor<B, 2> {
        let hidden = self.segments(features).hidden;
        match &self.output {
            Some(output) => output.forward(hidden),
            None         => hidden,
        }
    }

    pub fn has_classifier(&self) -> bool {
        self.output.is_some()
    }

    /// Mean cross-entropy and number of correct predictions.
    pub fn forward_classification(
        &self,
        features: Tensor<B, 3>,
        labels:   Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, usize) {
        let logits  = self.forward(features);
        let loss    = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), labels.clone());
        // argmax(1) returns [batch, 1]
        let correct = logits
            .argmax(1)
            .flatten::<1>(0, 1)
            .equal(labels)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();
        (loss, correct.max(0) as usize)
    }
}
