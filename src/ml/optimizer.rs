// ============================================================
// Layer 5 — Optimizer Selection
// ============================================================
// Validates the optimizer group of the ParameterSet and builds
// the matching Burn optimizer:
//
//   sgd    momentum, optional Nesterov, L2 weight decay
//   adam   β1, β2, L2 weight decay
//   adamW  β1, β2, decoupled weight decay
//
// The learning rate is not part of the optimizer; the trainer
// passes the scheduled rate to every step.
//
// Reference: Kingma & Ba (2015) Adam
//            Loshchilov & Hutter (2019) AdamW

use burn::{
    module::AutodiffModule,
    optim::{
        decay::WeightDecayConfig,
        momentum::MomentumConfig,
        AdamConfig, AdamWConfig, SgdConfig,
    },
    tensor::backend::AutodiffBackend,
};

use crate::domain::error::LauncherError;
use crate::domain::params::OptimizerParams;

#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerSpec {
    Sgd   { momentum: f64, nesterov: bool, weight_decay: f64 },
    Adam  { beta1: f64, beta2: f64, weight_decay: f64 },
    AdamW { beta1: f64, beta2: f64, weight_decay: f64 },
}

impl OptimizerSpec {
    pub fn from_params(params: &OptimizerParams) -> Result<Self, LauncherError> {
        if params.lookahead_alpha > 0.0 {
            return Err(LauncherError::config(format!(
                "lookahead (alpha={}) is not supported; set lookahead.alpha to 0",
                params.lookahead_alpha
            )));
        }
        if !(params.learn_rate > 0.0) {
            return Err(LauncherError::config(format!("optimizer.learn_rate {} must be positive", params.learn_rate)));
        }
        let spec = match params.name.as_str() {
            "sgd" => OptimizerSpec::Sgd {
                momentum:     params.momentum,
                nesterov:     params.nesterov,
                weight_decay: params.weight_decay,
            },
            "adam" => OptimizerSpec::Adam {
                beta1:        params.beta1,
                beta2:        params.beta2,
                weight_decay: params.weight_decay,
            },
            "adamW" => OptimizerSpec::AdamW {
                beta1:        params.beta1,
                beta2:        params.beta2,
                weight_decay: params.weight_decay,
            },
            other => {
                return Err(LauncherError::config(format!(
                    "unknown optimizer '{other}' (expected sgd, adam or adamW)"
                )))
            }
        };
        Ok(spec)
    }

    pub fn name(&self) -> &'static str {
        match self {
            OptimizerSpec::Sgd { .. }   => "sgd",
            OptimizerSpec::Adam { .. }  => "adam",
            OptimizerSpec::AdamW { .. } => "adamW",
        }
    }
}

/// Receives the concrete optimizer built from a spec. Each Burn
/// optimizer is its own type, so the training loop is written once
/// as a visitor and instantiated per optimizer.
pub trait WithOptimizer<B: AutodiffBackend, M: AutodiffModule<B>> {
    type Output;

    fn run<O: burn::optim::Optimizer<M, B>>(self, optim: O) -> Self::Output;
}

pub fn dispatch<B, M, V>(spec: &OptimizerSpec, visitor: V) -> V::Output
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    V: WithOptimizer<B, M>,
{
    let decay = |w: f64| (w > 0.0).then(|| WeightDecayConfig::new(w as f32));
    match *spec {
        OptimizerSpec::Sgd { momentum, nesterov, weight_decay } => {
            let momentum = (momentum > 0.0).then(|| {
                MomentumConfig::new()
                    .with_momentum(momentum)
                    .with_dampening(0.0)
                    .with_nesterov(nesterov)
            });
            let optim = SgdConfig::new()
                .with_momentum(momentum)
                .with_weight_decay(decay(weight_decay))
                .init::<B, M>();
            visitor.run(optim)
        }
        OptimizerSpec::Adam { beta1, beta2, weight_decay } => {
            let optim = AdamConfig::new()
                .with_beta_1(beta1 as f32)
                .with_beta_2(beta2 as f32)
                .with_weight_decay(decay(weight_decay))
                .init::<B, M>();
            visitor.run(optim)
        }
        OptimizerSpec::AdamW { beta1, beta2, weight_decay } => {
            let optim = AdamWConfig::new()
                .with_beta_1(beta1 as f32)
                .with_beta_2(beta2 as f32)
                .with_weight_decay(weight_decay as f32)
                .init::<B, M>();
            visitor.run(optim)
        }
    }
}
