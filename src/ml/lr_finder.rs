// ============================================================
// Layer 5 — Learning-Rate Finder
// ============================================================
// Trains for up to `num_iters` steps while the learning rate
// grows geometrically from init_lr to final_lr:
//
//   lr_i = init_lr · (final_lr / init_lr)^(i / (num_iters − 1))
//
// The loss is smoothed with a bias-corrected exponential moving
// average. The sweep stops early once the smoothed loss exceeds
// four times the best seen, or turns non-finite. The suggested
// rate is a tenth of the rate at the smoothed minimum.
//
// The sweep itself knows nothing about models: the trainer
// passes a closure that takes one step at a given rate and
// returns its loss.
//
// Reference: Smith (2017) Cyclical Learning Rates

use anyhow::Result;

use crate::domain::params::LrFinderParams;
use crate::infra::metrics::{LrFinderPoint, MetricsLogger};

const DIVERGENCE_FACTOR: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LrSweep {
    pub init_lr:   f64,
    pub final_lr:  f64,
    pub num_iters: usize,
    pub beta:      f64,
}

impl LrSweep {
    pub fn from_params(params: &LrFinderParams) -> Self {
        Self {
            init_lr:   params.init_lr,
            final_lr:  params.final_lr,
            num_iters: params.num_iters,
            beta:      params.beta,
        }
    }

    pub fn lr_at(&self, i: usize) -> f64 {
        let steps = self.num_iters.saturating_sub(1).max(1) as f64;
        self.init_lr * (self.final_lr / self.init_lr).powf(i as f64 / steps)
    }
}

/// Bias-corrected exponential moving average.
#[derive(Debug, Clone)]
pub struct LossSmoother {
    beta:  f64,
    avg:   f64,
    steps: i32,
}

impl LossSmoother {
    pub fn new(beta: f64) -> Self {
        Self { beta, avg: 0.0, steps: 0 }
    }

    pub fn update(&mut self, loss: f64) -> f64 {
        self.steps += 1;
        self.avg = self.beta * self.avg + (1.0 - self.beta) * loss;
        self.avg / (1.0 - self.beta.powi(self.steps))
    }
}

#[derive(Debug, Clone)]
pub struct LrFinderReport {
    pub points:       Vec<LrFinderPoint>,
    /// lr at the smoothed minimum, divided by 10.
    pub suggested_lr: Option<f64>,
    pub diverged:     bool,
}

/// Run the sweep, writing every step to `logger`.
pub fn run_sweep<F>(sweep: &LrSweep, logger: &MetricsLogger, mut step: F) -> Result<LrFinderReport>
where
    F: FnMut(f64) -> Result<f64>,
{
    let mut smoother = LossSmoother::new(sweep.beta);
    let mut points   = Vec::with_capacity(sweep.num_iters);
    let mut best: Option<(f64, f64)> = None;
    let mut diverged = false;

    for i in 0..sweep.num_iters {
        let lr       = sweep.lr_at(i);
        let loss     = step(lr)?;
        let smoothed = smoother.update(loss);

        let point = LrFinderPoint { lr, loss, smoothed_loss: smoothed };
        logger.log_lr_point(&point)?;
        points.push(point);

        if !smoothed.is_finite() {
            diverged = true;
            break;
        }
        match best {
            Some((best_loss, _)) if smoothed > DIVERGENCE_FACTOR * best_loss => {
                diverged = true;
                break;
            }
            Some((best_loss, _)) if smoothed >= best_loss => {}
            _ => best = Some((smoothed, lr)),
        }
    }

    let report = LrFinderReport {
        points,
        suggested_lr: best.map(|(_, lr)| lr / 10.0),
        diverged,
    };
    tracing::info!(
        "LR sweep finished after {} steps{}; suggested lr = {}",
        report.points.len(),
        if report.diverged { " (loss diverged)" } else { "" },
        report.suggested_lr.map_or("n/a".to_string(), |lr| format!("{lr:.3e}")),
    );
    Ok(report)
}
