// ============================================================
// Layer 5 — Learning-Rate Schedules
// ============================================================
// Pure functions of training progress; the trainer asks for the
// rate before every optimizer step.
//
//   warmR    cosine annealing with warm restarts
//            lr = η_min + ½(peak_i − η_min)(1 + cos(π·t_cur / T_i))
//            T_i = T_max · T_mult^i,  peak_i = base_lr · factor^i
//   stepLR   lr = base_lr · γ^⌊epoch / step_size⌋
//   constant lr = base_lr
//
// Progress is measured in epochs. The wrapper decides how often
// it advances: once per epoch (lr_decay_step = 0), every
// iteration (1) or every n iterations (n).
//
// Reference: Loshchilov & Hutter (2017) SGDR

use std::f64::consts::PI;

use crate::domain::error::LauncherError;
use crate::domain::params::LrSchedulerParams;

// ─── WarmRestarts ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct WarmRestarts {
    pub base_lr:   f64,
    pub t_max:     usize,
    pub t_mult:    usize,
    pub factor:    f64,
    pub eta_min:   f64,
    /// Interpolate between peak and η_min in log space.
    pub log_decay: bool,
}

impl WarmRestarts {
    /// Cycle index and position inside it, both in epochs.
    fn locate(&self, t: f64) -> (u32, f64, f64) {
        let mut start  = 0.0;
        let mut length = self.t_max as f64;
        let mut cycle  = 0u32;
        while t >= start + length {
            start  += length;
            length *= self.t_mult as f64;
            cycle  += 1;
        }
        (cycle, t - start, length)
    }

    pub fn lr_at(&self, t: f64) -> f64 {
        let (cycle, t_cur, length) = self.locate(t.max(0.0));
        let peak   = self.base_lr * self.factor.powi(cycle as i32);
        let cosine = 0.5 * (1.0 + (PI * t_cur / length).cos());

        if self.log_decay && peak > 0.0 && self.eta_min > 0.0 {
            let (lo, hi) = (self.eta_min.ln(), peak.ln());
            (lo + (hi - lo) * cosine).exp()
        } else {
            self.eta_min + (peak - self.eta_min) * cosine
        }
    }
}

// ─── StepLr ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct StepLr {
    pub base_lr:   f64,
    pub step_size: usize,
    pub gamma:     f64,
}

impl StepLr {
    pub fn lr_at(&self, epoch: usize) -> f64 {
        self.base_lr * self.gamma.powi((epoch / self.step_size) as i32)
    }
}

// ─── LrSchedule ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub enum LrSchedule {
    WarmRestarts(WarmRestarts),
    Step(StepLr),
    Constant(f64),
}

impl LrSchedule {
    pub fn name(&self) -> &'static str {
        match self {
            LrSchedule::WarmRestarts(_) => "warmR",
            LrSchedule::Step(_)         => "stepLR",
            LrSchedule::Constant(_)     => "constant",
        }
    }
}

/// Position of the trainer inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 0-based epoch.
    pub epoch:           usize,
    /// 0-based iteration inside the epoch.
    pub iter:            usize,
    pub iters_per_epoch: usize,
}

// ─── LrSchedulerWrapper ───────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct LrSchedulerWrapper {
    schedule:      LrSchedule,
    lr_decay_step: usize,
}

impl LrSchedulerWrapper {
    pub fn new(schedule: LrSchedule, lr_decay_step: usize) -> Self {
        Self { schedule, lr_decay_step }
    }

    pub fn from_params(params: &LrSchedulerParams, base_lr: f64) -> Result<Self, LauncherError> {
        let schedule = match params.name.as_str() {
            "warmR" => {
                if params.warm_r_t_max == 0 || params.warm_r_t_mult == 0 {
                    return Err(LauncherError::config("warmR.T_max and warmR.T_mult must be at least 1"));
                }
                LrSchedule::WarmRestarts(WarmRestarts {
                    base_lr,
                    t_max:     params.warm_r_t_max,
                    t_mult:    params.warm_r_t_mult,
                    factor:    params.warm_r_factor,
                    eta_min:   params.warm_r_eta_min,
                    log_decay: params.warm_r_log_decay,
                })
            }
            "stepLR" => {
                if params.step_lr_step_size == 0 {
                    return Err(LauncherError::config("stepLR.step_size must be at least 1"));
                }
                LrSchedule::Step(StepLr {
                    base_lr,
                    step_size: params.step_lr_step_size,
                    gamma:     params.step_lr_gamma,
                })
            }
            "constant" => LrSchedule::Constant(base_lr),
            other => {
                return Err(LauncherError::config(format!(
                    "unknown lr_scheduler '{other}' (expected warmR, stepLR or constant)"
                )))
            }
        };
        Ok(Self::new(schedule, params.warm_r_lr_decay_step))
    }

    pub fn schedule(&self) -> &LrSchedule {
        &self.schedule
    }

    /// Progress in epochs, advanced only at `lr_decay_step` boundaries.
    fn quantized_epochs(&self, p: Progress) -> f64 {
        if self.lr_decay_step == 0 || p.iters_per_epoch == 0 {
            return p.epoch as f64;
        }
        let global = p.epoch * p.iters_per_epoch + p.iter;
        let steps  = (global / self.lr_decay_step) * self.lr_decay_step;
        steps as f64 / p.iters_per_epoch as f64
    }

    pub fn lr(&self, p: Progress) -> f64 {
        match &self.schedule {
            LrSchedule::WarmRestarts(w) => w.lr_at(self.quantized_epochs(p)),
            LrSchedule::Step(s)         => s.lr_at(p.epoch),
            LrSchedule::Constant(lr)    => *lr,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn warm(t_mult: usize, log_decay: bool) -> WarmRestarts {
        WarmRestarts { base_lr: 0.1, t_max: 4, t_mult, factor: 0.5, eta_min: 1e-4, log_decay }
    }

    fn at(epoch: usize, iter: usize) -> Progress {
        Progress { epoch, iter, iters_per_epoch: 100 }
    }

    #[test]
    fn test_warm_restarts_peaks_and_troughs() {
        let w = warm(1, false);
        assert!((w.lr_at(0.0) - 0.1).abs() < 1e-12);
        assert!((w.lr_at(2.0) - (1e-4 + (0.1 - 1e-4) * 0.5)).abs() < 1e-12);
        // restart with the peak scaled by factor
        assert!((w.lr_at(4.0) - 0.05).abs() < 1e-12);
        assert!(w.lr_at(3.99) < w.lr_at(4.0));
    }

    #[test]
    fn test_cycle_length_grows_with_t_mult() {
        let w = warm(2, false);
        // cycles: [0,4) [4,12) [12,28)
        assert_eq!(w.locate(5.0), (1, 1.0, 8.0));
        assert_eq!(w.locate(12.0), (2, 0.0, 16.0));
    }

    #[test]
    fn test_log_decay_stays_between_bounds() {
        let w = warm(1, true);
        for i in 0..40 {
            let lr = w.lr_at(i as f64 * 0.1);
            assert!(lr <= 0.1 + 1e-12 && lr >= 1e-4 - 1e-12);
        }
        // geometric midpoint halfway through the cycle
        assert!((w.lr_at(2.0) - (0.1f64 * 1e-4).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_step_lr() {
        let s = StepLr { base_lr: 1.0, step_size: 6, gamma: 0.5 };
        assert_eq!(s.lr_at(5), 1.0);
        assert_eq!(s.lr_at(6), 0.5);
        assert_eq!(s.lr_at(12), 0.25);
    }

    #[test]
    fn test_decay_step_quantisation() {
        let schedule = LrSchedule::WarmRestarts(warm(1, false));

        let per_epoch = LrSchedulerWrapper::new(schedule.clone(), 0);
        assert_eq!(per_epoch.lr(at(1, 0)), per_epoch.lr(at(1, 99)));

        let per_iter = LrSchedulerWrapper::new(schedule.clone(), 1);
        assert!(per_iter.lr(at(1, 0)) > per_iter.lr(at(1, 1)));

        let every_50 = LrSchedulerWrapper::new(schedule, 50);
        assert_eq!(every_50.lr(at(1, 0)), every_50.lr(at(1, 49)));
        assert!(every_50.lr(at(1, 49)) > every_50.lr(at(1, 50)));
    }

    #[test]
    fn test_from_params() {
        let params = LrSchedulerParams::default();
        let w = LrSchedulerWrapper::from_params(&params, 0.001).unwrap();
        assert_eq!(w.schedule().name(), "warmR");

        let constant = LrSchedulerParams { name: "constant".into(), ..params.clone() };
        let c = LrSchedulerWrapper::from_params(&constant, 0.01).unwrap();
        assert_eq!(c.lr(at(17, 3)), 0.01);

        let unknown = LrSchedulerParams { name: "cyclic".into(), ..params };
        assert!(matches!(
            LrSchedulerWrapper::from_params(&unknown, 0.01),
            Err(LauncherError::Config(_))
        ));
    }
}
