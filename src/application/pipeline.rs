// ============================================================
// Layer 2 — Pipeline Driver
// ============================================================
// Runs the three macro stages of a launch in a fixed order:
//
//   preprocess (phases 0–2) → train (phase 3) → extract (phase 4)
//
// Every stage answers the same three questions: its name,
// whether the requested range selects it, and how to run it.
// The driver skips unselected stages, stops early when a stage
// asks to halt (the LR finder does), and applies the failure
// policy:
//
//   Uniform      every stage is guarded: an interrupt ends the
//                run quietly, any other failure is printed with
//                its cause chain; both give exit status 1
//   ExtractOnly  only extraction is guarded; other failures are
//                returned to the caller unchanged
//
// Reference: Rust Book §17 (Trait Objects)

use std::process::ExitCode;

use anyhow::Result;
use clap::ValueEnum;

use crate::domain::error::LauncherError;
use crate::domain::params::ParameterSet;
use crate::domain::stage::{Phase, StageRange};
use crate::infra::shutdown::ShutdownSignal;

// ─── LaunchOptions ────────────────────────────────────────────────────────────
/// Per-invocation switches that are not part of the ParameterSet.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
    pub range:         StageRange,
    /// Clipped to ≥ -1.
    pub train_stage:   i64,
    pub force_clear:   bool,
    pub use_gpu:       bool,
    pub gpu_id:        String,
    pub benchmark:     bool,
    pub run_lr_finder: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            range:         StageRange::default(),
            train_stage:   -1,
            force_clear:   false,
            use_gpu:       true,
            gpu_id:        String::new(),
            benchmark:     true,
            run_lr_finder: false,
        }
    }
}

/// Everything a stage may read. Nothing in it is mutated by a stage.
pub struct RunContext<'a> {
    pub params:   &'a ParameterSet,
    pub options:  &'a LaunchOptions,
    pub shutdown: &'a ShutdownSignal,
}

// ─── Stage ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    /// Skip every later stage and finish successfully.
    Halt,
}

pub trait Stage {
    fn name(&self) -> &'static str;

    /// First and last phase this stage covers.
    fn phases(&self) -> (Phase, Phase);

    /// Whether the requested range selects this stage.
    fn precondition(&self, range: &StageRange) -> bool {
        let (first, last) = self.phases();
        range.overlaps(first, last)
    }

    fn run(&self, ctx: &RunContext<'_>) -> Result<StageOutcome>;
}

// ─── FailurePolicy ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FailurePolicy {
    #[default]
    Uniform,
    ExtractOnly,
}

impl FailurePolicy {
    pub fn guards(self, stage: &dyn Stage) -> bool {
        match self {
            FailurePolicy::Uniform     => true,
            FailurePolicy::ExtractOnly => {
                let (first, last) = stage.phases();
                first <= Phase::Extract && Phase::Extract <= last
            }
        }
    }
}

// ─── PipelineExit ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineExit {
    Completed,
    Halted { stage: &'static str },
    Failed { stage: &'static str, interrupted: bool },
}

impl PipelineExit {
    pub fn succeeded(&self) -> bool {
        !matches!(self, PipelineExit::Failed { .. })
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.succeeded() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
    }
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────
pub struct Pipeline<'s> {
    stages: Vec<Box<dyn Stage + 's>>,
    policy: FailurePolicy,
}

impl<'s> Pipeline<'s> {
    pub fn new(policy: FailurePolicy) -> Self {
        Self { stages: Vec::new(), policy }
    }

    pub fn with_stage(mut self, stage: impl Stage + 's) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Names of the stages `range` selects, in run order.
    pub fn plan(&self, range: &StageRange) -> Vec<&'static str> {
        self.stages
            .iter()
            .filter(|s| s.precondition(range))
            .map(|s| s.name())
            .collect()
    }

    pub fn run(&self, ctx: &RunContext<'_>) -> Result<PipelineExit> {
        let range = &ctx.options.range;
        tracing::info!("Running phases {}..={}", range.stage(), range.endstage());

        for stage in &self.stages {
            let name = stage.name();
            if !stage.precondition(range) {
                tracing::debug!("Skipping stage '{name}'");
                continue;
            }

            tracing::info!("── Stage '{name}' ──");
            match stage.run(ctx) {
                Ok(StageOutcome::Continue) => {}
                Ok(StageOutcome::Halt) => {
                    tracing::info!("Stage '{name}' halted the pipeline");
                    return Ok(PipelineExit::Halted { stage: name });
                }
                Err(err) if self.policy.guards(stage.as_ref()) => {
                    let interrupted = LauncherError::is_interrupt(&err);
                    if interrupted {
                        tracing::debug!("Stage '{name}' interrupted");
                    } else {
                        eprintln!("Stage '{name}' failed: {err:?}");
                    }
                    return Ok(PipelineExit::Failed { stage: name, interrupted });
                }
                Err(err) => return Err(err.context(format!("stage '{name}' failed"))),
            }
        }
        Ok(PipelineExit::Completed)
    }
}
