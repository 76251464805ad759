// ============================================================
// Layer 1 — CLI Arguments
// ============================================================
// Every flag of a launch. Boolean flags take an explicit value
// (`--use-gpu false`) so a run script can pass them through
// unchanged.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{ArgAction, Args};

use crate::application::pipeline::{FailurePolicy, LaunchOptions};
use crate::domain::stage::StageRange;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// First phase to run (clipped to ≥ 0)
    ///   0 vad/cmn, 1 remove short utts, 2 chunk egs, 3 train, 4 extract
    #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
    pub stage: i64,

    /// Last phase to run (clipped to ≤ 4)
    #[arg(long, default_value_t = 4, allow_negative_numbers = true)]
    pub endstage: i64,

    /// -1 creates a fresh model directory, 0 starts from scratch in an
    /// existing one, n > 0 resumes from checkpoint n
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub train_stage: i64,

    /// Clear the preprocessing output before rebuilding it
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub force_clear: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub use_gpu: bool,

    /// GPU index; empty picks the default adapter
    #[arg(long, default_value = "")]
    pub gpu_id: String,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub benchmark: bool,

    /// Sweep learning rates instead of training, then stop
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub run_lr_finder: bool,

    /// JSON file overriding the default parameter set
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Which stage failures end in exit status 1 instead of an error
    #[arg(long, value_enum, default_value_t = FailurePolicy::Uniform)]
    pub failure_policy: FailurePolicy,

    /// Print the phase plan and extraction jobs, run nothing
    #[arg(long)]
    pub dry_run: bool,
}

impl From<&RunArgs> for LaunchOptions {
    fn from(a: &RunArgs) -> Self {
        LaunchOptions {
            range:         StageRange::new(a.stage, a.endstage),
            train_stage:   a.train_stage.max(-1),
            force_clear:   a.force_clear,
            use_gpu:       a.use_gpu,
            gpu_id:        a.gpu_id.clone(),
            benchmark:     a.benchmark,
            run_lr_finder: a.run_lr_finder,
        }
    }
}
