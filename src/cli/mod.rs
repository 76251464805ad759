// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses the flags with
// `clap`, loads the parameter set, wires the three stages into
// a pipeline and maps the outcome to an exit status. All
// business logic is delegated to Layer 2 (application).
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use commands::RunArgs;

use crate::application::{
    extract_use_case::{planned_jobs, ExtractStage},
    pipeline::{LaunchOptions, Pipeline, RunContext},
    preprocess_stage::PreprocessStage,
    train_use_case::{TrainStage, TrainUseCase},
};
use crate::domain::params::ParameterSet;
use crate::domain::stage::Phase;
use crate::infra::{process::ShellCommandRunner, shutdown::ShutdownSignal};
use crate::ml::factory::FactoryRegistry;

#[derive(Parser, Debug)]
#[command(
    name = "xvector-launcher",
    version,
    about = "Prepare egs, train an x-vector model and extract embeddings, phase by phase."
)]
pub struct Cli {
    #[command(flatten)]
    pub args: RunArgs,
}

impl Cli {
    pub fn run(self) -> Result<ExitCode> {
        let params = match &self.args.params {
            Some(path) => ParameterSet::from_json_file(path)?,
            None => {
                let params = ParameterSet::default();
                params.validate()?;
                params
            }
        };
        let options = LaunchOptions::from(&self.args);

        let shutdown = ShutdownSignal::new();
        let runner   = ShellCommandRunner::new(shutdown.clone());
        let pipeline = Pipeline::new(self.args.failure_policy)
            .with_stage(PreprocessStage::new(runner.clone()))
            .with_stage(TrainStage::new(TrainUseCase::new(FactoryRegistry::standard())))
            .with_stage(ExtractStage::new(runner));

        if self.args.dry_run {
            print_plan(&pipeline, &params, &options);
            return Ok(ExitCode::SUCCESS);
        }

        shutdown.install_ctrlc()?;
        let exit = pipeline.run(&RunContext { params: &params, options: &options, shutdown: &shutdown })?;
        tracing::info!("Pipeline finished: {exit:?}");
        Ok(exit.exit_code())
    }
}

/// The LR finder ends the run after phase 3, so phase 4 only happens
/// when the finder is off or phase 3 is outside the window.
fn extraction_planned(options: &LaunchOptions) -> bool {
    let range = &options.range;
    range.runs(Phase::Extract) && !(options.run_lr_finder && range.runs(Phase::Train))
}

fn print_plan(pipeline: &Pipeline<'_>, params: &ParameterSet, options: &LaunchOptions) {
    let range = &options.range;
    println!("Phases {}..={}", range.stage(), range.endstage());
    for phase in range.phases() {
        println!("  {} {}", phase.id(), phase.label());
    }
    println!("Stages: {}", pipeline.plan(range).join(" → "));

    if extraction_planned(options) {
        println!("Extraction jobs:");
        for job in planned_jobs(params) {
            println!(
                "  {:<18} {:<12} {} → {}",
                job.point_name,
                job.model_file,
                job.dataset_dir.display(),
                job.output_dir.display()
            );
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stage::StageRange;

    fn options(stage: i64, endstage: i64, run_lr_finder: bool) -> LaunchOptions {
        LaunchOptions { range: StageRange::new(stage, endstage), run_lr_finder, ..LaunchOptions::default() }
    }

    #[test]
    fn test_extraction_planned() {
        assert!(extraction_planned(&options(3, 4, false)));
        assert!(!extraction_planned(&options(3, 4, true)));
        // Finder outside the window does not stop phase 4
        assert!(extraction_planned(&options(4, 4, true)));
        assert!(!extraction_planned(&options(0, 3, false)));
    }

    #[test]
    fn test_defaults_parse() {
        let cli  = Cli::try_parse_from(["xvector-launcher"]).unwrap();
        let args = &cli.args;
        assert_eq!(args.stage, 3);
        assert_eq!(args.endstage, 4);
        assert_eq!(args.train_stage, -1);
        assert!(!args.force_clear);
        assert!(args.use_gpu);
        assert_eq!(args.gpu_id, "");
        assert!(args.benchmark);
        assert!(!args.run_lr_finder);
        assert!(args.params.is_none());
        assert_eq!(args.failure_policy, crate::application::pipeline::FailurePolicy::Uniform);
        assert!(!args.dry_run);
        assert_eq!(LaunchOptions::from(args), LaunchOptions::default());
    }

    #[test]
    fn test_negative_values_are_accepted_and_clipped() {
        let cli = Cli::try_parse_from([
            "xvector-launcher", "--stage", "-2", "--endstage", "9", "--train-stage", "-7",
        ])
        .unwrap();
        assert_eq!(cli.args.stage, -2);
        assert_eq!(cli.args.train_stage, -7);

        let options = LaunchOptions::from(&cli.args);
        assert_eq!(options.range.stage(), 0);
        assert_eq!(options.range.endstage(), 4);
        assert_eq!(options.train_stage, -1);
    }

    #[test]
    fn test_boolean_flags_take_a_value() {
        let cli = Cli::try_parse_from([
            "xvector-launcher", "--use-gpu", "false", "--run-lr-finder", "true", "--gpu-id", "1",
            "--failure-policy", "extract-only",
        ])
        .unwrap();
        assert!(!cli.args.use_gpu);
        assert!(cli.args.run_lr_finder);
        assert_eq!(cli.args.gpu_id, "1");
        assert_eq!(cli.args.failure_policy, crate::application::pipeline::FailurePolicy::ExtractOnly);

        assert!(Cli::try_parse_from(["xvector-launcher", "--use-gpu"]).is_err());
    }
}
