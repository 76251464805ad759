// ============================================================
// Layer 2 — Extraction Scheduler (phase 4)
// ============================================================
// Walks the extraction matrix tap point → epoch → dataset:
//
//   per tap point  derive <tap>.extract.config from nnet.config
//   per epoch      wait until <epoch>.<suffix> exists
//   per dataset    run the extraction script once
//
// The first failing job aborts everything after it. Checkpoints
// may still be in the making by a trainer in another process,
// hence the readiness wait.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::pipeline::{LaunchOptions, RunContext, Stage, StageOutcome};
use crate::domain::descriptor::TapPoint;
use crate::domain::job::{extraction_matrix, Checkpoint, ExtractionJob, JobLayout};
use crate::domain::params::ParameterSet;
use crate::domain::stage::Phase;
use crate::domain::traits::{CommandRunner, ExternalCommand};
use crate::infra::model_dir::{extract_config_name, ModelDir, TRAINING_DESCRIPTOR};
use crate::infra::readiness::ReadinessWait;
use crate::infra::shutdown::ShutdownSignal;

pub struct ExtractionScheduler<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> ExtractionScheduler<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn run(&self, params: &ParameterSet, options: &LaunchOptions, shutdown: &ShutdownSignal) -> Result<()> {
        let extraction = &params.extraction;
        let model_dir  = ModelDir::new(&params.paths.model_dir);
        let wait = ReadinessWait::new(
            Duration::from_millis(extraction.poll_interval_ms),
            extraction.readiness_timeout_secs.map(Duration::from_secs),
        );

        for &tap in &extraction.positions {
            let config_name = derive_extract_config(&model_dir, tap)?;

            for epoch in &extraction.epochs {
                let checkpoint = Checkpoint::new(epoch.as_str(), params.training.suffix.as_str());
                let waited = wait.wait_for_file(&model_dir.checkpoint_path(&checkpoint), shutdown)?;
                if waited > Duration::ZERO {
                    tracing::debug!("Checkpoint '{}' ready after {:.1}s", checkpoint.file_name(), waited.as_secs_f64());
                }

                for dataset in &extraction.datasets {
                    let job     = ExtractionJob::new(&layout(params), tap, epoch, dataset);
                    let command = extraction_command(params, options, &job, &config_name);
                    tracing::info!("Extracting {} embeddings of '{}'", job.point_name, job.dataset);
                    self.runner
                        .run(&command)
                        .with_context(|| format!("Extraction job {}/{} failed", job.point_name, job.dataset))?;
                }
            }
        }
        Ok(())
    }
}

fn layout(params: &ParameterSet) -> JobLayout<'_> {
    JobLayout {
        model_dir: &params.paths.model_dir,
        data_root: &params.extraction.data_root,
        prefix:    &params.extraction.prefix,
        suffix:    &params.training.suffix,
    }
}

/// Every job the matrix of `params` expands to, in run order.
pub fn planned_jobs(params: &ParameterSet) -> Vec<ExtractionJob> {
    let extraction = &params.extraction;
    extraction_matrix(&layout(params), &extraction.positions, &extraction.epochs, &extraction.datasets)
}

/// Write `<tap>.extract.config` and return its name.
fn derive_extract_config(model_dir: &ModelDir, tap: TapPoint) -> Result<String> {
    let descriptor = model_dir
        .read_descriptor(TRAINING_DESCRIPTOR)
        .context("Extraction needs the training descriptor; run phase 3 first")?;
    let name = extract_config_name(tap);
    model_dir.write_descriptor(&descriptor.for_inference(tap), &name)?;
    Ok(name)
}

pub fn extraction_command(
    params:      &ParameterSet,
    options:     &LaunchOptions,
    job:         &ExtractionJob,
    config_name: &str,
) -> ExternalCommand {
    let extraction = &params.extraction;
    ExternalCommand::new(extraction.shell.as_str())
        .arg(extraction.script.display().to_string())
        .opt("model", &job.model_file)
        .opt("cmn", extraction.cmn)
        .opt("nj", extraction.nj)
        .opt("use-gpu", options.use_gpu)
        .opt("gpu-id", &options.gpu_id)
        .opt("force", extraction.force)
        .opt("nnet-config", format!("config/{config_name}"))
        .arg(params.paths.model_dir.display().to_string())
        .arg(job.dataset_dir.display().to_string())
        .arg(job.output_dir.display().to_string())
}

// ─── ExtractStage ─────────────────────────────────────────────────────────────
pub struct ExtractStage<R: CommandRunner> {
    scheduler: ExtractionScheduler<R>,
}

impl<R: CommandRunner> ExtractStage<R> {
    pub fn new(runner: R) -> Self {
        Self { scheduler: ExtractionScheduler::new(runner) }
    }
}

impl<R: CommandRunner> Stage for ExtractStage<R> {
    fn name(&self) -> &'static str { "extract" }

    fn phases(&self) -> (Phase, Phase) { (Phase::Extract, Phase::Extract) }

    fn run(&self, ctx: &RunContext<'_>) -> Result<StageOutcome> {
        self.scheduler.run(ctx.params, ctx.options, ctx.shutdown)?;
        Ok(StageOutcome::Continue)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::{ModelDescriptor, Nonlinearity, TrainingMode};
    use crate::domain::error::LauncherError;
    use std::{cell::RefCell, fs, path::Path};

    /// Records every command; fails the `fail_at`-th one (0-based).
    struct Recorder {
        commands: RefCell<Vec<ExternalCommand>>,
        fail_at:  Option<usize>,
    }

    impl Recorder {
        fn new(fail_at: Option<usize>) -> Self {
            Self { commands: RefCell::new(Vec::new()), fail_at }
        }
    }

    impl CommandRunner for Recorder {
        fn run(&self, command: &ExternalCommand) -> Result<()> {
            let mut commands = self.commands.borrow_mut();
            commands.push(command.clone());
            if Some(commands.len() - 1) == self.fail_at {
                return Err(LauncherError::ExternalCommand {
                    command: command.to_string(),
                    status:  "exit status: 1".into(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn trained_model_dir(root: &Path, epochs: &[&str]) -> ParameterSet {
        let mut params = ParameterSet::default();
        params.paths.model_dir          = root.join("exp/model");
        params.extraction.data_root     = root.join("data");
        params.extraction.prefix        = "mfcc".into();
        params.extraction.positions     = vec![TapPoint::Far, TapPoint::Near];
        params.extraction.epochs        = epochs.iter().map(|e| e.to_string()).collect();
        params.extraction.datasets      = vec!["train".into(), "test".into()];
        params.extraction.poll_interval_ms = 10;

        let model_dir = ModelDir::new(&params.paths.model_dir);
        fs::create_dir_all(model_dir.config_dir()).unwrap();
        let descriptor = ModelDescriptor {
            blueprint:     model_dir.config_file("xvector.json"),
            architecture:  "xvector".into(),
            feat_dim:      23,
            num_targets:   1211,
            nonlinearity:  Nonlinearity::Relu,
            aug_dropout:   0.2,
            training_mode: TrainingMode::Training,
            tap_point:     TapPoint::Far,
        };
        model_dir.write_descriptor(&descriptor, TRAINING_DESCRIPTOR).unwrap();
        for epoch in epochs {
            fs::write(model_dir.checkpoint_path(&Checkpoint::new(*epoch, "params")), b"x").unwrap();
        }
        params
    }

    #[test]
    fn test_jobs_run_in_matrix_order() {
        let dir      = tempfile::tempdir().unwrap();
        let params   = trained_model_dir(dir.path(), &["6", "12"]);
        let recorder = Recorder::new(None);

        ExtractionScheduler::new(&recorder)
            .run(&params, &LaunchOptions::default(), &ShutdownSignal::new())
            .unwrap();

        let commands = recorder.commands.borrow();
        assert_eq!(commands.len(), 8);
        let seen: Vec<(String, String)> = commands
            .iter()
            .map(|c| (c.option_value("model").unwrap().to_string(), c.args.last().unwrap().clone()))
            .collect();
        let expected: Vec<(String, String)> = planned_jobs(&params)
            .iter()
            .map(|j| (j.model_file.clone(), j.output_dir.display().to_string()))
            .collect();
        assert_eq!(seen, expected);

        assert_eq!(commands[0].option_value("nnet-config"), Some("config/far.extract.config"));
        assert_eq!(commands[4].option_value("nnet-config"), Some("config/near.extract.config"));
        assert_eq!(commands[0].option_value("gpu-id"), Some(""));
    }

    #[test]
    fn test_inference_descriptors_are_derived() {
        let dir    = tempfile::tempdir().unwrap();
        let params = trained_model_dir(dir.path(), &["6"]);

        ExtractionScheduler::new(Recorder::new(None))
            .run(&params, &LaunchOptions::default(), &ShutdownSignal::new())
            .unwrap();

        let model_dir = ModelDir::new(&params.paths.model_dir);
        let near = model_dir.read_descriptor("near.extract.config").unwrap();
        assert_eq!(near.training_mode, TrainingMode::Inference);
        assert_eq!(near.tap_point, TapPoint::Near);
        assert_eq!(near.num_targets, 1211);

        // The training descriptor is left alone.
        let train = model_dir.read_descriptor(TRAINING_DESCRIPTOR).unwrap();
        assert_eq!(train.training_mode, TrainingMode::Training);
    }

    #[test]
    fn test_first_failure_aborts_the_rest() {
        let dir      = tempfile::tempdir().unwrap();
        let params   = trained_model_dir(dir.path(), &["6", "12"]);
        let recorder = Recorder::new(Some(2));

        let err = ExtractionScheduler::new(&recorder)
            .run(&params, &LaunchOptions::default(), &ShutdownSignal::new())
            .unwrap_err();

        assert_eq!(recorder.commands.borrow().len(), 3);
        assert!(matches!(
            err.downcast_ref::<LauncherError>(),
            Some(LauncherError::ExternalCommand { .. })
        ));
    }

    #[test]
    fn test_missing_checkpoint_times_out() {
        let dir        = tempfile::tempdir().unwrap();
        let mut params = trained_model_dir(dir.path(), &["6"]);
        params.extraction.epochs = vec!["6".into(), "12".into()];
        params.extraction.readiness_timeout_secs = Some(0);
        let recorder = Recorder::new(None);

        let err = ExtractionScheduler::new(&recorder)
            .run(&params, &LaunchOptions::default(), &ShutdownSignal::new())
            .unwrap_err();

        // epoch 6 ran for both datasets before the wait on 12 gave up
        assert_eq!(recorder.commands.borrow().len(), 2);
        assert!(matches!(
            err.downcast_ref::<LauncherError>(),
            Some(LauncherError::ReadinessNeverSatisfied { .. })
        ));
    }

    #[test]
    fn test_missing_training_descriptor_fails() {
        let dir    = tempfile::tempdir().unwrap();
        let params = trained_model_dir(dir.path(), &["6"]);
        fs::remove_file(ModelDir::new(&params.paths.model_dir).config_file(TRAINING_DESCRIPTOR)).unwrap();

        let result = ExtractionScheduler::new(Recorder::new(None))
            .run(&params, &LaunchOptions::default(), &ShutdownSignal::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_interrupt_stops_the_wait() {
        let dir        = tempfile::tempdir().unwrap();
        let mut params = trained_model_dir(dir.path(), &[]);
        params.extraction.epochs = vec!["6".into()];
        let signal = ShutdownSignal::new();
        signal.trigger();

        let err = ExtractionScheduler::new(Recorder::new(None))
            .run(&params, &LaunchOptions::default(), &signal)
            .unwrap_err();
        assert!(LauncherError::is_interrupt(&err));
    }
}
