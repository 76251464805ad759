// ============================================================
// Layer 2 — TrainUseCase (phase 3)
// ============================================================
// Assembles one training invocation, then hands it to the
// trainer:
//
//   Step 1: Prepare the model directory   (Layer 6 - infra)
//   Step 2: Index the egs directory       (Layer 4 - data)
//   Step 3: Build the model config        (Layer 5 - ml)
//   Step 4: Optimizer + LR schedule       (Layer 5 - ml)
//   Step 5: Persist params + nnet.config  (Layer 6 - infra)
//   Step 6: Pick the device               (Layer 5 - ml)
//
// With --run-lr-finder the sweep replaces training and the
// pipeline halts afterwards; nothing is extracted.
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};

use crate::application::pipeline::{LaunchOptions, RunContext, Stage, StageOutcome};
use crate::data::bunch::Bunch;
use crate::domain::descriptor::{ModelDescriptor, TrainingMode};
use crate::domain::params::ParameterSet;
use crate::domain::stage::Phase;
use crate::infra::model_dir::{ModelDir, TRAINING_DESCRIPTOR};
use crate::ml::{
    factory::{Blueprint, FactoryRegistry},
    optimizer::OptimizerSpec,
    scheduler::LrSchedulerWrapper,
    trainer::{run_lr_finder, run_training, DeviceChoice, TrainingPlan},
};

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    registry: FactoryRegistry,
}

impl TrainUseCase {
    pub fn new(registry: FactoryRegistry) -> Self {
        Self { registry }
    }

    /// Steps 1–6. Nothing is trained yet; any error here is fatal.
    pub fn assemble(&self, params: &ParameterSet, options: &LaunchOptions) -> Result<(TrainingPlan, Bunch)> {
        // Step 1
        let model_dir = ModelDir::new(&params.paths.model_dir);
        let blueprint_copy = model_dir.bootstrap(&params.paths.model_blueprint, options.train_stage)?;

        // Step 2
        let bunch = Bunch::from_egs_dir(&params.paths.egs_dir, &params.egs)
            .with_context(|| format!("Cannot load egs from '{}'", params.paths.egs_dir.display()))?;
        let feat_dim    = bunch.info.feat_dim;
        let num_targets = bunch.info.num_targets;

        // Step 3
        let blueprint    = Blueprint::from_json_file(&blueprint_copy)?;
        let factory      = self.registry.get(&blueprint.architecture)?;
        let model_config = factory.build(&blueprint, feat_dim, num_targets, &params.model);
        tracing::info!(
            "Model '{}': feat_dim={feat_dim}, num_targets={num_targets}, receptive field {} frames",
            factory.name(),
            model_config.receptive_field()
        );

        // Step 4
        let optimizer = OptimizerSpec::from_params(&params.optimizer)?;
        let scheduler = LrSchedulerWrapper::from_params(&params.lr_scheduler, params.optimizer.learn_rate)?;

        // Step 5
        model_dir.write_parameter_set(params)?;
        let descriptor = ModelDescriptor {
            blueprint:     blueprint_copy,
            architecture:  factory.name().to_string(),
            feat_dim,
            num_targets,
            nonlinearity:  params.model.nonlinearity,
            aug_dropout:   params.model.aug_dropout,
            training_mode: TrainingMode::from_flag(params.model.training),
            tap_point:     params.model.extracted_embedding,
        };
        model_dir.write_descriptor(&descriptor, TRAINING_DESCRIPTOR)?;

        // Step 6
        let device = DeviceChoice::from_flags(options.use_gpu, &options.gpu_id)?;

        let plan = TrainingPlan {
            model_config,
            optimizer,
            scheduler,
            loader:      params.loader.clone(),
            training:    params.training.clone(),
            model_dir,
            start_epoch: options.train_stage.max(0) as usize,
            device,
            benchmark:   options.benchmark,
        };
        Ok((plan, bunch))
    }
}

// ─── TrainStage ───────────────────────────────────────────────────────────────
pub struct TrainStage {
    use_case: TrainUseCase,
}

impl TrainStage {
    pub fn new(use_case: TrainUseCase) -> Self {
        Self { use_case }
    }
}

impl Stage for TrainStage {
    fn name(&self) -> &'static str { "train" }

    fn phases(&self) -> (Phase, Phase) { (Phase::Train, Phase::Train) }

    fn run(&self, ctx: &RunContext<'_>) -> Result<StageOutcome> {
        let (plan, bunch) = self.use_case.assemble(ctx.params, ctx.options)?;

        if ctx.options.run_lr_finder {
            let report = run_lr_finder(&plan, bunch, ctx.shutdown)?;
            if let Some(lr) = report.suggested_lr {
                println!("Suggested learning rate: {lr:.3e}");
            }
            return Ok(StageOutcome::Halt);
        }

        run_training(&plan, bunch, ctx.shutdown)?;
        Ok(StageOutcome::Continue)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::bunch::tests::write_egs_dir;
    use crate::domain::descriptor::TapPoint;
    use crate::domain::error::LauncherError;
    use crate::infra::model_dir::PARAMS_FILE;
    use std::{fs, path::Path};

    fn params_in(root: &Path) -> ParameterSet {
        let blueprint = root.join("xvector.json");
        fs::write(&blueprint, r#"{ "architecture": "xvector", "channels": 8, "stats_channels": 12, "embedding_dim": 6 }"#).unwrap();
        write_egs_dir(&root.join("egs"), 4, 3, 6);

        let mut params = ParameterSet::default();
        params.paths.model_blueprint = blueprint;
        params.paths.egs_dir         = root.join("egs");
        params.paths.model_dir       = root.join("exp/model");
        params.model.extracted_embedding = TapPoint::Near;
        params
    }

    fn cpu(train_stage: i64) -> LaunchOptions {
        LaunchOptions { train_stage, use_gpu: false, ..Default::default() }
    }

    #[test]
    fn test_assemble_fresh_directory() {
        let dir    = tempfile::tempdir().unwrap();
        let params = params_in(dir.path());

        let (plan, bunch) = TrainUseCase::new(FactoryRegistry::standard())
            .assemble(&params, &cpu(-1))
            .unwrap();

        assert_eq!(plan.start_epoch, 0);
        assert_eq!(plan.device, DeviceChoice::Cpu);
        assert_eq!(plan.model_config.feat_dim, 4);
        assert_eq!(plan.model_config.num_targets, 3);
        assert_eq!(plan.model_config.embedding_dim, 6);
        assert_eq!(bunch.train.sample_count(), 6);

        let model_dir = ModelDir::new(&params.paths.model_dir);
        assert!(model_dir.config_file("xvector.json").is_file());
        assert_eq!(model_dir.read_parameter_set().unwrap(), params);

        let descriptor = model_dir.read_descriptor(TRAINING_DESCRIPTOR).unwrap();
        assert_eq!(descriptor.architecture, "xvector");
        assert_eq!(descriptor.num_targets, 3);
        assert_eq!(descriptor.tap_point, TapPoint::Near);
        assert_eq!(descriptor.training_mode, TrainingMode::Training);
    }

    #[test]
    fn test_resume_keeps_directory_and_sets_start_epoch() {
        let dir    = tempfile::tempdir().unwrap();
        let params = params_in(dir.path());
        let use_case = TrainUseCase::new(FactoryRegistry::standard());

        use_case.assemble(&params, &cpu(-1)).unwrap();
        let (plan, _) = use_case.assemble(&params, &cpu(4)).unwrap();
        assert_eq!(plan.start_epoch, 4);
        assert!(plan.model_dir.config_file(PARAMS_FILE).is_file());
    }

    #[test]
    fn test_resume_without_directory_fails() {
        let dir    = tempfile::tempdir().unwrap();
        let params = params_in(dir.path());

        let err = TrainUseCase::new(FactoryRegistry::standard())
            .assemble(&params, &cpu(2))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<LauncherError>(),
            Some(LauncherError::DirectoryState { train_stage: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_architecture_is_a_config_error() {
        let dir    = tempfile::tempdir().unwrap();
        let params = params_in(dir.path());
        fs::write(&params.paths.model_blueprint, r#"{ "architecture": "resnet" }"#).unwrap();

        let err = TrainUseCase::new(FactoryRegistry::standard())
            .assemble(&params, &cpu(-1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("resnet"));
    }

    #[test]
    fn test_bad_gpu_id_is_rejected() {
        let dir    = tempfile::tempdir().unwrap();
        let params = params_in(dir.path());
        let options = LaunchOptions { gpu_id: "cuda:0".into(), ..Default::default() };

        assert!(TrainUseCase::new(FactoryRegistry::standard()).assemble(&params, &options).is_err());
    }
}
