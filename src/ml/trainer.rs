// ============================================================
// Layer 5 — Training Session
// ============================================================
// Runs a TrainingPlan on the selected backend:
//
//   use_gpu = true  → Autodiff<Wgpu>    (gpu_id → DiscreteGpu(id))
//   use_gpu = false → Autodiff<NdArray>
//
// Full training runs epochs start_epoch+1 ..= epochs. Every
// report interval it evaluates the validation set and appends a
// row to log/train.csv; every epoch ends with a checkpoint
// `<epoch>.<suffix>`. The training loader reads a single
// partition: the batch order follows the seed and only the last
// batch of an epoch can be short (dropped with drop_last). The LR finder shares the same model,
// loader and optimizer setup but replaces the epoch loop with
// a geometric learning-rate sweep.
//
// Key Burn insight:
//   - Training uses B (Autodiff<_>) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - the validation batcher must also use B::InnerBackend
//
// Reference: Burn Book §5 (Training)

use std::sync::Arc;

use anyhow::Result;
use burn::{
    backend::{
        ndarray::NdArrayDevice,
        wgpu::WgpuDevice,
        Autodiff, NdArray, Wgpu,
    },
    data::dataloader::{DataLoader, DataLoaderBuilder},
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::{ChunkBatch, ChunkBatcher},
    bunch::Bunch,
    dataset::ChunkEgsDataset,
};
use crate::domain::error::LauncherError;
use crate::domain::params::{LoaderParams, TrainingParams};
use crate::infra::{
    checkpoint::CheckpointStore,
    metrics::{MetricsLogger, ReportRecord, LR_FINDER_HEADER, TRAIN_HEADER},
    model_dir::ModelDir,
    shutdown::ShutdownSignal,
};
use crate::ml::{
    lr_finder::{run_sweep, LrFinderReport, LrSweep},
    model::{Xvector, XvectorConfig},
    optimizer::{dispatch, OptimizerSpec, WithOptimizer},
    scheduler::{LrSchedulerWrapper, Progress},
};

type GpuBackend = Autodiff<Wgpu>;
type CpuBackend = Autodiff<NdArray>;

// ─── DeviceChoice ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceChoice {
    Gpu(WgpuDevice),
    Cpu,
}

impl DeviceChoice {
    /// `gpu_id` empty → default adapter; otherwise a discrete GPU index.
    pub fn from_flags(use_gpu: bool, gpu_id: &str) -> Result<Self, LauncherError> {
        if !use_gpu {
            return Ok(DeviceChoice::Cpu);
        }
        let id = gpu_id.trim();
        if id.is_empty() {
            return Ok(DeviceChoice::Gpu(WgpuDevice::default()));
        }
        id.parse::<usize>()
            .map(|n| DeviceChoice::Gpu(WgpuDevice::DiscreteGpu(n)))
            .map_err(|_| LauncherError::config(format!("gpu-id '{gpu_id}' is not a device index")))
    }
}

// ─── TrainingPlan ─────────────────────────────────────────────────────────────
/// Everything one training invocation needs, assembled up front.
pub struct TrainingPlan {
    pub model_config: XvectorConfig,
    pub optimizer:    OptimizerSpec,
    pub scheduler:    LrSchedulerWrapper,
    pub loader:       LoaderParams,
    pub training:     TrainingParams,
    pub model_dir:    ModelDir,
    /// Last completed epoch; 0 starts from scratch (or exist_model).
    pub start_epoch:  usize,
    pub device:       DeviceChoice,
    pub benchmark:    bool,
}

impl TrainingPlan {
    fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.model_dir.root(), self.training.suffix.as_str())
    }
}

pub fn run_training(plan: &TrainingPlan, bunch: Bunch, shutdown: &ShutdownSignal) -> Result<()> {
    log_plan(plan);
    match &plan.device {
        DeviceChoice::Gpu(device) => train::<GpuBackend>(plan, bunch, device.clone(), shutdown),
        DeviceChoice::Cpu         => train::<CpuBackend>(plan, bunch, NdArrayDevice::Cpu, shutdown),
    }
}

pub fn run_lr_finder(plan: &TrainingPlan, bunch: Bunch, shutdown: &ShutdownSignal) -> Result<LrFinderReport> {
    log_plan(plan);
    match &plan.device {
        DeviceChoice::Gpu(device) => find_lr::<GpuBackend>(plan, bunch, device.clone(), shutdown),
        DeviceChoice::Cpu         => find_lr::<CpuBackend>(plan, bunch, NdArrayDevice::Cpu, shutdown),
    }
}

fn log_plan(plan: &TrainingPlan) {
    tracing::info!(
        "Device: {:?} | optimizer: {} | lr schedule: {} | benchmark: {}",
        plan.device,
        plan.optimizer.name(),
        plan.scheduler.schedule().name(),
        plan.benchmark,
    );
}

// ─── Setup shared by both modes ───────────────────────────────────────────────
fn init_model<B: AutodiffBackend>(plan: &TrainingPlan, device: &B::Device) -> Result<Xvector<B>> {
    B::seed(plan.training.seed);
    let model: Xvector<B> = plan.model_config.init(device);
    if !model.has_classifier() {
        return Err(LauncherError::config("model.training must be true to train a model").into());
    }

    let store = plan.checkpoints();
    if plan.start_epoch > 0 {
        let path = store.path_for(&plan.start_epoch.to_string());
        return CheckpointStore::load(model, &path, device);
    }
    if let Some(source) = &plan.training.exist_model {
        tracing::info!("Initialising from transfer-learning source '{}'", source.display());
        return CheckpointStore::load(model, source, device);
    }
    Ok(model)
}

fn train_loader<B: Backend>(
    loader:  &LoaderParams,
    seed:    u64,
    device:  &B::Device,
    dataset: ChunkEgsDataset,
) -> Arc<dyn DataLoader<ChunkBatch<B>>> {
    let mut builder = DataLoaderBuilder::new(ChunkBatcher::<B>::new(device.clone()))
        .batch_size(loader.batch_size);
    if loader.shuffle {
        builder = builder.shuffle(seed);
    }
    builder.build(dataset)
}

fn valid_loader<B: Backend>(
    loader:  &LoaderParams,
    device:  &B::Device,
    dataset: ChunkEgsDataset,
) -> Arc<dyn DataLoader<ChunkBatch<B>>> {
    DataLoaderBuilder::new(ChunkBatcher::<B>::new(device.clone()))
        .batch_size(loader.batch_size)
        .num_workers(loader.num_workers.max(1))
        .build(dataset)
}

/// Training iterations per epoch.
fn epoch_iters(samples: usize, loader: &LoaderParams) -> Result<usize, LauncherError> {
    let iters = if loader.drop_last {
        samples / loader.batch_size
    } else {
        samples.div_ceil(loader.batch_size)
    };
    if iters == 0 {
        return Err(LauncherError::config(format!(
            "{samples} training egs do not fill one batch of {} (drop_last is set)",
            loader.batch_size
        )));
    }
    Ok(iters)
}

fn report_interval(training: &TrainingParams, iters_per_epoch: usize) -> usize {
    match training.report_times_every_epoch {
        Some(times) if times > 0 => (iters_per_epoch / times).max(1),
        _ => training.report_interval_iters.max(1),
    }
}

// ─── Full training ────────────────────────────────────────────────────────────
fn train<B: AutodiffBackend>(
    plan:     &TrainingPlan,
    bunch:    Bunch,
    device:   B::Device,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    if plan.start_epoch >= plan.training.epochs {
        tracing::warn!(
            "train-stage {} already reaches epochs={}; nothing to train",
            plan.start_epoch, plan.training.epochs
        );
        return Ok(());
    }
    let model = init_model::<B>(plan, &device)?;
    dispatch::<B, Xvector<B>, _>(&plan.optimizer, EpochLoop { plan, bunch, device, shutdown, model })
}

struct EpochLoop<'a, B: AutodiffBackend> {
    plan:     &'a TrainingPlan,
    bunch:    Bunch,
    device:   B::Device,
    shutdown: &'a ShutdownSignal,
    model:    Xvector<B>,
}

impl<B: AutodiffBackend> WithOptimizer<B, Xvector<B>> for EpochLoop<'_, B> {
    type Output = Result<()>;

    fn run<O: Optimizer<Xvector<B>, B>>(self, mut optim: O) -> Result<()> {
        let EpochLoop { plan, bunch, device, shutdown, mut model } = self;
        let training = &plan.training;

        // ── Data loaders ──────────────────────────────────────────────────────
        let train_len       = bunch.train.len();
        let iters_per_epoch = epoch_iters(train_len, &plan.loader)?;
        let interval        = report_interval(training, iters_per_epoch);
        let train_failure   = bunch.train.failure();
        let train_loader    = train_loader::<B>(&plan.loader, training.seed, &device, bunch.train);
        let valid           = bunch.valid.map(|ds| {
            let failure = ds.failure();
            (valid_loader::<B::InnerBackend>(&plan.loader, &device, ds), failure)
        });

        // ── Record file ───────────────────────────────────────────────────────
        let record_path = plan.model_dir.log_dir().join(&training.record_file);
        let logger = if plan.start_epoch == 0 {
            MetricsLogger::create(record_path, TRAIN_HEADER)?
        } else {
            MetricsLogger::append(record_path, TRAIN_HEADER)?
        };
        let store = plan.checkpoints();

        tracing::info!(
            "Training epochs {}..={} | {} egs, {} iters/epoch, report every {} iters",
            plan.start_epoch + 1, training.epochs, train_len, iters_per_epoch, interval,
        );

        // ── Epoch loop ────────────────────────────────────────────────────────
        for epoch in plan.start_epoch..training.epochs {
            let mut loss_sum = 0.0f64;
            let mut correct  = 0usize;
            let mut seen     = 0usize;
            let mut batches  = 0usize;
            let mut lr       = 0.0f64;
            let mut batches_run = 0usize;

            for (i, batch) in train_loader.iter().take(iters_per_epoch).enumerate() {
                shutdown.check()?;

                lr = plan.scheduler.lr(Progress { epoch, iter: i, iters_per_epoch });
                let batch_size = batch.labels.dims()[0];
                let (loss, hits) = model.forward_classification(batch.features, batch.labels);

                loss_sum += loss.clone().into_scalar().elem::<f64>();
                correct  += hits;
                seen     += batch_size;
                batches  += 1;

                // Backward pass + optimizer update at the scheduled rate
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(lr, model, grads);

                let iter = i + 1;
                batches_run = iter;
                if iter % interval == 0 || iter == iters_per_epoch {
                    let (valid_loss, valid_acc) = match &valid {
                        Some((loader, failure)) => {
                            let metrics = evaluate(&model.valid(), loader.as_ref());
                            failure.check()?;
                            metrics
                        }
                        None => (f64::NAN, f64::NAN),
                    };
                    let record = ReportRecord {
                        epoch:      epoch + 1,
                        iter,
                        lr,
                        train_loss: loss_sum / batches as f64,
                        train_acc:  correct as f64 / seen.max(1) as f64,
                        valid_loss,
                        valid_acc,
                    };
                    logger.log_report(&record)?;
                    tracing::info!(
                        "Epoch {:>3}/{} iter {:>5}/{} | lr={:.3e} | train_loss={:.4} | train_acc={:.1}% | valid_loss={:.4} | valid_acc={:.1}%",
                        record.epoch, training.epochs, iter, iters_per_epoch, lr,
                        record.train_loss, record.train_acc * 100.0,
                        valid_loss, valid_acc * 100.0,
                    );
                    loss_sum = 0.0;
                    correct  = 0;
                    seen     = 0;
                    batches  = 0;
                }
            }

            train_failure.check()?;
            if batches_run < iters_per_epoch {
                return Err(LauncherError::config(format!(
                    "epoch {} ended after {batches_run} of {iters_per_epoch} batches",
                    epoch + 1
                ))
                .into());
            }

            let path = store.save(&model, &(epoch + 1).to_string())?;
            tracing::info!("Checkpoint for epoch {} saved to '{}' (lr={lr:.3e})", epoch + 1, path.display());
        }

        tracing::info!("Training complete!");
        Ok(())
    }
}

/// Mean loss and accuracy over the whole validation set. Batch
/// losses are weighted by batch size: the worker partitions make
/// several short batches.
fn evaluate<B: Backend>(model: &Xvector<B>, loader: &dyn DataLoader<ChunkBatch<B>>) -> (f64, f64) {
    let mut loss_sum = 0.0f64;
    let mut correct  = 0usize;
    let mut total    = 0usize;

    for batch in loader.iter() {
        let n = batch.labels.dims()[0];
        let (loss, hits) = model.forward_classification(batch.features, batch.labels);
        loss_sum += loss.into_scalar().elem::<f64>() * n as f64;
        correct  += hits;
        total    += n;
    }

    if total == 0 {
        return (f64::NAN, f64::NAN);
    }
    (loss_sum / total as f64, correct as f64 / total as f64)
}

// ─── LR finder ────────────────────────────────────────────────────────────────
fn find_lr<B: AutodiffBackend>(
    plan:     &TrainingPlan,
    bunch:    Bunch,
    device:   B::Device,
    shutdown: &ShutdownSignal,
) -> Result<LrFinderReport> {
    let model = init_model::<B>(plan, &device)?;
    dispatch::<B, Xvector<B>, _>(&plan.optimizer, SweepLoop { plan, bunch, device, shutdown, model })
}

struct SweepLoop<'a, B: AutodiffBackend> {
    plan:     &'a TrainingPlan,
    bunch:    Bunch,
    device:   B::Device,
    shutdown: &'a ShutdownSignal,
    model:    Xvector<B>,
}

impl<B: AutodiffBackend> WithOptimizer<B, Xvector<B>> for SweepLoop<'_, B> {
    type Output = Result<LrFinderReport>;

    fn run<O: Optimizer<Xvector<B>, B>>(self, mut optim: O) -> Result<LrFinderReport> {
        let SweepLoop { plan, bunch, device, shutdown, mut model } = self;
        let finder = &plan.training.lr_finder;

        let logger  = MetricsLogger::create(plan.model_dir.log_dir().join(&finder.record_file), LR_FINDER_HEADER)?;
        let iters   = epoch_iters(bunch.train.len(), &plan.loader)?;
        let failure = bunch.train.failure();
        let loader  = train_loader::<B>(&plan.loader, plan.training.seed, &device, bunch.train);
        let mut batches = loader.iter().take(iters);

        tracing::info!(
            "LR finder: {:.1e} → {:.1e} over {} iters, writing '{}'",
            finder.init_lr, finder.final_lr, finder.num_iters, logger.csv_path().display(),
        );

        run_sweep(&LrSweep::from_params(finder), &logger, |lr| {
            shutdown.check()?;
            // Restart the loader when the sweep outlasts one epoch.
            let batch = match batches.next() {
                Some(batch) => batch,
                None => {
                    failure.check()?;
                    batches = loader.iter().take(iters);
                    batches
                        .next()
                        .ok_or_else(|| LauncherError::config("training egs produced no batches"))?
                }
            };
            let (loss, _) = model.forward_classification(batch.features, batch.labels);
            let value = loss.clone().into_scalar().elem::<f64>();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model.clone(), grads);
            Ok(value)
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::bunch::tests::write_egs_dir;
    use crate::domain::params::{EgsParams, LrFinderParams, LrSchedulerParams, OptimizerParams};
    use crate::ml::model::tests::tiny_config;
    use std::fs;

    fn plan(model_dir: &std::path::Path, start_epoch: usize, epochs: usize) -> TrainingPlan {
        let model_dir = ModelDir::new(model_dir);
        fs::create_dir_all(model_dir.log_dir()).unwrap();
        TrainingPlan {
            model_config: tiny_config(true),
            optimizer:    OptimizerSpec::from_params(&OptimizerParams::default()).unwrap(),
            scheduler:    LrSchedulerWrapper::from_params(&LrSchedulerParams::default(), 0.01).unwrap(),
            loader:       LoaderParams { batch_size: 3, shuffle: true, num_workers: 1, drop_last: true },
            training:     TrainingParams {
                epochs,
                report_interval_iters: 1,
                lr_finder: LrFinderParams { num_iters: 5, ..Default::default() },
                ..Default::default()
            },
            model_dir,
            start_epoch,
            device:       DeviceChoice::Cpu,
            benchmark:    false,
        }
    }

    fn bunch(dir: &std::path::Path) -> Bunch {
        write_egs_dir(dir, 4, 3, 6);
        Bunch::from_egs_dir(dir, &EgsParams::default()).unwrap()
    }

    #[test]
    fn test_device_choice() {
        assert_eq!(DeviceChoice::from_flags(false, "3").unwrap(), DeviceChoice::Cpu);
        assert_eq!(DeviceChoice::from_flags(true, "").unwrap(), DeviceChoice::Gpu(WgpuDevice::default()));
        assert_eq!(DeviceChoice::from_flags(true, "1").unwrap(), DeviceChoice::Gpu(WgpuDevice::DiscreteGpu(1)));
        assert!(DeviceChoice::from_flags(true, "cuda:0").is_err());
    }

    #[test]
    fn test_report_interval() {
        let mut t = TrainingParams { report_interval_iters: 100, ..Default::default() };
        assert_eq!(report_interval(&t, 1000), 100);
        t.report_times_every_epoch = Some(4);
        assert_eq!(report_interval(&t, 1000), 250);
        assert_eq!(report_interval(&t, 2), 1);
    }

    #[test]
    fn test_epoch_iters() {
        let mut loader = LoaderParams { batch_size: 3, ..Default::default() };
        assert_eq!(epoch_iters(7, &loader).unwrap(), 2);
        assert_eq!(epoch_iters(6, &loader).unwrap(), 2);
        assert!(epoch_iters(2, &loader).is_err());

        loader.drop_last = false;
        assert_eq!(epoch_iters(7, &loader).unwrap(), 3);
        assert_eq!(epoch_iters(2, &loader).unwrap(), 1);
    }

    #[test]
    fn test_epoch_length_follows_drop_last() {
        for (drop_last, reports) in [(true, 2), (false, 3)] {
            let egs = tempfile::tempdir().unwrap();
            let exp = tempfile::tempdir().unwrap();
            write_egs_dir(egs.path(), 4, 3, 7);
            let bunch = Bunch::from_egs_dir(egs.path(), &EgsParams::default()).unwrap();

            let mut p = plan(exp.path(), 0, 1);
            p.loader.drop_last = drop_last;
            run_training(&p, bunch, &ShutdownSignal::new()).unwrap();

            // one report per iteration, the last one closing the epoch
            let csv  = fs::read_to_string(exp.path().join("log/train.csv")).unwrap();
            let rows: Vec<&str> = csv.lines().skip(1).collect();
            assert_eq!(rows.len(), reports);
            assert!(rows[reports - 1].starts_with(&format!("1,{reports},")));
        }
    }

    #[test]
    fn test_archive_broken_after_indexing_fails_the_epoch() {
        let egs = tempfile::tempdir().unwrap();
        let exp = tempfile::tempdir().unwrap();
        let bunch = bunch(egs.path());
        fs::write(egs.path().join("feats.ark"), b"gone").unwrap();

        let err = run_training(&plan(exp.path(), 0, 1), bunch, &ShutdownSignal::new()).unwrap_err();
        assert!(format!("{err:#}").contains("cannot load eg"));
        assert!(!exp.path().join("1.params").exists());
    }

    #[test]
    fn test_training_writes_checkpoints_and_records() {
        let egs = tempfile::tempdir().unwrap();
        let exp = tempfile::tempdir().unwrap();

        run_training(&plan(exp.path(), 0, 2), bunch(egs.path()), &ShutdownSignal::new()).unwrap();
        assert!(exp.path().join("1.params").is_file());
        assert!(exp.path().join("2.params").is_file());

        // 6 egs / batch 3 = 2 iters per epoch, one report per iter
        let csv = fs::read_to_string(exp.path().join("log/train.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + 4);

        // Resume from epoch 2 appends to the same record file
        run_training(&plan(exp.path(), 2, 3), bunch(egs.path()), &ShutdownSignal::new()).unwrap();
        assert!(exp.path().join("3.params").is_file());
        let csv = fs::read_to_string(exp.path().join("log/train.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + 6);
    }

    #[test]
    fn test_resume_without_checkpoint_fails() {
        let egs = tempfile::tempdir().unwrap();
        let exp = tempfile::tempdir().unwrap();
        let err = run_training(&plan(exp.path(), 4, 6), bunch(egs.path()), &ShutdownSignal::new()).unwrap_err();
        assert!(err.to_string().contains("4.params"));
    }

    #[test]
    fn test_interrupt_stops_training() {
        let egs = tempfile::tempdir().unwrap();
        let exp = tempfile::tempdir().unwrap();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let err = run_training(&plan(exp.path(), 0, 2), bunch(egs.path()), &shutdown).unwrap_err();
        assert!(LauncherError::is_interrupt(&err));
        assert!(!exp.path().join("1.params").exists());
    }

    #[test]
    fn test_lr_finder_writes_sweep() {
        let egs = tempfile::tempdir().unwrap();
        let exp = tempfile::tempdir().unwrap();

        let report = run_lr_finder(&plan(exp.path(), 0, 2), bunch(egs.path()), &ShutdownSignal::new()).unwrap();
        assert!(!report.points.is_empty() && report.points.len() <= 5);

        let csv = fs::read_to_string(exp.path().join("log/lr_finder.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + report.points.len());
        assert!(!exp.path().join("1.params").exists());
    }
}
