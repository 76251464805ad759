// ============================================================
// Layer 3 — Parameter Set
// ============================================================
// Every tunable of a launcher run, grouped the way the run
// consumes them:
//
//   paths         — data / egs / blueprint / model directory
//   preprocess    — options forwarded to the preprocess script
//   egs           — augmentation applied while batching egs
//   loader        — batching and shuffling
//   model         — forwarded to the model factory
//   optimizer     — optimizer choice and hyperparameters
//   lr_scheduler  — learning-rate schedule
//   training      — epochs, reporting, checkpoint suffix, LR finder
//   extraction    — the (tap-point × epoch × dataset) matrix
//
// A ParameterSet is built once per run (defaults, optionally
// overridden by a JSON file), then only borrowed. It is
// persisted verbatim to model_dir/config/params.json.
//
// Field order in these structs IS the on-disk key order, so
// the persisted file is byte-stable across rewrites.

use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::descriptor::{Nonlinearity, TapPoint};
use crate::domain::error::LauncherError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
    pub paths:        PathParams,
    pub preprocess:   PreprocessParams,
    pub egs:          EgsParams,
    pub loader:       LoaderParams,
    pub model:        ModelParams,
    pub optimizer:    OptimizerParams,
    pub lr_scheduler: LrSchedulerParams,
    pub training:     TrainingParams,
    pub extraction:   ExtractionParams,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            paths:        PathParams::default(),
            preprocess:   PreprocessParams::default(),
            egs:          EgsParams::default(),
            loader:       LoaderParams::default(),
            model:        ModelParams::default(),
            optimizer:    OptimizerParams::default(),
            lr_scheduler: LrSchedulerParams::default(),
            training:     TrainingParams::default(),
            extraction:   ExtractionParams::default(),
        }
    }
}

impl ParameterSet {
    /// Load a (possibly partial) parameter file. Missing groups and
    /// missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read parameter file '{}'", path.display()))?;
        let params: Self = serde_json::from_str(&json)
            .map_err(LauncherError::from)
            .with_context(|| format!("Malformed parameter file '{}'", path.display()))?;
        params.validate()?;
        Ok(params)
    }

    /// Canonical serialised form, used for persistence.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self).map_err(LauncherError::from)?;
        json.push('\n');
        Ok(json)
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(LauncherError::Config(msg).into()) };

        if self.loader.batch_size == 0 {
            return fail("loader.batch_size must be at least 1".into());
        }
        if self.training.epochs == 0 {
            return fail("training.epochs must be at least 1".into());
        }
        if self.training.report_interval_iters == 0 {
            return fail("training.report_interval_iters must be at least 1".into());
        }
        if self.training.suffix.is_empty() || self.training.suffix.contains('/') {
            return fail(format!("training.suffix '{}' is not a file suffix", self.training.suffix));
        }
        let finder = &self.training.lr_finder;
        if finder.num_iters < 2 || !(finder.init_lr > 0.0 && finder.init_lr < finder.final_lr) {
            return fail("training.lr_finder needs num_iters >= 2 and 0 < init_lr < final_lr".into());
        }
        if !(0.0..1.0).contains(&finder.beta) {
            return fail(format!("training.lr_finder.beta {} must lie in [0, 1)", finder.beta));
        }
        if !(0.0..1.0).contains(&self.model.aug_dropout) {
            return fail(format!("model.aug_dropout {} must lie in [0, 1)", self.model.aug_dropout));
        }
        if self.extraction.poll_interval_ms == 0 {
            return fail("extraction.poll_interval_ms must be at least 1".into());
        }
        Ok(())
    }
}

// ─── paths ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathParams {
    pub traindata:       PathBuf,
    pub egs_dir:         PathBuf,
    pub model_blueprint: PathBuf,
    pub model_dir:       PathBuf,
}

impl Default for PathParams {
    fn default() -> Self {
        Self {
            traindata:       PathBuf::from("data/mfcc_23_pitch/voxceleb1_train_aug"),
            egs_dir:         PathBuf::from("exp/egs/mfcc_23_pitch_voxceleb1_train_aug_speaker_balance_max"),
            model_blueprint: PathBuf::from("blueprints/xvector.json"),
            model_dir:       PathBuf::from("exp/standard_xv_baseline_warmR_voxceleb1"),
        }
    }
}

// ─── preprocess ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    Sequential,
    SpeakerBalance,
}

impl SampleType {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleType::Sequential     => "sequential",
            SampleType::SpeakerBalance => "speaker_balance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    pub shell:             String,
    pub script:            PathBuf,
    pub nj:                usize,
    pub compress:          bool,
    pub cmn:               bool,
    pub chunk_size:        usize,
    pub limit_utts:        usize,
    pub sample_type:       SampleType,
    /// -1 scales by `scale`, 0 takes the max, >0 is used as is.
    pub chunk_num:         i64,
    pub overlap:           f64,
    pub scale:             f64,
    pub valid_split_type:  String,
    pub valid_utts:        usize,
    pub valid_chunk_num:   usize,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            shell:            "sh".to_string(),
            script:           PathBuf::from("subtools/pytorch/pipeline/preprocess_to_egs.sh"),
            nj:               20,
            compress:         false,
            cmn:              true,
            chunk_size:       200,
            limit_utts:       8,
            sample_type:      SampleType::SpeakerBalance,
            chunk_num:        0,
            overlap:          0.1,
            scale:            1.5,
            valid_split_type: "--total-spk".to_string(),
            valid_utts:       1024,
            valid_chunk_num:  2,
        }
    }
}

// ─── egs ──────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Augmentation {
    SpecAugment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugParams {
    /// Max fraction of feature bins masked.
    pub frequency: f64,
    /// Max fraction of frames masked.
    pub frame:     f64,
}

impl Default for AugParams {
    fn default() -> Self {
        Self { frequency: 0.2, frame: 0.2 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EgsParams {
    pub aug:        Option<Augmentation>,
    pub aug_params: AugParams,
}

// ─── loader ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderParams {
    pub batch_size:  usize,
    pub shuffle:     bool,
    /// Parallel readers for the validation set. Training reads
    /// one partition so its batch order follows the seed.
    pub num_workers: usize,
    /// Skip the short last batch of every training epoch.
    pub drop_last:   bool,
}

impl Default for LoaderParams {
    fn default() -> Self {
        Self { batch_size: 512, shuffle: true, num_workers: 2, drop_last: true }
    }
}

// ─── model ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub nonlinearity:        Nonlinearity,
    /// Dropout on the input features. Keep it small.
    pub aug_dropout:         f64,
    pub training:            bool,
    /// Tap point written into the training descriptor.
    pub extracted_embedding: TapPoint,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            nonlinearity:        Nonlinearity::Relu,
            aug_dropout:         0.2,
            training:            true,
            extracted_embedding: TapPoint::Far,
        }
    }
}

// ─── optimizer ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerParams {
    pub name:         String,
    pub learn_rate:   f64,
    pub beta1:        f64,
    pub beta2:        f64,
    pub momentum:     f64,
    pub nesterov:     bool,
    /// Large for decoupled decay (adamW), small for L2 (sgd, adam).
    pub weight_decay: f64,
    #[serde(rename = "lookahead.k")]
    pub lookahead_k:     usize,
    /// 0 disables lookahead.
    #[serde(rename = "lookahead.alpha")]
    pub lookahead_alpha: f64,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            name:            "adamW".to_string(),
            learn_rate:      0.001,
            beta1:           0.9,
            beta2:           0.999,
            momentum:        0.9,
            nesterov:        false,
            weight_decay:    1e-1,
            lookahead_k:     5,
            lookahead_alpha: 0.0,
        }
    }
}

// ─── lr_scheduler ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LrSchedulerParams {
    pub name: String,
    /// 0 decays once per epoch, 1 every iteration, n every n iterations.
    #[serde(rename = "warmR.lr_decay_step")]
    pub warm_r_lr_decay_step: usize,
    #[serde(rename = "warmR.T_max")]
    pub warm_r_t_max:         usize,
    #[serde(rename = "warmR.T_mult")]
    pub warm_r_t_mult:        usize,
    /// Peak decay applied at every restart.
    #[serde(rename = "warmR.factor")]
    pub warm_r_factor:        f64,
    #[serde(rename = "warmR.eta_min")]
    pub warm_r_eta_min:       f64,
    #[serde(rename = "warmR.log_decay")]
    pub warm_r_log_decay:     bool,
    #[serde(rename = "stepLR.step_size")]
    pub step_lr_step_size:    usize,
    #[serde(rename = "stepLR.gamma")]
    pub step_lr_gamma:        f64,
}

impl Default for LrSchedulerParams {
    fn default() -> Self {
        Self {
            name:                 "warmR".to_string(),
            warm_r_lr_decay_step: 400,
            warm_r_t_max:         6,
            warm_r_t_mult:        1,
            warm_r_factor:        0.7,
            warm_r_eta_min:       4e-8,
            warm_r_log_decay:     false,
            step_lr_step_size:    6,
            step_lr_gamma:        0.5,
        }
    }
}

// ─── training ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LrFinderParams {
    pub init_lr:     f64,
    pub final_lr:    f64,
    pub num_iters:   usize,
    pub beta:        f64,
    pub record_file: String,
}

impl Default for LrFinderParams {
    fn default() -> Self {
        Self {
            init_lr:     1e-8,
            final_lr:    10.0,
            num_iters:   2000,
            beta:        0.98,
            record_file: "lr_finder.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// 18 = 6 -> 12 -> 18 with warmR T_max=6, T_mult=1.
    pub epochs:                   usize,
    /// When set, overrides `report_interval_iters`.
    pub report_times_every_epoch: Option<usize>,
    pub report_interval_iters:    usize,
    /// Checkpoint files are `<epoch>.<suffix>`.
    pub suffix:                   String,
    /// Transfer-learning source used when train-stage is 0.
    pub exist_model:              Option<PathBuf>,
    pub seed:                     u64,
    pub record_file:              String,
    pub lr_finder:                LrFinderParams,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs:                   18,
            report_times_every_epoch: None,
            report_interval_iters:    100,
            suffix:                   "params".to_string(),
            exist_model:              None,
            seed:                     1024,
            record_file:              "train.csv".to_string(),
            lr_finder:                LrFinderParams::default(),
        }
    }
}

// ─── extraction ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionParams {
    pub shell:                  String,
    pub script:                 PathBuf,
    /// Holds every dataset, Kaldi-recipe style.
    pub data_root:              PathBuf,
    pub prefix:                 String,
    pub positions:              Vec<TapPoint>,
    /// Every dataset must live under data_root/prefix.
    pub datasets:               Vec<String>,
    /// Checkpoint labels, e.g. "10" or "final".
    pub epochs:                 Vec<String>,
    pub nj:                     usize,
    pub force:                  bool,
    pub cmn:                    bool,
    pub poll_interval_ms:       u64,
    /// `null` waits forever for a checkpoint.
    pub readiness_timeout_secs: Option<u64>,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            shell:                  "sh".to_string(),
            script:                 PathBuf::from("subtools/pytorch/pipeline/extract_xvectors_for_pytorch.sh"),
            data_root:              PathBuf::from("data"),
            prefix:                 "mfcc_23_pitch".to_string(),
            positions:              vec![TapPoint::Far, TapPoint::Near],
            datasets:               vec!["voxceleb1_train_aug".to_string(), "voxceleb1_test".to_string()],
            epochs:                 vec!["6".to_string(), "12".to_string(), "18".to_string()],
            nj:                     10,
            force:                  false,
            cmn:                    true,
            poll_interval_ms:       10_000,
            readiness_timeout_secs: None,
        }
    }
}
