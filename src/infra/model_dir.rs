// ============================================================
// Layer 6 — Model Directory (config persistence)
// ============================================================
// Owns the on-disk layout of one experiment:
//
//   model_dir/
//     config/
//       xvector.json           ← copy of the blueprint
//       nnet.config            ← training-time descriptor
//       far.extract.config     ← inference descriptor per tap point
//       params.json            ← full ParameterSet snapshot
//     log/
//       train.csv, lr_finder.csv
//     6.params, 12.params ...  ← checkpoints (written by the trainer)
//
// Everything under config/ is written only through this type.
// Every write replaces the whole file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::domain::descriptor::{ModelDescriptor, TapPoint};
use crate::domain::error::LauncherError;
use crate::domain::job::Checkpoint;
use crate::domain::params::ParameterSet;

pub const TRAINING_DESCRIPTOR: &str = "nnet.config";
pub const PARAMS_FILE:         &str = "params.json";

/// Name of the inference descriptor for a tap point.
pub fn extract_config_name(tap_point: TapPoint) -> String {
    format!("{tap_point}.extract.config")
}

#[derive(Debug, Clone)]
pub struct ModelDir {
    root: PathBuf,
}

impl ModelDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir().join(name)
    }

    pub fn checkpoint_path(&self, checkpoint: &Checkpoint) -> PathBuf {
        checkpoint.path_in(&self.root)
    }

    /// Prepare the directory for a run starting at `train_stage` and
    /// return the path of the blueprint copy inside `config/`.
    ///
    ///   -1  → create config/ and log/, copy the blueprint in
    ///   ≥0  → reuse; the directory and the copy must already exist
    pub fn bootstrap(&self, blueprint: &Path, train_stage: i64) -> Result<PathBuf> {
        let file_name = blueprint.file_name().ok_or_else(|| {
            LauncherError::config(format!("blueprint path '{}' has no file name", blueprint.display()))
        })?;
        let copy = self.config_dir().join(file_name);

        if train_stage < 0 {
            fs::create_dir_all(self.config_dir())
                .with_context(|| format!("Cannot create '{}'", self.config_dir().display()))?;
            fs::create_dir_all(self.log_dir())
                .with_context(|| format!("Cannot create '{}'", self.log_dir().display()))?;

            if blueprint != copy {
                if !blueprint.is_file() {
                    return Err(LauncherError::config(format!(
                        "blueprint '{}' does not exist",
                        blueprint.display()
                    ))
                    .into());
                }
                fs::copy(blueprint, &copy).with_context(|| {
                    format!("Cannot copy blueprint '{}' to '{}'", blueprint.display(), copy.display())
                })?;
            }
            tracing::info!("Created model directory '{}'", self.root.display());
            return Ok(copy);
        }

        let state_error = |reason: String| LauncherError::DirectoryState {
            dir: self.root.clone(),
            train_stage,
            reason,
        };
        if !self.root.is_dir() {
            return Err(state_error("directory does not exist (run with train-stage -1 first)".into()).into());
        }
        if !copy.is_file() {
            return Err(state_error(format!("blueprint copy '{}' is missing", copy.display())).into());
        }
        fs::create_dir_all(self.log_dir())
            .with_context(|| format!("Cannot create '{}'", self.log_dir().display()))?;

        tracing::info!("Reusing model directory '{}'", self.root.display());
        Ok(copy)
    }

    /// Overwrite config/params.json with the full set.
    pub fn write_parameter_set(&self, params: &ParameterSet) -> Result<PathBuf> {
        let path = self.config_file(PARAMS_FILE);
        fs::write(&path, params.to_json()?)
            .with_context(|| format!("Cannot write parameters to '{}'", path.display()))?;
        tracing::debug!("Saved parameter set to '{}'", path.display());
        Ok(path)
    }

    pub fn read_parameter_set(&self) -> Result<ParameterSet> {
        ParameterSet::from_json_file(&self.config_file(PARAMS_FILE))
    }

    pub fn write_descriptor(&self, descriptor: &ModelDescriptor, name: &str) -> Result<PathBuf> {
        let path = self.config_file(name);
        fs::write(&path, descriptor.render())
            .with_context(|| format!("Cannot write descriptor to '{}'", path.display()))?;
        tracing::debug!("Saved model descriptor '{}'", path.display());
        Ok(path)
    }

    pub fn read_descriptor(&self, name: &str) -> Result<ModelDescriptor> {
        let path = self.config_file(name);
        let text = fs::read_to_string(&path).map_err(|e| {
            LauncherError::config(format!("cannot read descriptor '{}': {e}", path.display()))
        })?;
        let descriptor = ModelDescriptor::parse(&text)
            .with_context(|| format!("Malformed descriptor '{}'", path.display()))?;
        Ok(descriptor)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::{Nonlinearity, TrainingMode};

    fn blueprint_in(dir: &Path) -> PathBuf {
        let path = dir.join("xvector.json");
        fs::write(&path, r#"{ "architecture": "xvector" }"#).unwrap();
        path
    }

    #[test]
    fn test_fresh_bootstrap_creates_layout() {
        let tmp       = tempfile::tempdir().unwrap();
        let blueprint = blueprint_in(tmp.path());
        let model_dir = ModelDir::new(tmp.path().join("exp/xv"));

        let copy = model_dir.bootstrap(&blueprint, -1).unwrap();
        assert_eq!(copy, tmp.path().join("exp/xv/config/xvector.json"));
        assert!(copy.is_file());
        assert!(model_dir.log_dir().is_dir());
    }

    #[test]
    fn test_resume_on_empty_dir_is_directory_state_error() {
        let tmp       = tempfile::tempdir().unwrap();
        let blueprint = blueprint_in(tmp.path());
        let model_dir = ModelDir::new(tmp.path().join("exp/empty"));

        let err = model_dir.bootstrap(&blueprint, 5).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LauncherError>(),
            Some(LauncherError::DirectoryState { train_stage: 5, .. })
        ));
    }

    #[test]
    fn test_resume_after_fresh_returns_same_copy() {
        let tmp       = tempfile::tempdir().unwrap();
        let blueprint = blueprint_in(tmp.path());
        let model_dir = ModelDir::new(tmp.path().join("exp/xv"));

        let fresh   = model_dir.bootstrap(&blueprint, -1).unwrap();
        let resumed = model_dir.bootstrap(&blueprint, 3).unwrap();
        let init    = model_dir.bootstrap(&blueprint, 0).unwrap();
        assert_eq!(fresh, resumed);
        assert_eq!(fresh, init);
    }

    #[test]
    fn test_resume_without_blueprint_copy_fails() {
        let tmp       = tempfile::tempdir().unwrap();
        let blueprint = blueprint_in(tmp.path());
        let model_dir = ModelDir::new(tmp.path().join("exp/xv"));
        fs::create_dir_all(model_dir.root()).unwrap();

        let err = model_dir.bootstrap(&blueprint, 0).unwrap_err();
        assert!(err.to_string().contains("blueprint copy"));
    }

    #[test]
    fn test_fresh_bootstrap_with_missing_blueprint_is_config_error() {
        let tmp       = tempfile::tempdir().unwrap();
        let model_dir = ModelDir::new(tmp.path().join("exp/xv"));
        let err = model_dir.bootstrap(&tmp.path().join("nope.json"), -1).unwrap_err();
        assert!(matches!(err.downcast_ref::<LauncherError>(), Some(LauncherError::Config(_))));
    }

    #[test]
    fn test_parameter_set_rewrite_is_byte_identical() {
        let tmp       = tempfile::tempdir().unwrap();
        let blueprint = blueprint_in(tmp.path());
        let model_dir = ModelDir::new(tmp.path().join("exp/xv"));
        model_dir.bootstrap(&blueprint, -1).unwrap();

        let params = ParameterSet::default();
        let path   = model_dir.write_parameter_set(&params).unwrap();
        let first  = fs::read(&path).unwrap();
        model_dir.write_parameter_set(&params).unwrap();
        let second = fs::read(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(model_dir.read_parameter_set().unwrap(), params);
    }

    #[test]
    fn test_descriptor_round_trip_on_disk() {
        let tmp       = tempfile::tempdir().unwrap();
        let blueprint = blueprint_in(tmp.path());
        let model_dir = ModelDir::new(tmp.path().join("exp/xv"));
        let copy      = model_dir.bootstrap(&blueprint, -1).unwrap();

        let descriptor = ModelDescriptor {
            blueprint:     copy,
            architecture:  "xvector".into(),
            feat_dim:      30,
            num_targets:   7,
            nonlinearity:  Nonlinearity::LeakyRelu,
            aug_dropout:   0.0,
            training_mode: TrainingMode::Training,
            tap_point:     TapPoint::Near,
        };
        model_dir.write_descriptor(&descriptor, TRAINING_DESCRIPTOR).unwrap();
        assert_eq!(model_dir.read_descriptor(TRAINING_DESCRIPTOR).unwrap(), descriptor);
    }

    #[test]
    fn test_missing_descriptor_is_config_error() {
        let tmp       = tempfile::tempdir().unwrap();
        let model_dir = ModelDir::new(tmp.path());
        let err = model_dir.read_descriptor(TRAINING_DESCRIPTOR).unwrap_err();
        assert!(matches!(err.downcast_ref::<LauncherError>(), Some(LauncherError::Config(_))));
    }

    #[test]
    fn test_extract_config_name() {
        assert_eq!(extract_config_name(TapPoint::Far), "far.extract.config");
    }
}
