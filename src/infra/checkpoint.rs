// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// Saves and restores model weights as `<epoch>.<suffix>` files
// directly under the model directory, e.g.
//
//   exp/xv/
//     1.params
//     2.params
//     ...
//     18.params
//
// The extraction scheduler treats "file exists" as "checkpoint
// ready", possibly from another process. Weights are therefore
// serialised to bytes with burn's BinBytesRecorder, written to
// a hidden temporary file and renamed into place.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
};

use crate::domain::job::Checkpoint;

type CheckpointRecorder = BinBytesRecorder<FullPrecisionSettings>;

pub struct CheckpointStore {
    dir:    PathBuf,
    suffix: String,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self { dir: dir.into(), suffix: suffix.into() }
    }

    /// `<dir>/<epoch_label>.<suffix>`
    pub fn path_for(&self, epoch_label: &str) -> PathBuf {
        Checkpoint::new(epoch_label, self.suffix.as_str()).path_in(&self.dir)
    }

    /// Save `model` under `epoch_label`, replacing any older file.
    pub fn save<B: Backend, M: Module<B>>(&self, model: &M, epoch_label: &str) -> Result<PathBuf> {
        let path  = self.path_for(epoch_label);
        let bytes = CheckpointRecorder::default()
            .record(model.clone().into_record(), ())
            .map_err(|e| anyhow::anyhow!("Cannot serialise checkpoint '{}': {e:?}", path.display()))?;

        let staged = self.dir.join(format!(".{epoch_label}.{}.partial", self.suffix));
        fs::write(&staged, bytes)
            .with_context(|| format!("Cannot write '{}'", staged.display()))?;
        fs::rename(&staged, &path)
            .with_context(|| format!("Cannot move checkpoint into '{}'", path.display()))?;

        tracing::debug!("Saved checkpoint '{}'", path.display());
        Ok(path)
    }

    /// Load weights from `path` into `model`.
    pub fn load<B: Backend, M: Module<B>>(model: M, path: &Path, device: &B::Device) -> Result<M> {
        let bytes = fs::read(path).with_context(|| {
            format!("Cannot read checkpoint '{}'. Has training reached this epoch?", path.display())
        })?;
        let record = CheckpointRecorder::default()
            .load(bytes, device)
            .map_err(|e| anyhow::anyhow!("Cannot decode checkpoint '{}': {e:?}", path.display()))?;
        tracing::info!("Loaded weights from '{}'", path.display());
        Ok(model.load_record(record))
    }
}
