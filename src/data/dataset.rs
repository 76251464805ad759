use std::sync::{Arc, Mutex};

use burn::data::dataset::Dataset;
use rand::thread_rng;

use crate::data::augment::SpecAugment;
use crate::data::egs::EgsEntry;
use crate::data::kaldi;
use crate::domain::error::LauncherError;

/// One chunk of features with its speaker label.
/// `features` is frames × feat_dim, row-major.
#[derive(Debug, Clone)]
pub struct ChunkSample {
    pub features: Vec<f32>,
    pub frames:   usize,
    pub feat_dim: usize,
    pub label:    usize,
}

/// First load error hit by any loader worker.
///
/// burn's loaders treat a missing item as the end of the
/// dataset, so the error cannot travel through `get`. The
/// trainer keeps a handle and checks it after every pass.
#[derive(Debug, Clone, Default)]
pub struct LoadFailure(Arc<Mutex<Option<String>>>);

impl LoadFailure {
    fn record(&self, message: String) {
        if let Ok(mut slot) = self.0.lock() {
            slot.get_or_insert(message);
        }
    }

    pub fn check(&self) -> Result<(), LauncherError> {
        let slot = self
            .0
            .lock()
            .map_err(|_| LauncherError::config("an egs loader worker panicked"))?;
        match slot.as_ref() {
            Some(message) => Err(LauncherError::config(message.clone())),
            None => Ok(()),
        }
    }
}

/// Chunk egs read lazily from their Kaldi archives.
pub struct ChunkEgsDataset {
    entries: Vec<EgsEntry>,
    augment: Option<SpecAugment>,
    failure: LoadFailure,
}

impl ChunkEgsDataset {
    pub fn new(entries: Vec<EgsEntry>, augment: Option<SpecAugment>) -> Self {
        Self { entries, augment, failure: LoadFailure::default() }
    }

    /// Shared handle onto this dataset's load errors.
    pub fn failure(&self) -> LoadFailure {
        self.failure.clone()
    }

    pub fn sample_count(&self) -> usize { self.entries.len() }

    pub fn entries(&self) -> &[EgsEntry] { &self.entries }

    fn load(&self, entry: &EgsEntry) -> anyhow::Result<ChunkSample> {
        let matrix = kaldi::read_rows(&entry.pointer, entry.start, entry.end)?;
        let mut features = matrix.data;
        if let Some(aug) = &self.augment {
            aug.apply(&mut features, matrix.rows, matrix.cols, &mut thread_rng());
        }
        Ok(ChunkSample { features, frames: matrix.rows, feat_dim: matrix.cols, label: entry.label })
    }
}

impl Dataset<ChunkSample> for ChunkEgsDataset {
    fn get(&self, index: usize) -> Option<ChunkSample> {
        let entry = self.entries.get(index)?;
        match self.load(entry) {
            Ok(sample) => Some(sample),
            Err(e) => {
                let message = format!("cannot load eg '{}': {e:#}", entry.eg_id);
                tracing::error!("{message}");
                self.failure.record(message);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
