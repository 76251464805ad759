// ============================================================
// Layer 4 — Data Bunch
// ============================================================
// Training and validation egs of one egs directory, plus the
// dimensions the model factory needs. Every eg's matrix header
// and frame range is checked here, so a broken archive fails
// the run before the first epoch instead of inside a loader.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};

use crate::data::augment::SpecAugment;
use crate::data::dataset::ChunkEgsDataset;
use crate::data::egs::{read_egs_csv, EgsEntry, EgsInfo, TRAIN_EGS, VALID_EGS};
use crate::data::kaldi::{self, ArkPointer};
use crate::domain::error::LauncherError;
use crate::domain::params::{Augmentation, EgsParams};

pub struct Bunch {
    pub info:  EgsInfo,
    pub train: ChunkEgsDataset,
    /// None when the egs directory has no validation CSV.
    pub valid: Option<ChunkEgsDataset>,
}

impl Bunch {
    /// Index the egs directory. Augmentation only ever applies to
    /// the training set.
    pub fn from_egs_dir(egs_dir: &Path, params: &EgsParams) -> Result<Self> {
        let info = EgsInfo::read(egs_dir)?;

        let train_entries = read_egs_csv(&egs_dir.join(TRAIN_EGS))?;
        if train_entries.is_empty() {
            return Err(LauncherError::config(format!(
                "'{}' contains no training egs",
                egs_dir.join(TRAIN_EGS).display()
            ))
            .into());
        }
        if let Some(bad) = train_entries.iter().find(|e| e.label >= info.num_targets) {
            return Err(LauncherError::config(format!(
                "eg '{}' has label {} but num_targets is {}",
                bad.eg_id, bad.label, info.num_targets
            ))
            .into());
        }
        check_entries(&train_entries, info.feat_dim, &egs_dir.join(TRAIN_EGS))?;

        let augment = params.aug.map(|kind| match kind {
            Augmentation::SpecAugment => SpecAugment::new(&params.aug_params),
        });
        let train = ChunkEgsDataset::new(train_entries, augment);

        let valid_path = egs_dir.join(VALID_EGS);
        let valid = if valid_path.is_file() {
            let entries = read_egs_csv(&valid_path)?;
            check_entries(&entries, info.feat_dim, &valid_path)?;
            Some(ChunkEgsDataset::new(entries, None))
        } else {
            tracing::warn!("No '{}', validation metrics will be NaN", valid_path.display());
            None
        };

        tracing::info!(
            "Egs: feat_dim={}, num_targets={}, train={}, valid={}",
            info.feat_dim,
            info.num_targets,
            train.sample_count(),
            valid.as_ref().map_or(0, ChunkEgsDataset::sample_count),
        );
        Ok(Self { info, train, valid })
    }
}

/// Every eg must point at a readable `feat_dim`-column matrix
/// that covers its frame range.
fn check_entries(entries: &[EgsEntry], feat_dim: usize, csv: &Path) -> Result<()> {
    let mut shapes: HashMap<&ArkPointer, (usize, usize)> = HashMap::new();
    for entry in entries {
        let (rows, cols) = match shapes.get(&entry.pointer) {
            Some(shape) => *shape,
            None => {
                let shape = kaldi::matrix_shape(&entry.pointer)
                    .with_context(|| format!("Unreadable eg '{}' in '{}'", entry.eg_id, csv.display()))?;
                shapes.insert(&entry.pointer, shape);
                shape
            }
        };
        if cols != feat_dim {
            return Err(LauncherError::config(format!(
                "eg '{}' has {cols} feature bins but feat_dim is {feat_dim}",
                entry.eg_id
            ))
            .into());
        }
        if entry.start > entry.end || entry.end >= rows {
            return Err(LauncherError::config(format!(
                "eg '{}' spans frames {}..={} of a {rows}-frame matrix",
                entry.eg_id, entry.start, entry.end
            ))
            .into());
        }
    }
    Ok(())
}
