// ============================================================
// Layer 3 — Checkpoints and Extraction Jobs
// ============================================================
// Both are pure naming conventions over the model directory:
//
//   model_dir/<epoch>.<suffix>                  checkpoint
//   model_dir/<tap>_epoch_<epoch>/<dataset>/    extraction output
//   <data_root>/<prefix>/<dataset>              extraction input
//
// Jobs are generated on demand from the three matrix axes and
// never stored.

use std::path::{Path, PathBuf};

use crate::domain::descriptor::TapPoint;

// ─── Checkpoint ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub epoch_label: String,
    pub suffix:      String,
}

impl Checkpoint {
    pub fn new(epoch_label: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self { epoch_label: epoch_label.into(), suffix: suffix.into() }
    }

    /// `<epoch>.<suffix>`, relative to the model directory.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.epoch_label, self.suffix)
    }

    pub fn path_in(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(self.file_name())
    }
}

// ─── ExtractionJob ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    pub tap_point:   TapPoint,
    pub epoch_label: String,
    pub dataset:     String,
    pub model_file:  String,
    pub point_name:  String,
    pub dataset_dir: PathBuf,
    pub output_dir:  PathBuf,
}

/// Fixed inputs shared by every job of one run.
#[derive(Debug, Clone)]
pub struct JobLayout<'a> {
    pub model_dir: &'a Path,
    pub data_root: &'a Path,
    pub prefix:    &'a str,
    pub suffix:    &'a str,
}

impl ExtractionJob {
    pub fn new(layout: &JobLayout<'_>, tap_point: TapPoint, epoch_label: &str, dataset: &str) -> Self {
        let point_name = format!("{tap_point}_epoch_{epoch_label}");
        Self {
            tap_point,
            epoch_label: epoch_label.to_string(),
            dataset:     dataset.to_string(),
            model_file:  Checkpoint::new(epoch_label, layout.suffix).file_name(),
            dataset_dir: layout.data_root.join(layout.prefix).join(dataset),
            output_dir:  layout.model_dir.join(&point_name).join(dataset),
            point_name,
        }
    }
}

/// Every job of the matrix, tap point outermost and dataset innermost.
pub fn extraction_matrix(
    layout:    &JobLayout<'_>,
    positions: &[TapPoint],
    epochs:    &[String],
    datasets:  &[String],
) -> Vec<ExtractionJob> {
    positions
        .iter()
        .flat_map(|tap| {
            epochs.iter().flat_map(move |epoch| {
                datasets
                    .iter()
                    .map(move |dataset| ExtractionJob::new(layout, *tap, epoch, dataset))
            })
        })
        .collect()
}
