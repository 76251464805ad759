// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends training reports and LR-finder samples to CSV files
// under model_dir/log.
//
//   train.csv
//     epoch,iter,lr,train_loss,train_acc,valid_loss,valid_acc
//     1,100,0.000998,7.012345,0.001953,6.998877,0.002000
//
//   lr_finder.csv
//     lr,loss,smoothed_loss
//
// A resumed run appends to the existing train.csv; a fresh run
// or an LR sweep starts a new file.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

pub const TRAIN_HEADER:     &str = "epoch,iter,lr,train_loss,train_acc,valid_loss,valid_acc";
pub const LR_FINDER_HEADER: &str = "lr,loss,smoothed_loss";

/// One periodic training report.
#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub epoch:      usize,
    /// Iteration within the epoch (1-based).
    pub iter:       usize,
    pub lr:         f64,
    /// Mean over the iterations since the previous report.
    pub train_loss: f64,
    pub train_acc:  f64,
    /// NaN when the egs have no validation set.
    pub valid_loss: f64,
    pub valid_acc:  f64,
}

impl ReportRecord {
    fn csv_row(&self) -> String {
        format!(
            "{},{},{:.8},{:.6},{:.6},{:.6},{:.6}",
            self.epoch, self.iter, self.lr,
            self.train_loss, self.train_acc,
            self.valid_loss, self.valid_acc,
        )
    }
}

/// One LR-finder step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrFinderPoint {
    pub lr:            f64,
    pub loss:          f64,
    pub smoothed_loss: f64,
}

impl LrFinderPoint {
    fn csv_row(&self) -> String {
        format!("{:.10e},{:.6},{:.6}", self.lr, self.loss, self.smoothed_loss)
    }
}

/// CSV file with a fixed header.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Start a new file, replacing any previous one.
    pub fn create(path: impl Into<PathBuf>, header: &str) -> Result<Self> {
        let csv_path = path.into();
        ensure_parent(&csv_path)?;
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "{header}")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        Ok(Self { csv_path })
    }

    /// Append to an existing file, writing the header only if it is new.
    pub fn append(path: impl Into<PathBuf>, header: &str) -> Result<Self> {
        let csv_path = path.into();
        if csv_path.exists() {
            Ok(Self { csv_path })
        } else {
            Self::create(csv_path, header)
        }
    }

    pub fn log_report(&self, record: &ReportRecord) -> Result<()> {
        self.write_row(&record.csv_row())?;
        tracing::debug!(
            "Logged epoch {} iter {}: train_loss={:.4}, valid_loss={:.4}",
            record.epoch, record.iter, record.train_loss, record.valid_loss,
        );
        Ok(())
    }

    pub fn log_lr_point(&self, point: &LrFinderPoint) -> Result<()> {
        self.write_row(&point.csv_row())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    fn write_row(&self, row: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{row}")?;
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize) -> ReportRecord {
        ReportRecord {
            epoch, iter: 100, lr: 0.001,
            train_loss: 2.5, train_acc: 0.25,
            valid_loss: 2.75, valid_acc: 0.2,
        }
    }

    #[test]
    fn test_create_then_log() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::create(dir.path().join("log/train.csv"), TRAIN_HEADER).unwrap();
        logger.log_report(&record(1)).unwrap();

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], TRAIN_HEADER);
        assert_eq!(lines[1], "1,100,0.00100000,2.500000,0.250000,2.750000,0.200000");
    }

    #[test]
    fn test_append_keeps_previous_rows() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        MetricsLogger::create(&path, TRAIN_HEADER).unwrap().log_report(&record(1)).unwrap();
        MetricsLogger::append(&path, TRAIN_HEADER).unwrap().log_report(&record(2)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert_eq!(text.matches(TRAIN_HEADER).count(), 1);
    }

    #[test]
    fn test_create_truncates() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("lr_finder.csv");
        let first = MetricsLogger::create(&path, LR_FINDER_HEADER).unwrap();
        first.log_lr_point(&LrFinderPoint { lr: 1e-8, loss: 7.0, smoothed_loss: 7.0 }).unwrap();
        MetricsLogger::create(&path, LR_FINDER_HEADER).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
