// ============================================================
// Layer 4 — Chunk Egs Index
// ============================================================
// The preprocess stage leaves an egs directory behind:
//
//   egs_dir/
//     info/feat_dim        one integer
//     info/num_targets     one integer
//     train.egs.csv
//     valid.egs.csv        optional
//
// Each CSV starts with a header line; every following line is
//
//   <eg-id> <ark-path:offset> <start-position> <end-position> <class-label>
//
// where start and end are inclusive frame indices.

use std::{fs, path::Path};

use anyhow::{Context, Result};

use crate::data::kaldi::ArkPointer;
use crate::domain::error::LauncherError;

pub const TRAIN_EGS: &str = "train.egs.csv";
pub const VALID_EGS: &str = "valid.egs.csv";

/// Dimensions the model is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EgsInfo {
    pub feat_dim:    usize,
    pub num_targets: usize,
}

impl EgsInfo {
    pub fn read(egs_dir: &Path) -> Result<Self> {
        Ok(Self {
            feat_dim:    read_number(&egs_dir.join("info/feat_dim"))?,
            num_targets: read_number(&egs_dir.join("info/num_targets"))?,
        })
    }
}

fn read_number(path: &Path) -> Result<usize> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'. Did the preprocess stage run?", path.display()))?;
    let value = text
        .trim()
        .parse::<usize>()
        .map_err(|_| LauncherError::config(format!("'{}' does not hold a number", path.display())))?;
    if value == 0 {
        return Err(LauncherError::config(format!("'{}' holds 0", path.display())).into());
    }
    Ok(value)
}

/// One chunk example.
#[derive(Debug, Clone, PartialEq)]
pub struct EgsEntry {
    pub eg_id:   String,
    pub pointer: ArkPointer,
    pub start:   usize,
    pub end:     usize,
    pub label:   usize,
}

impl EgsEntry {
    pub fn frames(&self) -> usize {
        self.end - self.start + 1
    }

    fn parse(line: &str) -> Result<Self, LauncherError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(LauncherError::config(format!("expected 5 fields, got {}", fields.len())));
        }
        let number = |i: usize, name: &str| {
            fields[i]
                .parse::<usize>()
                .map_err(|_| LauncherError::config(format!("bad {name} '{}'", fields[i])))
        };
        let start = number(2, "start-position")?;
        let end   = number(3, "end-position")?;
        if end < start {
            return Err(LauncherError::config(format!("end-position {end} precedes start-position {start}")));
        }
        Ok(Self {
            eg_id:   fields[0].to_string(),
            pointer: ArkPointer::parse(fields[1])?,
            start,
            end,
            label:   number(4, "class-label")?,
        })
    }
}

/// Parse an egs CSV, skipping the header and blank lines.
pub fn read_egs_csv(path: &Path) -> Result<Vec<EgsEntry>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read egs file '{}'", path.display()))?;

    let mut entries = Vec::new();
    for (n, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let entry = EgsEntry::parse(line)
            .with_context(|| format!("{}:{}", path.display(), n + 1))?;
        entries.push(entry);
    }
    tracing::debug!("Read {} egs from '{}'", entries.len(), path.display());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "eg-id ark-path start-position end-position class-label";

    #[test]
    fn test_info_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("info")).unwrap();
        fs::write(dir.path().join("info/feat_dim"), "30\n").unwrap();
        fs::write(dir.path().join("info/num_targets"), "1211\n").unwrap();
        let info = EgsInfo::read(dir.path()).unwrap();
        assert_eq!(info, EgsInfo { feat_dim: 30, num_targets: 1211 });
    }

    #[test]
    fn test_missing_info_mentions_preprocess() {
        let dir = tempfile::tempdir().unwrap();
        let err = EgsInfo::read(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("preprocess"));
    }

    #[test]
    fn test_csv_parsing() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRAIN_EGS);
        fs::write(&path, format!("{HEADER}\nspk1-utt1-0 a/feats.ark:15 0 199 3\n\nspk2-utt4-1 a/feats.ark:9000 100 299 7\n")).unwrap();

        let entries = read_egs_csv(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].eg_id, "spk1-utt1-0");
        assert_eq!(entries[0].pointer.offset, 15);
        assert_eq!(entries[0].frames(), 200);
        assert_eq!(entries[1].label, 7);
    }

    #[test]
    fn test_bad_line_reports_location() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRAIN_EGS);
        fs::write(&path, format!("{HEADER}\nx a.ark:1 10 5 0\n")).unwrap();
        let err = read_egs_csv(&path).unwrap_err();
        assert!(err.to_string().ends_with(":2"));
    }
}
