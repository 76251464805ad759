// ============================================================
// Layer 4 — Kaldi Matrix Reader
// ============================================================
// Reads one feature matrix out of a Kaldi binary archive, given
// the `ark-path:offset` pointer stored in the egs CSV. At the
// offset the archive holds:
//
//   "\0B"                    binary marker
//   "FM " | "DM "            f32 or f64 matrix token
//   0x04 <i32 rows>          little-endian
//   0x04 <i32 cols>
//   rows × cols values       row-major
//
// Only the requested rows are read from disk. Compressed
// matrices ("CM") are not supported.

use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::domain::error::LauncherError;

/// Frames × feature bins, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl FeatureMatrix {
    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }
}

/// `path:offset` as written by Kaldi scp files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArkPointer {
    pub path:   PathBuf,
    pub offset: u64,
}

impl ArkPointer {
    pub fn parse(text: &str) -> Result<Self, LauncherError> {
        let (path, offset) = text
            .rsplit_once(':')
            .ok_or_else(|| LauncherError::config(format!("'{text}' is not an ark-path:offset pointer")))?;
        let offset = offset
            .parse()
            .map_err(|_| LauncherError::config(format!("bad archive offset in '{text}'")))?;
        Ok(Self { path: PathBuf::from(path), offset })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    F32,
    F64,
}

impl ValueKind {
    fn width(self) -> usize {
        match self {
            ValueKind::F32 => 4,
            ValueKind::F64 => 8,
        }
    }
}

/// "\0B" + token + two size-prefixed dimensions.
const HEADER_BYTES: u64 = 2 + 3 + 5 + 5;

/// Rows and columns of the matrix at `pointer`. Fails when the
/// header is unreadable or the archive is too short to hold the
/// whole matrix.
pub fn matrix_shape(pointer: &ArkPointer) -> Result<(usize, usize)> {
    let file = File::open(&pointer.path)
        .with_context(|| format!("Cannot open archive '{}'", pointer.path.display()))?;
    let file_len   = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(pointer.offset))?;

    let (kind, rows, cols) = read_header(&mut reader, &pointer.path).with_context(|| {
        format!("Cannot read matrix header at '{}:{}'", pointer.path.display(), pointer.offset)
    })?;
    let needed = pointer.offset + HEADER_BYTES + (rows * cols * kind.width()) as u64;
    if needed > file_len {
        return Err(LauncherError::config(format!(
            "archive '{}' ends inside the {rows}x{cols} matrix at offset {}",
            pointer.path.display(),
            pointer.offset
        ))
        .into());
    }
    Ok((rows, cols))
}

/// Read rows `start..=end` of the matrix at `pointer`.
pub fn read_rows(pointer: &ArkPointer, start: usize, end: usize) -> Result<FeatureMatrix> {
    let file = File::open(&pointer.path)
        .with_context(|| format!("Cannot open archive '{}'", pointer.path.display()))?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(pointer.offset))?;

    let (kind, rows, cols) = read_header(&mut reader, &pointer.path)?;
    if start > end || end >= rows {
        return Err(LauncherError::config(format!(
            "rows {start}..={end} out of range for a {rows}-row matrix in '{}'",
            pointer.path.display()
        ))
        .into());
    }

    let row_bytes = cols * kind.width();
    reader.seek(SeekFrom::Current((start * row_bytes) as i64))?;

    let wanted  = end - start + 1;
    let mut raw = vec![0u8; wanted * row_bytes];
    reader
        .read_exact(&mut raw)
        .with_context(|| format!("Archive '{}' ends inside a matrix", pointer.path.display()))?;

    let data = match kind {
        ValueKind::F32 => raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        ValueKind::F64 => raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
    };
    Ok(FeatureMatrix { rows: wanted, cols, data })
}

fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<(ValueKind, usize, usize)> {
    let bad = |what: &str| LauncherError::config(format!("{what} in archive '{}'", path.display()));

    let mut marker = [0u8; 2];
    reader.read_exact(&mut marker)?;
    if marker != *b"\0B" {
        return Err(bad("missing binary marker").into());
    }

    let mut token = [0u8; 3];
    reader.read_exact(&mut token)?;
    let kind = match &token {
        b"FM " => ValueKind::F32,
        b"DM " => ValueKind::F64,
        b"CM " | b"CM2" | b"CM3" => return Err(bad("compressed matrix (unsupported)").into()),
        _ => return Err(bad("unknown matrix token").into()),
    };

    let rows = read_dim(reader).map_err(|_| bad("bad row count"))?;
    let cols = read_dim(reader).map_err(|_| bad("bad column count"))?;
    Ok((kind, rows, cols))
}

fn read_dim<R: Read>(reader: &mut R) -> Result<usize> {
    let mut size = [0u8; 1];
    reader.read_exact(&mut size)?;
    anyhow::ensure!(size[0] == 4, "dimension is not a 4-byte integer");
    let mut value = [0u8; 4];
    reader.read_exact(&mut value)?;
    let value = i32::from_le_bytes(value);
    anyhow::ensure!(value >= 0, "negative dimension");
    Ok(value as usize)
}
