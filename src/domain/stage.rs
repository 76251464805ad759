// ============================================================
// Layer 3 — Stage Range
// ============================================================
// The pipeline is a fixed sequence of five phases:
//
//   0  vad / cmn            (preprocess script)
//   1  utterance filtering  (preprocess script)
//   2  chunk-egs generation (preprocess script)
//   3  training             (in process)
//   4  embedding extraction (extract script, one job per matrix cell)
//
// A run is gated by a requested [stage, endstage] window. Requests
// outside 0..=4 are clipped, never rejected.

use serde::{Deserialize, Serialize};

/// Lowest phase id.
pub const FIRST_PHASE: i64 = 0;

/// Highest phase id.
pub const LAST_PHASE: i64 = 4;

/// One of the five fixed pipeline phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    VadCmn,
    RemoveUtts,
    ChunkEgs,
    Train,
    Extract,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::VadCmn,
        Phase::RemoveUtts,
        Phase::ChunkEgs,
        Phase::Train,
        Phase::Extract,
    ];

    pub fn id(self) -> i64 {
        match self {
            Phase::VadCmn     => 0,
            Phase::RemoveUtts => 1,
            Phase::ChunkEgs   => 2,
            Phase::Train      => 3,
            Phase::Extract    => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::VadCmn     => "vad-cmn",
            Phase::RemoveUtts => "remove-utts",
            Phase::ChunkEgs   => "chunk-egs",
            Phase::Train      => "train",
            Phase::Extract    => "extract",
        }
    }
}

/// Effective `[stage, endstage]` window after clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRange {
    stage:    i64,
    endstage: i64,
}

impl StageRange {
    /// Clip a requested window: `stage = max(0, stage)`, `endstage = min(4, endstage)`.
    pub fn new(stage: i64, endstage: i64) -> Self {
        Self {
            stage:    stage.max(FIRST_PHASE),
            endstage: endstage.min(LAST_PHASE),
        }
    }

    pub fn stage(&self) -> i64 {
        self.stage
    }

    pub fn endstage(&self) -> i64 {
        self.endstage
    }

    /// True iff `stage <= phase <= endstage`.
    pub fn runs(&self, phase: Phase) -> bool {
        self.runs_id(phase.id())
    }

    pub fn runs_id(&self, phase: i64) -> bool {
        self.stage <= phase && phase <= self.endstage
    }

    /// True iff at least one phase in `first..=last` runs.
    pub fn overlaps(&self, first: Phase, last: Phase) -> bool {
        Phase::ALL
            .iter()
            .filter(|p| **p >= first && **p <= last)
            .any(|p| self.runs(*p))
    }

    /// Phases selected by this window, in execution order.
    pub fn phases(&self) -> Vec<Phase> {
        Phase::ALL.iter().copied().filter(|p| self.runs(*p)).collect()
    }
}

impl Default for StageRange {
    fn default() -> Self {
        Self::new(3, 4)
    }
}
