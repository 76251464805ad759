// ============================================================
// Layer 2 — Preprocess Stage (phases 0–2)
// ============================================================
// Hands vad/cmn, utterance filtering and chunk-egs generation
// to the external preprocess script. The effective range is
// passed through unchanged; the script decides which of its own
// steps fall inside it.

use anyhow::Result;

use crate::application::pipeline::{RunContext, Stage, StageOutcome};
use crate::domain::params::PreprocessParams;
use crate::domain::stage::{Phase, StageRange};
use crate::domain::traits::{CommandRunner, ExternalCommand};

pub struct PreprocessStage<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> PreprocessStage<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

/// Full argv of the preprocess script, one entry per token.
pub fn preprocess_command(
    params:      &PreprocessParams,
    range:       &StageRange,
    force_clear: bool,
    traindata:   &std::path::Path,
    egs_dir:     &std::path::Path,
) -> ExternalCommand {
    ExternalCommand::new(params.shell.as_str())
        .arg(params.script.display().to_string())
        .opt("stage", range.stage())
        .opt("endstage", range.endstage())
        .opt("valid-split-type", &params.valid_split_type)
        .opt("nj", params.nj)
        .opt("cmn", params.cmn)
        .opt("limit-utts", params.limit_utts)
        .opt("min-chunk", params.chunk_size)
        .opt("overlap", params.overlap)
        .opt("sample-type", params.sample_type.as_str())
        .opt("chunk-num", params.chunk_num)
        .opt("scale", params.scale)
        .opt("force-clear", force_clear)
        .opt("valid-num-utts", params.valid_utts)
        .opt("valid-chunk-num", params.valid_chunk_num)
        .opt("compress", params.compress)
        .arg(traindata.display().to_string())
        .arg(egs_dir.display().to_string())
}

impl<R: CommandRunner> Stage for PreprocessStage<R> {
    fn name(&self) -> &'static str { "preprocess" }

    fn phases(&self) -> (Phase, Phase) { (Phase::VadCmn, Phase::ChunkEgs) }

    fn run(&self, ctx: &RunContext<'_>) -> Result<StageOutcome> {
        let paths   = &ctx.params.paths;
        let command = preprocess_command(
            &ctx.params.preprocess,
            &ctx.options.range,
            ctx.options.force_clear,
            &paths.traindata,
            &paths.egs_dir,
        );
        tracing::info!(
            "Preprocessing '{}' into '{}'",
            paths.traindata.display(),
            paths.egs_dir.display()
        );
        self.runner.run(&command)?;
        Ok(StageOutcome::Continue)
    }
}
