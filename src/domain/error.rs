// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Typed failures raised by the launcher. Call sites return
// anyhow::Result and attach context; the pipeline driver
// downcasts to LauncherError to tell an interrupt apart from
// every other failure.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LauncherError {
    /// Malformed or missing blueprint, descriptor or parameter value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Resume requested but the experiment directory has no prior state.
    #[error("model directory `{dir}` is not usable for train-stage {train_stage}: {reason}")]
    DirectoryState {
        dir:         PathBuf,
        train_stage: i64,
        reason:      String,
    },

    /// A bounded readiness wait ran out of time.
    #[error("`{path}` did not appear within {waited_secs}s")]
    ReadinessNeverSatisfied { path: PathBuf, waited_secs: u64 },

    /// Non-zero exit from an external pipeline command.
    #[error("command failed: `{command}` ({status})")]
    ExternalCommand { command: String, status: String },

    #[error("interrupted by user")]
    Interrupted,

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),
}

impl LauncherError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Walk an anyhow chain and report whether it bottoms out in an interrupt.
    pub fn is_interrupt(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(cause.downcast_ref::<LauncherError>(), Some(LauncherError::Interrupted))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_interrupt_is_found_through_context() {
        let err = Err::<(), _>(LauncherError::Interrupted)
            .context("waiting for checkpoint")
            .unwrap_err();
        assert!(LauncherError::is_interrupt(&err));
    }

    #[test]
    fn test_other_errors_are_not_interrupts() {
        let err = anyhow::Error::new(LauncherError::config("bad optimizer"));
        assert!(!LauncherError::is_interrupt(&err));
        assert_eq!(err.to_string(), "configuration error: bad optimizer");
    }
}
