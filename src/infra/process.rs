// ============================================================
// Layer 6 — External Commands
// ============================================================
// Runs the preprocess and extraction scripts. The child
// inherits stdout/stderr so the scripts' own progress output
// stays visible. Exit status is trusted: zero is success,
// anything else is a failure, reported as Interrupted when the
// run's shutdown signal fired (Ctrl+C reaches the child too).

use std::{
    process::{Command, ExitStatus},
    time::Instant,
};

use anyhow::{Context, Result};

use crate::domain::error::LauncherError;
use crate::domain::traits::{CommandRunner, ExternalCommand};
use crate::infra::shutdown::ShutdownSignal;

#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    shutdown: ShutdownSignal,
}

impl ShellCommandRunner {
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self { shutdown }
    }

    fn classify_failure(&self, rendered: String, status: ExitStatus) -> LauncherError {
        if self.shutdown.is_triggered() || killed_by_interrupt(&status) {
            return LauncherError::Interrupted;
        }
        LauncherError::ExternalCommand { command: rendered, status: status.to_string() }
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(&self, command: &ExternalCommand) -> Result<()> {
        self.shutdown.check()?;

        let rendered = command.to_string();
        tracing::info!("Running: {rendered}");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        let started = Instant::now();
        let status  = cmd
            .status()
            .with_context(|| format!("Cannot start `{}`", command.program))?;
        tracing::debug!("`{}` finished in {:.1}s with {status}", command.program, started.elapsed().as_secs_f64());

        if status.success() {
            Ok(())
        } else {
            Err(self.classify_failure(rendered, status).into())
        }
    }
}

#[cfg(unix)]
fn killed_by_interrupt(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    // SIGINT
    status.signal() == Some(2)
}

#[cfg(not(unix))]
fn killed_by_interrupt(_status: &ExitStatus) -> bool {
    false
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_zero_exit_is_success() {
        let runner = ShellCommandRunner::new(ShutdownSignal::new());
        runner.run(&ExternalCommand::new("sh").arg("-c").arg("exit 0")).unwrap();
    }

    #[test]
    fn test_non_zero_exit_is_external_command_failure() {
        let runner = ShellCommandRunner::new(ShutdownSignal::new());
        let err = runner
            .run(&ExternalCommand::new("sh").arg("-c").arg("exit 3"))
            .unwrap_err();
        match err.downcast_ref::<LauncherError>() {
            Some(LauncherError::ExternalCommand { command, status }) => {
                assert!(command.starts_with("sh -c"));
                assert!(status.contains('3'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failure_after_interrupt_is_reported_as_interrupt() {
        let shutdown = ShutdownSignal::new();
        let runner   = ShellCommandRunner::new(shutdown.clone());
        let cmd      = ExternalCommand::new("sh").arg("-c").arg("exit 1");
        let status   = Command::new("sh").arg("-c").arg("exit 1").status().unwrap();
        shutdown.trigger();
        assert!(matches!(runner.classify_failure(cmd.to_string(), status), LauncherError::Interrupted));
        assert!(LauncherError::is_interrupt(&runner.run(&cmd).unwrap_err()));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let runner = ShellCommandRunner::new(ShutdownSignal::new());
        let err = runner
            .run(&ExternalCommand::new("definitely-not-a-real-program-xv"))
            .unwrap_err();
        assert!(err.to_string().contains("Cannot start"));
    }
}
