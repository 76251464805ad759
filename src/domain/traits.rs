// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between the launcher and its collaborators:
//
//   CommandRunner — runs an external pipeline script
//                   (ShellCommandRunner in infra, a recorder in tests)
//
// The model factory seam lives in ml::factory because its
// output is a burn configuration.

use std::fmt;

use anyhow::Result;

// ─── ExternalCommand ──────────────────────────────────────────────────────────
/// A program plus its argv, one argument per entry. Nothing is
/// ever concatenated into a shell string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args:    Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `--name value` pair.
    pub fn opt(self, name: &str, value: impl ToString) -> Self {
        self.arg(format!("--{name}")).arg(value.to_string())
    }

    /// Value following `--name`, if present.
    pub fn option_value(&self, name: &str) -> Option<&str> {
        let flag = format!("--{name}");
        self.args
            .iter()
            .position(|a| *a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() {
                write!(f, " ''")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

// ─── CommandRunner ────────────────────────────────────────────────────────────
/// Runs one external command to completion.
///
/// A non-zero exit must come back as `LauncherError::ExternalCommand`,
/// or `LauncherError::Interrupted` when the run was interrupted.
pub trait CommandRunner {
    fn run(&self, command: &ExternalCommand) -> Result<()>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command: &ExternalCommand) -> Result<()> {
        (**self).run(command)
    }
}
