// ============================================================
// Layer 6 — Readiness Wait
// ============================================================
// File-based rendezvous with a producer that may live in
// another process (a trainer writing checkpoints). The wait
// sleeps for `poll_interval`, rechecks, and repeats:
//
//   timeout = Some(d) → ReadinessNeverSatisfied after d
//   timeout = None    → waits until the condition holds
//
// Either way an interrupt ends the wait with Interrupted.

use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};

use crate::domain::error::LauncherError;
use crate::infra::shutdown::ShutdownSignal;

#[derive(Debug, Clone)]
pub struct ReadinessWait {
    pub poll_interval: Duration,
    pub timeout:       Option<Duration>,
}

impl ReadinessWait {
    pub fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self { poll_interval, timeout }
    }

    /// Block until `ready()` returns true.
    pub fn wait_until<F>(
        &self,
        what:     &Path,
        shutdown: &ShutdownSignal,
        mut ready: F,
    ) -> Result<Duration, LauncherError>
    where
        F: FnMut() -> bool,
    {
        let started = Instant::now();
        let mut announced = false;
        loop {
            shutdown.check()?;
            if ready() {
                return Ok(started.elapsed());
            }
            if !announced {
                tracing::info!("Waiting for '{}' to appear", what.display());
                announced = true;
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    return Err(LauncherError::ReadinessNeverSatisfied {
                        path:        what.to_path_buf(),
                        waited_secs: limit.as_secs(),
                    });
                }
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Block until `path` exists.
    pub fn wait_for_file(&self, path: &Path, shutdown: &ShutdownSignal) -> Result<Duration, LauncherError> {
        self.wait_until(path, shutdown, || path.exists())
    }
}
