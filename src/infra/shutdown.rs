// ============================================================
// Layer 6 — Shutdown Signal
// ============================================================
// A cloneable flag raised by Ctrl+C. Long waits and failed
// external commands consult it so that an interrupt surfaces
// as LauncherError::Interrupted rather than as an ordinary
// failure. One signal is created per run and handed to the
// components that need it.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;

use crate::domain::error::LauncherError;

#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route Ctrl+C to this signal. Only one handler may be installed
    /// per process.
    pub fn install_ctrlc(&self) -> Result<()> {
        let flag = Arc::clone(&self.flag);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
            tracing::info!("interrupt received (Ctrl+C)");
        })
        .map_err(|e| anyhow::anyhow!("Cannot install Ctrl+C handler: {e}"))
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once the signal has fired.
    pub fn check(&self) -> Result<(), LauncherError> {
        if self.is_triggered() {
            Err(LauncherError::Interrupted)
        } else {
            Ok(())
        }
    }
}
