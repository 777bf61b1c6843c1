use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

/// Set when the scheduler asks us to stop (SIGTERM on job cancellation or
/// time limit, SIGINT interactively). Long-running subprocesses poll it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a flag that is raised by SIGTERM and SIGINT.
    pub fn from_signals() -> Result<Self> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        let flag = Self::default();
        signal_hook::flag::register(SIGTERM, Arc::clone(&flag.0))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&flag.0))?;
        Ok(flag)
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
