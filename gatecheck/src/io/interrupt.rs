//! User-abort signalling.
//!
//! Git forwards Ctrl-C to the hook's process group, so the gate treats SIGINT
//! as a request to stop cleanly: running checks are killed, the rest are
//! skipped and the commit is allowed to proceed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use signal_hook::consts::SIGINT;
use tracing::debug;

/// Shared, clonable abort flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    raised: Arc<AtomicBool>,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT to this flag for the rest of the process lifetime.
    pub fn install_sigint(&self) -> Result<()> {
        signal_hook::flag::register(SIGINT, Arc::clone(&self.raised))
            .context("register SIGINT handler")?;
        debug!("SIGINT handler installed");
        Ok(())
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}
