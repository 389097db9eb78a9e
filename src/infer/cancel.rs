//! Cooperative cancellation for long-running queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{BayonetError, Result};

/// A shared flag checked between elimination steps and between column-level
/// queries. Cancellation is cooperative: the flag is only observed at those
/// boundaries, and a cancelled driver returns cleanly without partial output.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Requests cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Fails with [`BayonetError::Cancelled`] once cancellation is requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BayonetError::Cancelled)
        } else {
            Ok(())
        }
    }
}
