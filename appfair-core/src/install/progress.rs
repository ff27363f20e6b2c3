//! Progress reporting and cancellation for long-running operations

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{FairError, Result};

type Listener = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Shared byte-progress handle
///
/// Clones observe the same counters. An optional listener is called with
/// `(completed, total)` on every update.
#[derive(Clone, Default)]
pub struct Progress {
    completed: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
    listener: Option<Listener>,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("completed", &self.completed())
            .field("total", &self.total())
            .finish()
    }
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(listener: impl Fn(u64, Option<u64>) + Send + Sync + 'static) -> Self {
        Self {
            listener: Some(Arc::new(listener)),
            ..Self::default()
        }
    }

    /// Set the expected total; zero means unknown
    pub fn set_total(&self, total: Option<u64>) {
        self.total.store(total.unwrap_or(0), Ordering::Relaxed);
        self.notify();
    }

    pub fn advance(&self, bytes: u64) {
        self.completed.fetch_add(bytes, Ordering::Relaxed);
        self.notify();
    }

    pub fn reset(&self) {
        self.completed.store(0, Ordering::Relaxed);
        self.notify();
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> Option<u64> {
        match self.total.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    /// Completed fraction in `0.0..=1.0`, if the total is known
    pub fn fraction(&self) -> Option<f64> {
        self.total()
            .map(|total| (self.completed() as f64 / total as f64).min(1.0))
    }

    fn notify(&self) {
        if let Some(listener) = &self.listener {
            listener(self.completed(), self.total());
        }
    }
}

/// Cooperative cancellation flag
///
/// Cloned tokens share state; cancelling one cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(FairError::Cancelled)
        } else {
            Ok(())
        }
    }
}
