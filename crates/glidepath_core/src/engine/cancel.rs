use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared cancellation flag and progress counter for engine runs.
///
/// Clones share state, so a caller can hold one clone while a run holds
/// another. Backends check the flag between months (CPU) or between kernel
/// launches; a cancelled run returns no results.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    completed_paths: Arc<AtomicUsize>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from an existing flag (e.g. one shared with a UI)
    #[must_use]
    pub fn from_flag(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            completed_paths: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Token sharing this one's cancellation flag with its own progress
    /// counter, for one of several runs made at the same time
    #[must_use]
    pub fn child(&self) -> Self {
        Self::from_flag(Arc::clone(&self.cancelled))
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Paths finished across both phases of the current run
    #[must_use]
    pub fn completed_paths(&self) -> usize {
        self.completed_paths.load(Ordering::Relaxed)
    }

    pub(crate) fn record_paths(&self, n: usize) {
        self.completed_paths.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn reset_progress(&self) {
        self.completed_paths.store(0, Ordering::Relaxed);
    }
}
