//! Thread-safe record of per-item outcomes.
//!
//! Workers append to the tracker as items finish; the orchestrator drains the
//! display lists on every tick. All three lists sit behind one mutex and no
//! critical section performs I/O.

use std::fmt::Display;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Outcomes {
    completed: Vec<String>,
    skipped: Vec<String>,
    errors: Vec<String>,
}

/// Shared accumulator for completed, skipped and failed items.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: Mutex<Outcomes>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful download.
    pub fn record_success(&self, title: &str) {
        self.lock().completed.push(title.to_string());
    }

    /// Record an item that was already on disk.
    pub fn record_skipped(&self, title: &str) {
        self.lock().skipped.push(title.to_string());
    }

    /// Record a failed download as `"{title}: {error}"`.
    pub fn record_failure(&self, title: &str, error: &dyn Display) {
        let entry = format!("{title}: {error}");
        self.lock().errors.push(entry);
    }

    /// Take every completed title recorded since the last drain.
    pub fn drain_completed(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().completed)
    }

    /// Take every skipped title recorded since the last drain.
    pub fn drain_skipped(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().skipped)
    }

    /// Take completed and skipped titles in a single critical section.
    pub fn drain_display(&self) -> (Vec<String>, Vec<String>) {
        let mut outcomes = self.lock();
        (
            std::mem::take(&mut outcomes.completed),
            std::mem::take(&mut outcomes.skipped),
        )
    }

    /// Copy of all failures recorded so far. Errors are never drained.
    #[must_use]
    pub fn read_errors(&self) -> Vec<String> {
        self.lock().errors.clone()
    }

    /// Number of failures recorded so far.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.lock().errors.len()
    }

    // Every mutation is a single push or take, so a poisoned lock still holds
    // consistent lists.
    fn lock(&self) -> MutexGuard<'_, Outcomes> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
