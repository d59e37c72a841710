//! Download orchestrator: runs one playlist through a bounded worker pool.
//!
//! The orchestrator owns a fresh [`JobQueue`] and [`ProgressTracker`] per run,
//! spawns the workers, and polls the tracker on a fixed cadence so that a
//! [`ProgressReporter`] can show completions as they happen. Cancellation is
//! best-effort: the orchestrator stops waiting after a grace period, while a
//! worker that is inside a fetch keeps running until that fetch returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::progress::ProgressTracker;
use crate::provider::{Item, Provider};
use crate::queue::JobQueue;
use crate::worker::{Worker, WorkerHandle, WorkerStats};

/// Default ceiling on concurrent workers.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default display cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time to wait for workers after an interrupt.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Number of workers for a pool capped at `max_workers` on `cpu_count` CPUs.
///
/// Never returns zero.
#[must_use]
pub fn pool_size(max_workers: usize, cpu_count: usize) -> usize {
    max_workers.min(cpu_count).max(1)
}

/// Parallelism reported by the OS, or 1 if it cannot be determined.
#[must_use]
pub fn available_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Orchestrator tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Upper bound on workers regardless of CPU count.
    pub max_workers: usize,
    /// CPU count to size the pool against; `None` asks the OS.
    pub cpu_count: Option<usize>,
    /// How often completed items are drained for display.
    pub poll_interval: Duration,
    /// How long to wait for workers after cancellation.
    pub grace_period: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            cpu_count: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl OrchestratorConfig {
    /// Pool size this configuration yields on the current machine.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        pool_size(
            self.max_workers,
            self.cpu_count.unwrap_or_else(available_cpus),
        )
    }
}

/// Receives progress events.
///
/// Called from the orchestrator's task, never from worker threads, and never
/// while the tracker lock is held. Every method defaults to doing nothing.
pub trait ProgressReporter: Send + Sync {
    /// A playlist is about to be downloaded.
    fn playlist_started(&self, _title: &str, _total_items: usize) {}

    /// An item was downloaded.
    fn item_completed(&self, _title: &str) {}

    /// An item was already on disk.
    fn item_skipped(&self, _title: &str) {}

    /// A playlist finished (or was interrupted).
    fn playlist_finished(&self, _title: &str, _report: &DownloadReport) {}

    /// A playlist could not be processed at all.
    fn playlist_failed(&self, _title: &str, _reason: &str) {}
}

/// Reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {}

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    /// Items handed to the orchestrator.
    pub total_items: usize,
    /// Workers spawned.
    pub workers: usize,
    /// Titles downloaded, in the order they were reported.
    pub completed: Vec<String>,
    /// Titles skipped because their file already existed.
    pub skipped: Vec<String>,
    /// `"title: message"` for every failed item.
    pub errors: Vec<String>,
    /// Whether the run was cut short by cancellation.
    pub interrupted: bool,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl DownloadReport {
    /// True when the run finished without failures or interruption.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.interrupted
    }
}

/// Runs item lists through a pool of [`Worker`]s.
#[derive(Debug, Clone)]
pub struct DownloadOrchestrator {
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl DownloadOrchestrator {
    /// Create an orchestrator that stops when `cancel` is triggered.
    #[must_use]
    pub const fn new(config: OrchestratorConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Download `items` into `output_dir` and wait for the pool to drain.
    ///
    /// Returns early, with [`DownloadReport::interrupted`] set, if the
    /// cancellation token fires. Fails only if no worker thread could be
    /// started.
    pub async fn run(
        &self,
        items: Vec<Item>,
        provider: Arc<dyn Provider>,
        output_dir: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<DownloadReport> {
        let started = Instant::now();
        let total_items = items.len();
        let queue = Arc::new(JobQueue::from_items(items));
        let tracker = Arc::new(ProgressTracker::new());
        let worker_cancel = self.cancel.child_token();

        let handles = self.spawn_workers(
            &queue,
            &tracker,
            &provider,
            output_dir.to_path_buf(),
            &worker_cancel,
        )?;
        info!(
            "Downloading {} items with {} workers into {}",
            total_items,
            handles.len(),
            output_dir.display()
        );

        let mut report = DownloadReport {
            total_items,
            workers: handles.len(),
            ..DownloadReport::default()
        };

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let interrupted = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break true,
                _ = ticker.tick() => {
                    flush(&tracker, reporter, &mut report);
                    if handles.iter().all(WorkerHandle::is_finished) {
                        break false;
                    }
                }
            }
        };

        let stats = if interrupted {
            warn!("Download interrupted, waiting for workers to finish current items");
            worker_cancel.cancel();
            self.wait_with_grace(handles).await
        } else {
            wait_all(handles).await
        };

        flush(&tracker, reporter, &mut report);
        report.errors = tracker.read_errors();
        report.interrupted = interrupted;
        report.elapsed = started.elapsed();

        let fetched: usize = stats.iter().map(|s| s.fetched).sum();
        info!(
            "Finished in {:.1}s: {} downloaded, {} skipped, {} failed{}",
            report.elapsed.as_secs_f64(),
            fetched,
            report.skipped.len(),
            report.errors.len(),
            if interrupted { " (interrupted)" } else { "" }
        );

        Ok(report)
    }

    fn spawn_workers(
        &self,
        queue: &Arc<JobQueue>,
        tracker: &Arc<ProgressTracker>,
        provider: &Arc<dyn Provider>,
        output_dir: PathBuf,
        cancel: &CancellationToken,
    ) -> Result<Vec<WorkerHandle>> {
        let count = self.config.worker_count();
        let mut handles = Vec::with_capacity(count);

        for id in 0..count {
            let worker = Worker::new(
                id,
                Arc::clone(queue),
                Arc::clone(tracker),
                Arc::clone(provider),
                output_dir.clone(),
                cancel.clone(),
            );
            match worker.spawn() {
                Ok(handle) => handles.push(handle),
                Err(e) if handles.is_empty() => {
                    error!("Failed to start any download worker: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(
                        "Failed to start worker {}: {}, continuing with {}",
                        id,
                        e,
                        handles.len()
                    );
                    break;
                }
            }
        }

        Ok(handles)
    }

    async fn wait_with_grace(&self, handles: Vec<WorkerHandle>) -> Vec<WorkerStats> {
        let deadline = tokio::time::Instant::now() + self.config.grace_period;
        let mut stats = Vec::with_capacity(handles.len());

        for handle in handles {
            let id = handle.id();
            match tokio::time::timeout_at(deadline, handle.wait()).await {
                Ok(Some(s)) => stats.push(s),
                Ok(None) => error!("Worker {} terminated abnormally", id),
                Err(_) => debug!("Worker {} still busy after grace period, abandoning", id),
            }
        }

        stats
    }
}

async fn wait_all(handles: Vec<WorkerHandle>) -> Vec<WorkerStats> {
    let mut stats = Vec::with_capacity(handles.len());
    for handle in handles {
        let id = handle.id();
        match handle.wait().await {
            Some(s) => stats.push(s),
            None => error!("Worker {} terminated abnormally", id),
        }
    }
    stats
}

// The tracker lock is released before any reporter call.
fn flush(tracker: &ProgressTracker, reporter: &dyn ProgressReporter, report: &mut DownloadReport) {
    let (completed, skipped) = tracker.drain_display();
    for title in &completed {
        reporter.item_completed(title);
    }
    for title in &skipped {
        reporter.item_skipped(title);
    }
    report.completed.extend(completed);
    report.skipped.extend(skipped);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;
    use crate::error::FetchError;
    use crate::provider::MockProvider;

    fn test_config(cpu_count: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            cpu_count: Some(cpu_count),
            poll_interval: Duration::from_millis(10),
            grace_period: Duration::from_millis(200),
            ..OrchestratorConfig::default()
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        completed: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn item_completed(&self, title: &str) {
            self.completed.lock().unwrap().push(title.to_string());
        }
    }

    #[test]
    fn test_pool_size_caps_and_floors() {
        assert_eq!(pool_size(4, 1), 1);
        assert_eq!(pool_size(4, 8), 4);
        assert_eq!(pool_size(4, 4), 4);
        assert_eq!(pool_size(4, 0), 1);
        assert_eq!(pool_size(0, 8), 1);
    }

    #[test]
    fn test_config_worker_count_uses_override() {
        assert_eq!(test_config(1).worker_count(), 1);
        assert_eq!(test_config(16).worker_count(), DEFAULT_MAX_WORKERS);
        assert!(OrchestratorConfig::default().worker_count() >= 1);
    }

    #[tokio::test]
    async fn test_run_reports_each_completion_once() {
        let dir = TempDir::new().unwrap();
        let mut provider = MockProvider::new();
        provider.expect_fetch_item().times(2).returning(|_, _| Ok(()));

        let orchestrator = DownloadOrchestrator::new(test_config(2), CancellationToken::new());
        let reporter = RecordingReporter::default();
        let items = vec![Item::new("A", "u1"), Item::new("B", "u2")];

        let report = orchestrator
            .run(items, Arc::new(provider), dir.path(), &reporter)
            .await
            .unwrap();

        let mut shown = reporter.completed.lock().unwrap().clone();
        shown.sort();
        assert_eq!(shown, vec!["A", "B"]);
        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.workers, 2);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_run_collects_failures() {
        let dir = TempDir::new().unwrap();
        let mut provider = MockProvider::new();
        provider.expect_fetch_item().returning(|item, _| {
            if item.title == "B" {
                Err(FetchError::other("network timeout"))
            } else {
                Ok(())
            }
        });

        let orchestrator = DownloadOrchestrator::new(test_config(4), CancellationToken::new());
        let items = vec![Item::new("A", "u1"), Item::new("B", "u2")];

        let report = orchestrator
            .run(items, Arc::new(provider), dir.path(), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(report.completed, vec!["A"]);
        assert_eq!(report.errors, vec!["B: network timeout"]);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_run_with_no_items_finishes() {
        let dir = TempDir::new().unwrap();
        let orchestrator = DownloadOrchestrator::new(test_config(1), CancellationToken::new());

        let report = orchestrator
            .run(Vec::new(), Arc::new(MockProvider::new()), dir.path(), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(report.total_items, 0);
        assert_eq!(report.workers, 1);
        assert!(report.completed.is_empty());
        assert!(!report.interrupted);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_returns_interrupted() {
        let dir = TempDir::new().unwrap();
        let mut provider = MockProvider::new();
        provider.expect_fetch_item().never();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let orchestrator = DownloadOrchestrator::new(test_config(2), cancel);

        let report = orchestrator
            .run(vec![Item::new("A", "u1")], Arc::new(provider), dir.path(), &NoopReporter)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert!(report.completed.is_empty());
    }
}
