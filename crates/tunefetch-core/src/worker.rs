//! Download worker: drains the job queue on a dedicated OS thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::progress::ProgressTracker;
use crate::provider::{Item, Provider};
use crate::queue::JobQueue;

/// Name prefix of worker threads.
pub const WORKER_THREAD_PREFIX: &str = "tunefetch-worker";

/// Per-worker counters, returned when the worker finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Items downloaded successfully.
    pub fetched: usize,
    /// Items already present on disk.
    pub skipped: usize,
    /// Items whose fetch failed.
    pub failed: usize,
}

impl WorkerStats {
    /// Total items this worker dequeued.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.fetched + self.skipped + self.failed
    }
}

/// What happened to a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The output file already existed.
    Skipped,
    /// The provider fetched the item.
    Fetched,
    /// The provider failed; the message was recorded in the tracker.
    Failed,
}

/// One unit of concurrent execution draining a [`JobQueue`].
pub struct Worker {
    id: usize,
    queue: Arc<JobQueue>,
    tracker: Arc<ProgressTracker>,
    provider: Arc<dyn Provider>,
    output_dir: PathBuf,
    cancel: CancellationToken,
}

impl Worker {
    /// Create a worker bound to a queue, tracker and provider.
    #[must_use]
    pub fn new(
        id: usize,
        queue: Arc<JobQueue>,
        tracker: Arc<ProgressTracker>,
        provider: Arc<dyn Provider>,
        output_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            queue,
            tracker,
            provider,
            output_dir,
            cancel,
        }
    }

    /// Process items until the queue is empty or cancellation is requested.
    ///
    /// Cancellation is only observed between items; an in-flight fetch runs
    /// to completion.
    pub fn run(&self) -> WorkerStats {
        let mut stats = WorkerStats::default();

        loop {
            if self.cancel.is_cancelled() {
                debug!("Worker {} stopping: cancellation requested", self.id);
                break;
            }
            let Some(item) = self.queue.try_dequeue() else {
                break;
            };

            match self.process(&item) {
                ItemOutcome::Skipped => stats.skipped += 1,
                ItemOutcome::Fetched => stats.fetched += 1,
                ItemOutcome::Failed => stats.failed += 1,
            }
        }

        debug!(
            "Worker {} finished: {} fetched, {} skipped, {} failed",
            self.id, stats.fetched, stats.skipped, stats.failed
        );
        stats
    }

    /// Handle one item: existence check, fetch, record.
    pub fn process(&self, item: &Item) -> ItemOutcome {
        let output_path = item.output_path(&self.output_dir);

        if output_path.exists() {
            info!("Skipping: {} (already downloaded)", item.title);
            self.tracker.record_skipped(&item.title);
            return ItemOutcome::Skipped;
        }

        debug!("Worker {} fetching {}", self.id, item);
        match self.provider.fetch_item(item, &self.output_dir) {
            Ok(()) => {
                info!("Completed: {}", item.title);
                self.tracker.record_success(&item.title);
                ItemOutcome::Fetched
            }
            Err(e) => {
                warn!("Failed to download '{}': {}", item.title, e);
                self.tracker.record_failure(&item.title, &e);
                ItemOutcome::Failed
            }
        }
    }

    /// Run this worker on a named OS thread.
    ///
    /// The returned handle reports completion through a channel so that the
    /// async orchestrator can wait on it with a timeout.
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let id = self.id;
        let (done_tx, done_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name(format!("{WORKER_THREAD_PREFIX}-{id}"))
            .spawn(move || {
                let stats = self.run();
                // The orchestrator may have stopped listening after an interrupt.
                let _ = done_tx.send(stats);
            })?;

        Ok(WorkerHandle {
            id,
            thread,
            done: done_rx,
        })
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

/// Handle to a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    id: usize,
    thread: JoinHandle<()>,
    done: oneshot::Receiver<WorkerStats>,
}

impl WorkerHandle {
    /// Worker identifier.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Whether the worker thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker to finish.
    ///
    /// Returns `None` if the worker thread panicked before reporting.
    pub async fn wait(self) -> Option<WorkerStats> {
        self.done.await.ok()
    }
}
