//! Playlist batch driver.
//!
//! Resolves a single playlist URL or a manifest of playlists into output
//! directories and runs the [`DownloadOrchestrator`] once per playlist, one
//! playlist at a time. A playlist that cannot be enumerated is recorded and
//! skipped unless the batch runs with [`BatchPolicy::Abort`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Error, FileSystemError, Result, RetrievalError};
use crate::orchestrator::{DownloadOrchestrator, DownloadReport, ProgressReporter};
use crate::provider::{Item, Provider, sanitize_filename};

/// Directory name used when a single playlist URL is given.
pub const SINGLE_PLAYLIST_DIR: &str = "single_playlist";

/// Where the playlists of a batch come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistSource {
    /// One playlist URL.
    Single(String),
    /// A JSON manifest listing `{title, url}` entries.
    Manifest(PathBuf),
}

/// What to do when a playlist cannot be processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Record the failure and continue with the next playlist.
    #[default]
    SkipAndContinue,
    /// Stop the batch at the first failed playlist.
    Abort,
}

/// One manifest entry as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Playlist title, used for the output directory.
    #[serde(default)]
    pub title: Option<String>,
    /// Playlist URL.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    List(Vec<ManifestEntry>),
    Wrapped { playlists: Vec<ManifestEntry> },
}

/// A playlist ready to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistJob {
    /// Display title.
    pub title: String,
    /// Playlist URL.
    pub url: String,
    /// Directory the items are written to.
    pub output_dir: PathBuf,
}

impl ManifestEntry {
    /// Turn the entry at `index` into a job under `base`.
    pub fn into_job(
        self,
        index: usize,
        base: &Path,
    ) -> std::result::Result<PlaylistJob, RetrievalError> {
        let invalid = |reason: &str| RetrievalError::InvalidManifestEntry {
            index,
            reason: reason.to_string(),
        };

        let url = self
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| invalid("missing url"))?;
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| invalid("missing title"))?;

        let dir_name = sanitize_filename(&title);
        if dir_name.is_empty() {
            return Err(invalid("title is not usable as a directory name"));
        }

        Ok(PlaylistJob {
            output_dir: base.join(dir_name),
            title,
            url: url.trim().to_string(),
        })
    }
}

/// Read a manifest file.
///
/// The file is either a JSON array of entries or an object with a
/// `playlists` array. An unreadable or unparsable file is an error; the
/// validity of individual entries is checked later, per entry.
pub fn load_manifest(path: &Path) -> std::result::Result<Vec<ManifestEntry>, RetrievalError> {
    let content = fs::read_to_string(path).map_err(|e| RetrievalError::ManifestUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let manifest: ManifestFile =
        serde_json::from_str(&content).map_err(|e| RetrievalError::ManifestMalformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(match manifest {
        ManifestFile::List(entries) | ManifestFile::Wrapped { playlists: entries } => entries,
    })
}

/// Expand a source into per-playlist jobs rooted at `base`.
///
/// Returns one result per playlist so that a bad manifest entry fails only
/// itself.
pub fn resolve_jobs(
    source: &PlaylistSource,
    base: &Path,
) -> std::result::Result<Vec<std::result::Result<PlaylistJob, RetrievalError>>, RetrievalError> {
    match source {
        PlaylistSource::Single(url) => Ok(vec![Ok(PlaylistJob {
            title: SINGLE_PLAYLIST_DIR.to_string(),
            url: url.trim().to_string(),
            output_dir: base.join(SINGLE_PLAYLIST_DIR),
        })]),
        PlaylistSource::Manifest(path) => {
            let entries = load_manifest(path)?;
            info!("Loaded {} playlists from {}", entries.len(), path.display());
            Ok(entries
                .into_iter()
                .enumerate()
                .map(|(index, entry)| entry.into_job(index, base))
                .collect())
        }
    }
}

/// Create `path` and its parents if needed.
pub fn ensure_dir(path: &Path) -> std::result::Result<(), FileSystemError> {
    fs::create_dir_all(path).map_err(|e| FileSystemError::CreateDirFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    info!("Folder created or already exists: {}", path.display());
    Ok(())
}

/// How one playlist ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaylistOutcome {
    /// The orchestrator ran; item-level failures are inside the report.
    Downloaded(DownloadReport),
    /// The playlist could not be processed.
    Failed(String),
}

/// Result for one playlist of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistReport {
    /// Playlist title (or [`SINGLE_PLAYLIST_DIR`]).
    pub title: String,
    /// Playlist URL, empty for an invalid manifest entry.
    pub url: String,
    /// Output directory, if one was resolved.
    pub output_dir: Option<PathBuf>,
    /// What happened.
    pub outcome: PlaylistOutcome,
}

impl PlaylistReport {
    /// Download report, if the playlist reached the orchestrator.
    #[must_use]
    pub const fn download(&self) -> Option<&DownloadReport> {
        match &self.outcome {
            PlaylistOutcome::Downloaded(report) => Some(report),
            PlaylistOutcome::Failed(_) => None,
        }
    }
}

/// Result of a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One entry per playlist attempted, in order.
    pub playlists: Vec<PlaylistReport>,
    /// Cancellation stopped the batch.
    pub interrupted: bool,
    /// [`BatchPolicy::Abort`] stopped the batch after a failure.
    pub aborted: bool,
}

impl BatchReport {
    /// Every failed item across all playlists, as `"title: message"`.
    pub fn item_errors(&self) -> impl Iterator<Item = &str> {
        self.playlists
            .iter()
            .filter_map(PlaylistReport::download)
            .flat_map(|r| r.errors.iter().map(String::as_str))
    }

    /// Playlists that could not be processed, with the reason.
    pub fn playlist_failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.playlists.iter().filter_map(|p| match &p.outcome {
            PlaylistOutcome::Failed(reason) => Some((p.title.as_str(), reason.as_str())),
            PlaylistOutcome::Downloaded(_) => None,
        })
    }

    /// Number of items downloaded across all playlists.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.playlists
            .iter()
            .filter_map(PlaylistReport::download)
            .map(|r| r.completed.len())
            .sum()
    }
}

/// Runs a batch of playlists sequentially.
pub struct BatchDriver {
    provider: Arc<dyn Provider>,
    orchestrator: DownloadOrchestrator,
    policy: BatchPolicy,
    cancel: CancellationToken,
}

impl BatchDriver {
    /// Create a driver. `cancel` should be the token the orchestrator uses.
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        orchestrator: DownloadOrchestrator,
        policy: BatchPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            orchestrator,
            policy,
            cancel,
        }
    }

    /// Download every playlist of `source` under `base`.
    ///
    /// Fails only when the manifest itself cannot be read; everything else
    /// ends up in the [`BatchReport`].
    pub async fn run(
        &self,
        source: &PlaylistSource,
        base: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchReport> {
        let jobs = resolve_jobs(source, base)?;
        let mut report = BatchReport::default();

        for job in jobs {
            if self.cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let playlist = match job {
                Ok(job) => self.run_playlist(job, reporter).await,
                Err(e) => {
                    warn!("Skipping manifest entry: {}", e);
                    let title = match &e {
                        RetrievalError::InvalidManifestEntry { index, .. } => {
                            format!("entry #{index}")
                        }
                        _ => "manifest entry".to_string(),
                    };
                    reporter.playlist_failed(&title, &e.to_string());
                    PlaylistReport {
                        title,
                        url: String::new(),
                        output_dir: None,
                        outcome: PlaylistOutcome::Failed(e.to_string()),
                    }
                }
            };

            let failed = matches!(playlist.outcome, PlaylistOutcome::Failed(_));
            let interrupted = playlist.download().is_some_and(|r| r.interrupted);
            report.playlists.push(playlist);

            if interrupted || self.cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            if failed && self.policy == BatchPolicy::Abort {
                error!("Stopping batch after failed playlist");
                report.aborted = true;
                break;
            }
        }

        Ok(report)
    }

    async fn run_playlist(
        &self,
        job: PlaylistJob,
        reporter: &dyn ProgressReporter,
    ) -> PlaylistReport {
        let outcome = match self.download_playlist(&job, reporter).await {
            Ok(download) => {
                reporter.playlist_finished(&job.title, &download);
                PlaylistOutcome::Downloaded(download)
            }
            Err(e) => {
                error!("Playlist '{}' failed: {}", job.title, e);
                reporter.playlist_failed(&job.title, &e.to_string());
                PlaylistOutcome::Failed(e.to_string())
            }
        };

        PlaylistReport {
            title: job.title,
            url: job.url,
            output_dir: Some(job.output_dir),
            outcome,
        }
    }

    async fn download_playlist(
        &self,
        job: &PlaylistJob,
        reporter: &dyn ProgressReporter,
    ) -> Result<DownloadReport> {
        ensure_dir(&job.output_dir)?;

        info!("Fetching playlist: {}", job.url);
        let items = self.list_items(&job.url).await?;
        info!("Found {} videos in the playlist '{}'", items.len(), job.title);

        reporter.playlist_started(&job.title, items.len());
        self.orchestrator
            .run(items, Arc::clone(&self.provider), &job.output_dir, reporter)
            .await
    }

    async fn list_items(&self, url: &str) -> Result<Vec<Item>> {
        let provider = Arc::clone(&self.provider);
        let url = url.to_string();
        let listing = tokio::task::spawn_blocking(move || provider.list_items(&url));

        tokio::select! {
            () = self.cancel.cancelled() => {
                Err(Error::Retrieval(RetrievalError::TaskFailed(
                    "cancelled while listing playlist".to_string(),
                )))
            }
            joined = listing => {
                let items = joined.map_err(|e| RetrievalError::TaskFailed(e.to_string()))??;
                Ok(items)
            }
        }
    }
}

impl std::fmt::Debug for BatchDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDriver")
            .field("provider", &self.provider.name())
            .field("orchestrator", &self.orchestrator)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
