//! Integration tests for the playlist batch driver.

#![allow(clippy::unwrap_used)]

mod common;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tunefetch_core::batch::{
    BatchDriver, BatchPolicy, PlaylistOutcome, PlaylistSource, SINGLE_PLAYLIST_DIR,
};
use tunefetch_core::orchestrator::{
    DownloadOrchestrator, DownloadReport, NoopReporter, OrchestratorConfig, ProgressReporter,
};

use common::{CountingProvider, items};

fn driver(
    provider: Arc<CountingProvider>,
    policy: BatchPolicy,
    cancel: CancellationToken,
) -> BatchDriver {
    let orchestrator = DownloadOrchestrator::new(
        OrchestratorConfig {
            cpu_count: Some(2),
            poll_interval: Duration::from_millis(10),
            grace_period: Duration::from_millis(100),
            ..OrchestratorConfig::default()
        },
        cancel.clone(),
    );
    BatchDriver::new(provider, orchestrator, policy, cancel)
}

fn write_manifest(dir: &Path, json: &str) -> PlaylistSource {
    let path = dir.join("playlists.json");
    std::fs::write(&path, json).unwrap();
    PlaylistSource::Manifest(path)
}

const THREE_PLAYLISTS: &str = r#"[
    {"title": "Chill", "url": "https://example.com/chill"},
    {"title": "Broken", "url": "https://example.com/broken"},
    {"title": "Rock", "url": "https://example.com/rock"}
]"#;

fn three_playlist_provider() -> CountingProvider {
    CountingProvider::new()
        .with_playlist("https://example.com/chill", items(&["A", "B"]))
        .with_broken_playlist("https://example.com/broken")
        .with_playlist("https://example.com/rock", items(&["C"]))
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl ProgressReporter for EventLog {
    fn playlist_started(&self, title: &str, total_items: usize) {
        self.events.lock().unwrap().push(format!("start {title} {total_items}"));
    }

    fn playlist_finished(&self, title: &str, report: &DownloadReport) {
        self.events
            .lock()
            .unwrap()
            .push(format!("finish {title} {}", report.completed.len()));
    }

    fn playlist_failed(&self, title: &str, _reason: &str) {
        self.events.lock().unwrap().push(format!("fail {title}"));
    }
}

#[tokio::test]
async fn test_single_url_downloads_into_fixed_directory() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        CountingProvider::new().with_playlist("https://example.com/p", items(&["A", "B"])),
    );

    let report = driver(provider.clone(), BatchPolicy::default(), CancellationToken::new())
        .run(
            &PlaylistSource::Single("https://example.com/p".to_string()),
            dir.path(),
            &NoopReporter,
        )
        .await
        .unwrap();

    let target = dir.path().join(SINGLE_PLAYLIST_DIR);
    assert!(target.join("A.mp3").exists());
    assert!(target.join("B.mp3").exists());
    assert_eq!(report.playlists.len(), 1);
    assert_eq!(report.completed_count(), 2);
}

#[tokio::test]
async fn test_failed_playlist_is_skipped_and_batch_continues() {
    let dir = TempDir::new().unwrap();
    let source = write_manifest(dir.path(), THREE_PLAYLISTS);
    let provider = Arc::new(three_playlist_provider());
    let log = EventLog::default();

    let report = driver(provider.clone(), BatchPolicy::SkipAndContinue, CancellationToken::new())
        .run(&source, &dir.path().join("out"), &log)
        .await
        .unwrap();

    assert_eq!(report.playlists.len(), 3);
    assert!(!report.aborted);
    assert!(matches!(report.playlists[1].outcome, PlaylistOutcome::Failed(_)));
    assert_eq!(report.completed_count(), 3);
    assert!(dir.path().join("out/Chill/A.mp3").exists());
    assert!(dir.path().join("out/Rock/C.mp3").exists());

    let failures: Vec<_> = report.playlist_failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "Broken");
    assert!(failures[0].1.contains("playlist unreachable"));

    assert_eq!(
        *log.events.lock().unwrap(),
        vec!["start Chill 2", "finish Chill 2", "fail Broken", "start Rock 1", "finish Rock 1"]
    );
}

#[tokio::test]
async fn test_abort_policy_stops_at_first_failure() {
    let dir = TempDir::new().unwrap();
    let source = write_manifest(dir.path(), THREE_PLAYLISTS);
    let provider = Arc::new(three_playlist_provider());

    let report = driver(provider.clone(), BatchPolicy::Abort, CancellationToken::new())
        .run(&source, &dir.path().join("out"), &NoopReporter)
        .await
        .unwrap();

    assert!(report.aborted);
    assert_eq!(report.playlists.len(), 2);
    assert_eq!(provider.fetch_count("C"), 0);
    assert!(!dir.path().join("out/Rock").exists());
}

#[tokio::test]
async fn test_invalid_manifest_entry_fails_only_itself() {
    let dir = TempDir::new().unwrap();
    let source = write_manifest(
        dir.path(),
        r#"{"playlists": [
            {"title": "No URL"},
            {"title": "Rock", "url": "https://example.com/rock"}
        ]}"#,
    );
    let provider = Arc::new(three_playlist_provider());

    let report = driver(provider.clone(), BatchPolicy::SkipAndContinue, CancellationToken::new())
        .run(&source, dir.path(), &NoopReporter)
        .await
        .unwrap();

    assert_eq!(report.playlists.len(), 2);
    assert!(report.playlists[0].download().is_none());
    assert_eq!(report.completed_count(), 1);
}

#[tokio::test]
async fn test_malformed_manifest_fails_the_batch() {
    let dir = TempDir::new().unwrap();
    let source = write_manifest(dir.path(), r#"{"title": "not a list"}"#);
    let provider = Arc::new(three_playlist_provider());

    let result = driver(provider.clone(), BatchPolicy::SkipAndContinue, CancellationToken::new())
        .run(&source, dir.path(), &NoopReporter)
        .await;

    assert!(result.is_err());
    assert_eq!(provider.total_fetches(), 0);
}

#[tokio::test]
async fn test_item_errors_are_aggregated_across_playlists() {
    let dir = TempDir::new().unwrap();
    let source = write_manifest(dir.path(), THREE_PLAYLISTS);
    let provider = Arc::new(three_playlist_provider().failing("B", "network timeout"));

    let report = driver(provider.clone(), BatchPolicy::SkipAndContinue, CancellationToken::new())
        .run(&source, dir.path(), &NoopReporter)
        .await
        .unwrap();

    assert_eq!(report.item_errors().collect::<Vec<_>>(), vec!["B: network timeout"]);
}

#[tokio::test]
async fn test_cancelled_batch_processes_nothing() {
    let dir = TempDir::new().unwrap();
    let source = write_manifest(dir.path(), THREE_PLAYLISTS);
    let provider = Arc::new(three_playlist_provider());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = driver(provider.clone(), BatchPolicy::SkipAndContinue, cancel)
        .run(&source, dir.path(), &NoopReporter)
        .await
        .unwrap();

    assert!(report.interrupted);
    assert!(report.playlists.is_empty());
    assert_eq!(provider.total_fetches(), 0);
}
