//! Terminal rendering of download progress and the final report.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tunefetch_core::batch::BatchReport;
use tunefetch_core::orchestrator::{DownloadReport, ProgressReporter};

const TICK: Duration = Duration::from_millis(100);
const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg} [{elapsed}]";

/// Spinner while a playlist downloads, one line per finished item.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    /// Create a reporter with no active spinner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Print a line above the spinner, or plainly if none is running.
    pub fn line(&self, message: &str) {
        match self.lock().as_ref() {
            Some(spinner) => spinner.println(message),
            None => println!("{message}"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.spinner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn finish_spinner(&self) {
        if let Some(spinner) = self.lock().take() {
            spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn playlist_started(&self, title: &str, total_items: usize) {
        println!("Found {total_items} videos in the playlist '{title}'.");

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Downloading {title}..."));
        spinner.enable_steady_tick(TICK);

        if let Some(previous) = self.lock().replace(spinner) {
            previous.finish_and_clear();
        }
    }

    fn item_completed(&self, title: &str) {
        self.line(&format!("Completed: {title}"));
    }

    fn item_skipped(&self, title: &str) {
        self.line(&format!("Skipping: {title} (already downloaded)"));
    }

    fn playlist_finished(&self, title: &str, report: &DownloadReport) {
        self.finish_spinner();
        println!("{}", playlist_summary(title, report));
    }

    fn playlist_failed(&self, title: &str, reason: &str) {
        self.finish_spinner();
        println!("Skipping playlist '{title}': {reason}");
    }
}

/// One-line summary of a finished playlist.
pub fn playlist_summary(title: &str, report: &DownloadReport) -> String {
    let mut summary = format!(
        "Playlist '{}': {} downloaded, {} already present, {} failed in {:.1}s",
        title,
        report.completed.len(),
        report.skipped.len(),
        report.errors.len(),
        report.elapsed.as_secs_f64()
    );
    if report.interrupted {
        summary.push_str(" (interrupted)");
    }
    summary
}

/// Lines of the end-of-run report.
pub fn final_report_lines(report: &BatchReport, output_folder: &Path) -> Vec<String> {
    let mut lines = Vec::new();

    if report.interrupted {
        lines.push("Download interrupted by user!".to_string());
    }
    if report.aborted {
        lines.push("Batch stopped after a failed playlist (--strict).".to_string());
    }

    let failures: Vec<_> = report.playlist_failures().collect();
    if !failures.is_empty() {
        lines.push("Playlists that could not be processed:".to_string());
        lines.extend(
            failures
                .iter()
                .map(|(title, reason)| format!("  {title}: {reason}")),
        );
    }

    let errors: Vec<_> = report.item_errors().collect();
    if !errors.is_empty() {
        lines.push("Errors occurred during downloads:".to_string());
        lines.extend(errors.iter().map(|e| format!("  {e}")));
    }

    if !report.interrupted && !report.aborted {
        lines.push(format!(
            "All files have been downloaded to: {}",
            output_folder.display()
        ));
    }
    lines
}
