//! Instrumented provider shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tunefetch_core::error::{FetchError, RetrievalError};
use tunefetch_core::provider::{Item, Provider};

/// Provider that counts fetches and writes a placeholder file per item.
#[derive(Default)]
pub struct CountingProvider {
    fetches: Mutex<HashMap<String, usize>>,
    threads: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    failures: HashMap<String, String>,
    playlists: HashMap<String, Vec<Item>>,
    broken_playlists: HashSet<String>,
    delay: Option<Duration>,
}

impl CountingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make fetching `title` fail with `message`.
    pub fn failing(mut self, title: &str, message: &str) -> Self {
        self.failures.insert(title.to_string(), message.to_string());
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve `items` for `url`.
    pub fn with_playlist(mut self, url: &str, items: Vec<Item>) -> Self {
        self.playlists.insert(url.to_string(), items);
        self
    }

    /// Fail enumeration of `url`.
    pub fn with_broken_playlist(mut self, url: &str) -> Self {
        self.broken_playlists.insert(url.to_string());
        self
    }

    pub fn fetch_count(&self, title: &str) -> usize {
        self.fetches.lock().unwrap().get(title).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }

    pub fn fetch_counts(&self) -> HashMap<String, usize> {
        self.fetches.lock().unwrap().clone()
    }

    /// Most fetches that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Names of the threads that performed fetches.
    pub fn thread_names(&self) -> HashSet<String> {
        self.threads.lock().unwrap().clone()
    }
}

impl Provider for CountingProvider {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn list_items(&self, playlist_url: &str) -> Result<Vec<Item>, RetrievalError> {
        if self.broken_playlists.contains(playlist_url) {
            return Err(RetrievalError::Failed {
                url: playlist_url.to_string(),
                reason: "playlist unreachable".to_string(),
            });
        }
        self.playlists
            .get(playlist_url)
            .cloned()
            .ok_or_else(|| RetrievalError::NoEntries {
                url: playlist_url.to_string(),
            })
    }

    fn fetch_item(&self, item: &Item, output_dir: &Path) -> Result<(), FetchError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(item.title.clone())
            .or_insert(0) += 1;
        if let Some(name) = std::thread::current().name() {
            self.threads.lock().unwrap().insert(name.to_string());
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = self.failures.get(&item.title) {
            return Err(FetchError::other(message.clone()));
        }

        // The output directory may be gone if the test already finished.
        let _ = std::fs::write(item.output_path(output_dir), b"ID3");
        Ok(())
    }
}

pub fn items(titles: &[&str]) -> Vec<Item> {
    titles
        .iter()
        .enumerate()
        .map(|(n, title)| Item::new(*title, format!("u{}", n + 1)))
        .collect()
}
