//! Provider abstraction: playlist enumeration and single-item fetch.
//!
//! A provider wraps an external media-extraction tool. The download core only
//! ever sees two calls, [`Provider::list_items`] and [`Provider::fetch_item`];
//! format selection, transcoding, tagging and cookies are the provider's
//! business.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FetchError, RetrievalError};

/// Title used when the provider does not supply one.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Extension of every downloaded file.
pub const AUDIO_EXTENSION: &str = "mp3";

/// Maximum length, in bytes, of a sanitized file stem.
const MAX_STEM_LEN: usize = 200;

/// One downloadable playlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Display title, also the basis of the output file name.
    pub title: String,
    /// Primary URL, or the webpage URL when no direct URL exists.
    pub source_url: String,
}

impl Item {
    /// Create an item, substituting [`UNKNOWN_TITLE`] for a blank title.
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Self {
        let title = title.into();
        let title = if title.trim().is_empty() {
            UNKNOWN_TITLE.to_string()
        } else {
            title
        };
        Self {
            title,
            source_url: source_url.into(),
        }
    }

    /// Sanitized file stem for this item.
    #[must_use]
    pub fn file_stem(&self) -> String {
        let stem = sanitize_filename(&self.title);
        if stem.is_empty() {
            UNKNOWN_TITLE.to_string()
        } else {
            stem
        }
    }

    /// Expected output file for this item inside `output_dir`.
    #[must_use]
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.{AUDIO_EXTENSION}", self.file_stem()))
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.title, self.source_url)
    }
}

/// Sanitize a string for use as a filename.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

    let sanitized: String = name
        .chars()
        .map(|c| if invalid_chars.contains(&c) { '_' } else { c })
        .collect();

    let trimmed = sanitized.trim().trim_matches('.');

    if trimmed.len() > MAX_STEM_LEN {
        let mut end = MAX_STEM_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        trimmed[..end].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Source of playlists and downloadable items.
///
/// Both calls block; the core runs them on worker threads or the blocking
/// pool, never on the async reactor.
#[cfg_attr(test, mockall::automock)]
pub trait Provider: Send + Sync {
    /// Registry name of this provider (e.g. "youtube").
    fn name(&self) -> &'static str;

    /// Enumerate the items of a playlist.
    fn list_items(&self, playlist_url: &str) -> Result<Vec<Item>, RetrievalError>;

    /// Download one item as `<output_dir>/<file stem>.mp3`.
    fn fetch_item(&self, item: &Item, output_dir: &Path) -> Result<(), FetchError>;
}

/// Constructor stored in the registry.
pub type ProviderFactory = Box<dyn Fn() -> Arc<dyn Provider> + Send + Sync>;

/// Name-indexed set of provider constructors.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name` (case-insensitive).
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.to_lowercase(), Box::new(factory));
    }

    /// Registered provider names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate the provider registered under `name`.
    pub fn create(&self, name: &str) -> Result<Arc<dyn Provider>, ConfigError> {
        self.factories
            .get(&name.to_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownProvider {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
