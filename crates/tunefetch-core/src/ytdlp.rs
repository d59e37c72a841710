//! `YouTube` provider backed by the `yt-dlp` executable.
//!
//! Enumeration uses `--flat-playlist --dump-single-json` so that no media is
//! touched; each fetch is a separate `yt-dlp` process that extracts audio to
//! mp3 and embeds metadata and cover art. Both calls block the calling thread.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FetchError, RetrievalError};
use crate::provider::{AUDIO_EXTENSION, Item, Provider, ProviderRegistry};

/// Registry name of this provider.
pub const PROVIDER_NAME: &str = "youtube";

/// Default executable looked up on `PATH`.
pub const DEFAULT_BINARY: &str = "yt-dlp";

static ERROR_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^ERROR:\s*(.+?)\s*$").ok());

/// Settings passed through to `yt-dlp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YtDlpConfig {
    /// Executable name or path.
    pub binary: String,
    /// Value for `--audio-quality` (`0`-`10` VBR or a bitrate like `320K`).
    pub audio_quality: String,
    /// Embed the video thumbnail as cover art.
    pub embed_thumbnail: bool,
    /// Embed title/artist metadata.
    pub add_metadata: bool,
    /// Browser to borrow cookies from, if any.
    pub cookies_from_browser: Option<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            audio_quality: "320K".to_string(),
            embed_thumbnail: true,
            add_metadata: true,
            cookies_from_browser: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    entries: Option<Vec<Option<FlatEntry>>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
}

impl FlatEntry {
    fn into_item(self) -> Option<Item> {
        let source_url = self
            .url
            .filter(|u| !u.trim().is_empty())
            .or(self.webpage_url)
            .filter(|u| !u.trim().is_empty())
            .or_else(|| {
                self.id
                    .map(|id| format!("https://www.youtube.com/watch?v={id}"))
            })?;
        Some(Item::new(self.title.unwrap_or_default(), source_url))
    }
}

/// Parse the output of `yt-dlp --flat-playlist --dump-single-json`.
///
/// Entries yt-dlp could not extract (`null`) and entries that carry neither a
/// URL nor an id are dropped.
pub fn parse_flat_playlist(url: &str, json: &str) -> Result<Vec<Item>, RetrievalError> {
    let playlist: FlatPlaylist =
        serde_json::from_str(json).map_err(|e| RetrievalError::MalformedResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let entries = playlist.entries.ok_or_else(|| RetrievalError::NoEntries {
        url: url.to_string(),
    })?;

    let total = entries.len();
    let items: Vec<Item> = entries
        .into_iter()
        .flatten()
        .filter_map(FlatEntry::into_item)
        .collect();
    if items.len() < total {
        debug!("Dropped {} unusable entries from {}", total - items.len(), url);
    }
    Ok(items)
}

/// Last `ERROR:` line of `yt-dlp` stderr, or its last non-empty line.
fn summarize_stderr(stderr: &str) -> String {
    let from_error = ERROR_LINE.as_ref().and_then(|re| {
        re.captures_iter(stderr)
            .last()
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    });

    from_error
        .or_else(|| {
            stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "no output".to_string())
}

/// Output template for an item; `%` is escaped so titles are taken literally.
fn output_template(item: &Item, output_dir: &Path) -> PathBuf {
    let stem = item.file_stem().replace('%', "%%");
    output_dir.join(format!("{stem}.%(ext)s"))
}

fn is_http_url(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Provider that shells out to `yt-dlp`.
#[derive(Debug, Clone, Default)]
pub struct YtDlpProvider {
    config: YtDlpConfig,
}

impl YtDlpProvider {
    /// Create a provider with the given settings.
    #[must_use]
    pub const fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &YtDlpConfig {
        &self.config
    }

    fn locate(&self) -> Result<PathBuf, String> {
        which::which(&self.config.binary).map_err(|e| e.to_string())
    }

    /// Arguments for playlist enumeration.
    #[must_use]
    pub fn list_args(&self, playlist_url: &str) -> Vec<OsString> {
        const FLAGS: [&str; 4] = [
            "--flat-playlist",
            "--dump-single-json",
            "--quiet",
            "--no-warnings",
        ];
        let mut args: Vec<OsString> = FLAGS.into_iter().map(OsString::from).collect();
        self.push_cookie_args(&mut args);
        args.push(playlist_url.into());
        args
    }

    /// Arguments for downloading one item into `output_dir`.
    #[must_use]
    pub fn fetch_args(&self, item: &Item, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            "bestaudio/best".into(),
            "-x".into(),
            "--audio-format".into(),
            AUDIO_EXTENSION.into(),
            "--audio-quality".into(),
            self.config.audio_quality.as_str().into(),
        ];
        if self.config.add_metadata {
            args.push("--embed-metadata".into());
        }
        if self.config.embed_thumbnail {
            args.push("--embed-thumbnail".into());
        }
        self.push_cookie_args(&mut args);
        args.extend([
            "--force-overwrites".into(),
            "--no-playlist".into(),
            "--quiet".into(),
            "--no-warnings".into(),
            "-o".into(),
            output_template(item, output_dir).into_os_string(),
            item.source_url.as_str().into(),
        ]);
        args
    }

    fn push_cookie_args(&self, args: &mut Vec<OsString>) {
        if let Some(browser) = &self.config.cookies_from_browser {
            args.push("--cookies-from-browser".into());
            args.push(browser.as_str().into());
        }
    }

    fn execute(binary: &Path, args: &[OsString]) -> std::io::Result<Output> {
        Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
    }
}

impl Provider for YtDlpProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn list_items(&self, playlist_url: &str) -> Result<Vec<Item>, RetrievalError> {
        if !is_http_url(playlist_url) {
            return Err(RetrievalError::InvalidUrl {
                url: playlist_url.to_string(),
            });
        }

        let binary = self
            .locate()
            .map_err(|reason| RetrievalError::ToolUnavailable {
                tool: self.config.binary.clone(),
                reason,
            })?;

        info!("Fetching playlist entries: {}", playlist_url);
        let output = Self::execute(&binary, &self.list_args(playlist_url)).map_err(|e| {
            RetrievalError::ToolUnavailable {
                tool: self.config.binary.clone(),
                reason: e.to_string(),
            }
        })?;

        if !output.status.success() {
            return Err(RetrievalError::Failed {
                url: playlist_url.to_string(),
                reason: summarize_stderr(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        let items = parse_flat_playlist(playlist_url, &String::from_utf8_lossy(&output.stdout))?;
        info!("Found {} items in {}", items.len(), playlist_url);
        Ok(items)
    }

    fn fetch_item(&self, item: &Item, output_dir: &Path) -> Result<(), FetchError> {
        if item.source_url.trim().is_empty() {
            return Err(FetchError::MissingSource);
        }

        let binary = self.locate().map_err(|reason| FetchError::ToolUnavailable {
            tool: self.config.binary.clone(),
            reason,
        })?;

        let output = Self::execute(&binary, &self.fetch_args(item, output_dir)).map_err(|e| {
            FetchError::ToolUnavailable {
                tool: self.config.binary.clone(),
                reason: e.to_string(),
            }
        })?;

        if !output.status.success() {
            return Err(FetchError::ProcessFailed {
                tool: self.config.binary.clone(),
                status: output.status.to_string(),
                stderr: summarize_stderr(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        let expected = item.output_path(output_dir);
        if !expected.exists() {
            return Err(FetchError::other(format!(
                "{} reported success but {} was not created",
                self.config.binary,
                expected.display()
            )));
        }
        Ok(())
    }
}

/// Registry holding every built-in provider.
#[must_use]
pub fn default_registry(config: &YtDlpConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    let config = config.clone();
    registry.register(PROVIDER_NAME, move || {
        Arc::new(YtDlpProvider::new(config.clone()))
    });
    registry
}
