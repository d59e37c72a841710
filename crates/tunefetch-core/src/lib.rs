//! Tunefetch Core Library
//!
//! This crate provides the core functionality for the Tunefetch downloader:
//! - Playlist enumeration through pluggable providers (`yt-dlp` built in)
//! - Concurrent, resumable audio downloading with a bounded worker pool
//! - Sequential processing of playlist batches from a manifest
//! - Archiving, blob upload and cleanup of finished playlists

pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod provider;
pub mod queue;
pub mod upload;
pub mod worker;
pub mod ytdlp;

pub use batch::{BatchDriver, BatchPolicy, BatchReport, PlaylistSource};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use orchestrator::{DownloadOrchestrator, DownloadReport, OrchestratorConfig, ProgressReporter};
pub use provider::{Item, Provider, ProviderRegistry};
pub use ytdlp::{YtDlpProvider, default_registry};
