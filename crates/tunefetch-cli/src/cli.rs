//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, ArgGroup, Parser};
use tunefetch_core::batch::{BatchPolicy, PlaylistSource};
use tunefetch_core::config::AppConfig;
use tunefetch_core::error::ConfigError;

/// Download playlists as MP3 files, then optionally archive and upload them.
#[derive(Debug, Parser)]
#[command(name = "tunefetch", author, version, long_about = None)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["playlist_url", "manifest"]),
))]
pub struct Cli {
    /// Sound provider to use (e.g. youtube)
    #[arg(long, env = "TUNEFETCH_PROVIDER")]
    pub provider: String,

    /// URL of a single playlist to download
    #[arg(long, value_name = "URL")]
    pub playlist_url: Option<String>,

    /// JSON manifest listing playlists as {"title", "url"} entries
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Base folder for downloaded playlists [default: output]
    #[arg(long, value_name = "DIR")]
    pub output_folder: Option<PathBuf>,

    /// Maximum number of parallel downloads (capped by CPU count)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Stop the whole batch when a playlist cannot be processed
    #[arg(long)]
    pub strict: bool,

    /// Zip each downloaded playlist folder
    #[arg(long)]
    pub archive: bool,

    /// Upload each archive to Azure Blob Storage (implies --archive)
    #[arg(long)]
    pub upload: bool,

    /// Delete the archive and playlist folder after a successful upload
    #[arg(long, requires = "upload")]
    pub cleanup: bool,

    /// Configuration file [default: <config dir>/tunefetch/config.json]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for log files [default: <data dir>/tunefetch/logs]
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Do not write a log file
    #[arg(long, conflicts_with = "log_dir")]
    pub no_log_file: bool,

    /// Increase console log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Where the playlists come from.
    pub fn source(&self) -> Result<PlaylistSource, ConfigError> {
        match (&self.playlist_url, &self.manifest) {
            (Some(url), None) if !url.trim().is_empty() => Ok(PlaylistSource::Single(url.clone())),
            (Some(_), None) => Err(ConfigError::MissingArgument(
                "--playlist-url must not be empty".to_string(),
            )),
            (None, Some(path)) => Ok(PlaylistSource::Manifest(path.clone())),
            (Some(_), Some(_)) => Err(ConfigError::Conflict(
                "--playlist-url and --manifest cannot be used together".to_string(),
            )),
            (None, None) => Err(ConfigError::MissingArgument(
                "one of --playlist-url or --manifest".to_string(),
            )),
        }
    }

    /// Whether archives should be produced.
    pub const fn wants_archive(&self) -> bool {
        self.archive || self.upload
    }

    /// Override configuration values with the flags that were given.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(folder) = &self.output_folder {
            config.output_folder.clone_from(folder);
        }
        if let Some(workers) = self.workers {
            config.download.max_workers = workers;
        }
        if self.strict {
            config.batch_policy = BatchPolicy::Abort;
        }
    }
}
