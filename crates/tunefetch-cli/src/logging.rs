//! Structured logging using tracing.
//!
//! Console output is human-readable and quiet by default so that it does not
//! fight with the progress spinner; `-v` raises it. A JSON log file with
//! daily rotation records everything at debug level.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are shown, besides warnings from everything else.
const OWN_TARGETS: [&str; 2] = ["tunefetch", "tunefetch_core"];

/// Where and how much the CLI logs.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory holding the rolling log files.
    pub log_directory: PathBuf,
    /// Log file name prefix (e.g., "tunefetch" -> "tunefetch.2024-01-15").
    pub log_file_prefix: String,
    /// Maximum level of our own events on the console.
    pub console_level: Level,
    /// Maximum level written to the log file.
    pub file_level: Level,
    /// Whether to write a log file at all.
    pub file_logging: bool,
    /// Colorize console output.
    pub console_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_file_prefix: "tunefetch".to_string(),
            console_level: Level::WARN,
            file_level: Level::DEBUG,
            file_logging: true,
            console_ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Configuration for a CLI run with `verbosity` `-v` flags.
    #[must_use]
    pub fn for_verbosity(verbosity: u8) -> Self {
        let console_level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            console_level,
            ..Self::default()
        }
    }

    /// Disable the log file.
    #[must_use]
    pub const fn without_file(mut self) -> Self {
        self.file_logging = false;
        self
    }

    /// Write log files under `path`.
    #[must_use]
    pub fn with_log_directory(mut self, path: PathBuf) -> Self {
        self.log_directory = path;
        self
    }
}

/// Keeps the background log writer alive; dropping it flushes the file.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install the global subscriber.
///
/// Hold the returned guard until the program exits.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let (file_writer, file_guard) = if config.file_logging {
        let dir = &config.log_directory;
        std::fs::create_dir_all(dir).map_err(|e| LoggingError::DirectoryCreationFailed {
            path: dir.clone(),
            reason: e.to_string(),
        })?;
        let (writer, guard) = tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::DAILY,
            dir,
            &config.log_file_prefix,
        ));
        (Some(writer), Some(guard))
    } else {
        (None, None)
    };

    // RUST_LOG overrides the console filter.
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter_for(Level::WARN, config.console_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.console_ansi)
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .json()
            .with_filter(filter_for(Level::INFO, config.file_level))
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Filter showing `others` for dependencies and `own` for our crates.
fn filter_for(others: Level, own: Level) -> EnvFilter {
    let own = own.as_str().to_ascii_lowercase();
    let mut directives = vec![others.as_str().to_ascii_lowercase()];
    directives.extend(OWN_TARGETS.iter().map(|target| format!("{target}={own}")));
    EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// `<data dir>/tunefetch/logs`, or `./tunefetch/logs` without a data dir.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("tunefetch").join("logs")
}

/// Why logging could not be set up.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("Cannot create log directory {path}: {reason}")]
    DirectoryCreationFailed {
        /// Requested directory.
        path: PathBuf,
        /// Underlying I/O error.
        reason: String,
    },

    /// A global subscriber was already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(LoggingConfig::for_verbosity(0).console_level, Level::WARN);
        assert_eq!(LoggingConfig::for_verbosity(1).console_level, Level::INFO);
        assert_eq!(LoggingConfig::for_verbosity(2).console_level, Level::DEBUG);
        assert_eq!(LoggingConfig::for_verbosity(9).console_level, Level::TRACE);
    }

    #[test]
    fn test_without_file() {
        let config = LoggingConfig::default().without_file();
        assert!(!config.file_logging);
        assert_eq!(config.file_level, Level::DEBUG);
    }

    #[test]
    fn test_filter_directives() {
        let filter = filter_for(Level::WARN, Level::DEBUG).to_string();
        assert!(filter.contains("tunefetch=debug"));
        assert!(filter.contains("tunefetch_core=debug"));
    }

    #[test]
    fn test_default_log_directory() {
        let dir = default_log_directory();
        assert!(dir.to_string_lossy().contains("tunefetch"));
        assert!(dir.ends_with("logs"));
    }

    #[test]
    fn test_unwritable_log_directory_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let config = LoggingConfig::default().with_log_directory(blocker.join("logs"));
        let Err(err) = init(&config) else {
            panic!("expected directory creation to fail");
        };
        assert!(matches!(err, LoggingError::DirectoryCreationFailed { .. }));
    }
}
