//! Error types for Tunefetch core operations.
//!
//! Each concern owns a typed error enum; [`Error`] wraps them so that callers
//! crossing concerns (the batch driver, the CLI) can use a single `Result`.
//!
//! The split mirrors how failures propagate:
//! - [`RetrievalError`] aborts one playlist, never the batch.
//! - [`FetchError`] is caught at the worker boundary and recorded as text.
//! - [`ConfigError`] stops the run before any work starts.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Tunefetch core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Playlist enumeration failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Invalid invocation or configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// File system operation failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// Archive creation failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Blob upload failed.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Playlist-level enumeration errors.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The URL is not something the provider can enumerate.
    #[error("Invalid playlist URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// The extraction tool could not be located or started.
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable {
        /// Executable name.
        tool: String,
        /// Why it is unavailable.
        reason: String,
    },

    /// The extraction tool ran but reported a failure.
    #[error("Failed to retrieve playlist {url}: {reason}")]
    Failed {
        /// Playlist URL.
        url: String,
        /// Tool output or reason.
        reason: String,
    },

    /// The extraction tool produced output we could not parse.
    #[error("Malformed playlist data for {url}: {reason}")]
    MalformedResponse {
        /// Playlist URL.
        url: String,
        /// Parse failure.
        reason: String,
    },

    /// The response carried no entry list.
    #[error("Unable to retrieve playlist videos: {url}")]
    NoEntries {
        /// Playlist URL.
        url: String,
    },

    /// The manifest file could not be read.
    #[error("Cannot read manifest {path}: {reason}")]
    ManifestUnreadable {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },

    /// The manifest file is not a valid playlist list.
    #[error("Malformed manifest {path}: {reason}")]
    ManifestMalformed {
        /// Manifest path.
        path: PathBuf,
        /// Parse failure.
        reason: String,
    },

    /// A manifest entry is missing required data.
    #[error("Invalid manifest entry #{index}: {reason}")]
    InvalidManifestEntry {
        /// Zero-based entry position.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// The blocking enumeration task did not complete.
    #[error("Playlist enumeration task failed: {0}")]
    TaskFailed(String),
}

/// Per-item fetch errors.
///
/// The `Display` output is what ends up after `"{title}: "` in the final
/// error report, so messages are kept short and self-contained.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The download tool could not be located or started.
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable {
        /// Executable name.
        tool: String,
        /// Why it is unavailable.
        reason: String,
    },

    /// The download tool exited unsuccessfully.
    #[error("{tool} exited with {status}: {stderr}")]
    ProcessFailed {
        /// Executable name.
        tool: String,
        /// Exit status description.
        status: String,
        /// Last meaningful stderr line.
        stderr: String,
    },

    /// The item has no usable source URL.
    #[error("missing source URL")]
    MissingSource,

    /// Provider-specific failure message.
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Build a free-form fetch error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Invalid invocation or configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No provider registered under that name.
    #[error("Provider '{name}' not found. Available providers: {available}")]
    UnknownProvider {
        /// Requested name.
        name: String,
        /// Comma-separated registered names.
        available: String,
    },

    /// A required argument is missing.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Arguments that cannot be combined were given.
    #[error("Conflicting arguments: {0}")]
    Conflict(String),

    /// A configuration value is out of range or malformed.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The configuration file could not be read or parsed.
    #[error("Failed to load configuration from {path}: {reason}")]
    Load {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },
}

/// File system errors.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Directory could not be created.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },

    /// File could not be deleted.
    #[error("Failed to delete {path}: {reason}")]
    DeleteFailed {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },
}

/// Archive creation errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The folder to compress does not exist.
    #[error("Folder not found: {path}")]
    SourceNotFound {
        /// Folder path.
        path: PathBuf,
    },

    /// Writing the archive failed.
    #[error("Failed to write archive {path}: {reason}")]
    WriteFailed {
        /// Archive path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },
}

/// Blob upload errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The file to upload could not be read.
    #[error("Cannot read {path} for upload: {reason}")]
    Unreadable {
        /// Local file path.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },

    /// The HTTP request itself failed.
    #[error("Upload request failed: {0}")]
    Request(String),

    /// The storage service rejected the request.
    #[error("Storage service rejected {operation} with status {status}: {body}")]
    Rejected {
        /// What was attempted (e.g. "blob upload").
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        body: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_other_display_is_bare_message() {
        let err = FetchError::other("network timeout");
        assert_eq!(err.to_string(), "network timeout");
    }

    #[test]
    fn test_unknown_provider_display() {
        let err = ConfigError::UnknownProvider {
            name: "spotify".to_string(),
            available: "youtube".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Provider 'spotify' not found. Available providers: youtube"
        );
    }

    #[test]
    fn test_file_system_error_display() {
        let err = FileSystemError::CreateDirFailed {
            path: PathBuf::from("/test/path"),
            reason: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/test/path"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
