//! Folder archiving and local cleanup.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::{ArchiveError, FileSystemError};

/// Compress every file under `folder` into the zip archive `output_zip`.
///
/// Entry names are relative to `folder` and use `/` separators. The archive
/// is overwritten if it exists. Returns the archive path.
pub fn compress_folder(folder: &Path, output_zip: &Path) -> Result<PathBuf, ArchiveError> {
    if !folder.is_dir() {
        return Err(ArchiveError::SourceNotFound {
            path: folder.to_path_buf(),
        });
    }

    let write_failed = |reason: String| ArchiveError::WriteFailed {
        path: output_zip.to_path_buf(),
        reason,
    };

    let file = File::create(output_zip).map_err(|e| write_failed(e.to_string()))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut count = 0usize;
    for entry in WalkDir::new(folder).sort_by_file_name() {
        let entry = entry.map_err(|e| write_failed(e.to_string()))?;
        if !entry.file_type().is_file() || entry.path() == output_zip {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(folder) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        debug!("Adding {} to archive", name);
        writer
            .start_file(name, options)
            .map_err(|e| write_failed(e.to_string()))?;
        let mut source = File::open(entry.path()).map_err(|e| write_failed(e.to_string()))?;
        io::copy(&mut source, &mut writer).map_err(|e| write_failed(e.to_string()))?;
        count += 1;
    }

    writer.finish().map_err(|e| write_failed(e.to_string()))?;
    info!(
        "Folder {} compressed to {} ({} files)",
        folder.display(),
        output_zip.display(),
        count
    );
    Ok(output_zip.to_path_buf())
}

/// Default archive path for a playlist directory: `<dir>.zip` beside it.
#[must_use]
pub fn archive_path_for(folder: &Path) -> PathBuf {
    let mut name = folder
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_else(|| "archive".into());
    name.push(".zip");
    folder.with_file_name(name)
}

/// Delete each path that exists. Directories are removed recursively.
///
/// Stops at the first path that cannot be deleted.
pub fn cleanup<P: AsRef<Path>>(paths: &[P]) -> Result<(), FileSystemError> {
    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            continue;
        }

        let removed = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        removed.map_err(|e| FileSystemError::DeleteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Deleted local file: {}", path.display());
    }
    Ok(())
}
