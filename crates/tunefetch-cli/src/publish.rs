//! Archive, upload and cleanup of downloaded playlists.
//!
//! Runs after the batch, one playlist at a time. Everything here blocks, so
//! callers run it on the blocking pool.

use std::path::PathBuf;

use tracing::{error, info};
use tunefetch_core::archive::{archive_path_for, cleanup, compress_folder};
use tunefetch_core::batch::BatchReport;
use tunefetch_core::error::Error;
use tunefetch_core::upload::{AzureBlobUploader, BlobUploader, UploadConfig};

/// What to do with each finished playlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Zip the playlist folder.
    pub archive: bool,
    /// Upload the zip.
    pub upload: bool,
    /// Delete the zip and the folder once uploaded.
    pub cleanup: bool,
}

impl PublishOptions {
    /// Whether any step is enabled.
    pub const fn any(&self) -> bool {
        self.archive || self.upload
    }
}

/// Result of publishing one playlist.
#[derive(Debug)]
pub struct Published {
    /// Playlist title.
    pub title: String,
    /// Archive written, if any.
    pub archive: Option<PathBuf>,
    /// Public URL of the uploaded archive, if any.
    pub url: Option<String>,
    /// First failure, if publishing stopped early.
    pub error: Option<String>,
}

/// Playlists of `report` that finished downloading, with their folders.
pub fn finished_playlists(report: &BatchReport) -> Vec<(String, PathBuf)> {
    report
        .playlists
        .iter()
        .filter(|p| p.download().is_some_and(|d| !d.interrupted))
        .filter_map(|p| p.output_dir.clone().map(|dir| (p.title.clone(), dir)))
        .collect()
}

/// Archive, upload and clean up each playlist folder.
pub fn publish(
    playlists: Vec<(String, PathBuf)>,
    options: PublishOptions,
    uploader: Option<&dyn BlobUploader>,
) -> Vec<Published> {
    playlists
        .into_iter()
        .map(|(title, folder)| {
            let mut published = Published {
                title,
                archive: None,
                url: None,
                error: None,
            };
            if let Err(e) = publish_one(&folder, options, uploader, &mut published) {
                error!("Publishing '{}' failed: {}", published.title, e);
                published.error = Some(e.to_string());
            }
            published
        })
        .collect()
}

/// [`publish`] with an Azure uploader built from `upload`, when given.
pub fn publish_to_azure(
    playlists: Vec<(String, PathBuf)>,
    options: PublishOptions,
    upload: Option<UploadConfig>,
) -> Result<Vec<Published>, Error> {
    let uploader = upload.map(AzureBlobUploader::new).transpose()?;
    Ok(publish(
        playlists,
        options,
        uploader.as_ref().map(|u| u as &dyn BlobUploader),
    ))
}

fn publish_one(
    folder: &std::path::Path,
    options: PublishOptions,
    uploader: Option<&dyn BlobUploader>,
    published: &mut Published,
) -> Result<(), Error> {
    let zip = compress_folder(folder, &archive_path_for(folder))?;
    published.archive = Some(zip.clone());

    let Some(uploader) = uploader.filter(|_| options.upload) else {
        return Ok(());
    };
    let url = uploader.upload(&zip)?;
    info!("Uploaded '{}' to {}", published.title, url);
    published.url = Some(url);

    if options.cleanup {
        cleanup(&[zip, folder.to_path_buf()])?;
    }
    Ok(())
}
