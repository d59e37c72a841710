//! Upload of finished archives to Azure Blob Storage.
//!
//! Talks to the Blob service REST endpoint directly, authorised by a shared
//! access signature (SAS) token appended to every request.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::UploadError;

/// Service version sent with every request.
const API_VERSION: &str = "2021-08-06";

/// Default request timeout; archives can be large.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Blob storage location and credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Storage account name.
    pub account: String,
    /// Container receiving the archives; created if missing.
    pub container: String,
    /// SAS token, with or without the leading `?`.
    pub sas_token: String,
    /// Service endpoint override (e.g. a local emulator).
    pub endpoint: Option<String>,
}

impl UploadConfig {
    /// Base URL of the blob service.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!("https://{}.blob.core.windows.net", self.account)
        })
    }

    /// Whether every field needed for an upload is set.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.account.trim().is_empty()
            && !self.container.trim().is_empty()
            && !self.sas_token.trim().is_empty()
    }

    fn sas_query(&self) -> &str {
        self.sas_token.trim().trim_start_matches('?')
    }
}

impl fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConfig")
            .field("account", &self.account)
            .field("container", &self.container)
            .field("sas_token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Destination for finished archives.
pub trait BlobUploader: Send + Sync {
    /// Upload the file at `path` and return its public URL.
    fn upload(&self, path: &Path) -> Result<String, UploadError>;
}

/// [`BlobUploader`] for Azure Blob Storage.
#[derive(Debug)]
pub struct AzureBlobUploader {
    config: UploadConfig,
    client: Client,
}

impl AzureBlobUploader {
    /// Create an uploader.
    pub fn new(config: UploadConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| UploadError::Request(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// URL of `blob` without credentials.
    pub fn blob_url(&self, blob: &str) -> Result<Url, UploadError> {
        let mut url = self.url(&[self.config.container.as_str(), blob], None)?;
        url.set_query(None);
        Ok(url)
    }

    fn url(&self, segments: &[&str], extra_query: Option<&str>) -> Result<Url, UploadError> {
        let endpoint = self.config.endpoint_url();
        let mut url = Url::parse(&endpoint)
            .map_err(|e| UploadError::Request(format!("Invalid endpoint {endpoint}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| UploadError::Request(format!("Invalid endpoint {endpoint}")))?
            .pop_if_empty()
            .extend(segments);

        let query = match extra_query {
            Some(extra) if self.config.sas_query().is_empty() => Some(extra.to_string()),
            Some(extra) => Some(format!("{extra}&{}", self.config.sas_query())),
            None if self.config.sas_query().is_empty() => None,
            None => Some(self.config.sas_query().to_string()),
        };
        url.set_query(query.as_deref());
        Ok(url)
    }

    fn ensure_container(&self) -> Result<(), UploadError> {
        let url = self.url(&[self.config.container.as_str()], Some("restype=container"))?;
        let response = self
            .client
            .put(url)
            .header("x-ms-version", API_VERSION)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .map_err(|e| UploadError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::CREATED => {
                info!("Created container: {}", self.config.container);
                Ok(())
            }
            StatusCode::CONFLICT => Ok(()),
            status => Err(UploadError::Rejected {
                operation: "container creation".to_string(),
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            }),
        }
    }
}

impl BlobUploader for AzureBlobUploader {
    fn upload(&self, path: &Path) -> Result<String, UploadError> {
        let blob = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::Unreadable {
                path: path.to_path_buf(),
                reason: "path has no file name".to_string(),
            })?;
        let data = std::fs::read(path).map_err(|e| UploadError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        self.ensure_container()?;

        let url = self.url(&[self.config.container.as_str(), blob.as_str()], None)?;
        let response = self
            .client
            .put(url)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .body(data)
            .send()
            .map_err(|e| UploadError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                operation: "blob upload".to_string(),
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        info!("Uploaded {} to Azure Blob Storage as {}", path.display(), blob);
        Ok(self.blob_url(&blob)?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn config() -> UploadConfig {
        UploadConfig {
            account: "music".to_string(),
            container: "playlists".to_string(),
            sas_token: "?sv=2021&sig=abc".to_string(),
            endpoint: None,
        }
    }

    #[test]
    fn test_blob_url_has_no_credentials() {
        let uploader = AzureBlobUploader::new(config()).unwrap();
        assert_eq!(
            uploader.blob_url("Chill.zip").unwrap().as_str(),
            "https://music.blob.core.windows.net/playlists/Chill.zip"
        );
    }

    #[test]
    fn test_blob_url_encodes_names() {
        let uploader = AzureBlobUploader::new(config()).unwrap();
        assert_eq!(
            uploader.blob_url("Road Trip.zip").unwrap().as_str(),
            "https://music.blob.core.windows.net/playlists/Road%20Trip.zip"
        );
    }

    #[test]
    fn test_container_url_carries_restype_and_sas() {
        let uploader = AzureBlobUploader::new(config()).unwrap();
        let url = uploader
            .url(&["playlists"], Some("restype=container"))
            .unwrap();
        assert_eq!(url.query(), Some("restype=container&sv=2021&sig=abc"));
    }

    #[test]
    fn test_endpoint_override() {
        let uploader = AzureBlobUploader::new(UploadConfig {
            endpoint: Some("http://127.0.0.1:10000/devstoreaccount1".to_string()),
            ..config()
        })
        .unwrap();
        assert_eq!(
            uploader.blob_url("a.zip").unwrap().as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/playlists/a.zip"
        );
    }

    #[test]
    fn test_upload_missing_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let uploader = AzureBlobUploader::new(config()).unwrap();
        let err = uploader.upload(&dir.path().join("missing.zip")).unwrap_err();
        assert!(matches!(err, UploadError::Unreadable { .. }));
    }

    #[test]
    fn test_config_completeness_and_redaction() {
        assert!(config().is_complete());
        assert!(!UploadConfig::default().is_complete());
        assert!(!format!("{:?}", config()).contains("sig=abc"));
    }
}
