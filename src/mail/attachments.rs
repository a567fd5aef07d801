//! Attachment materialization
//!
//! URL-backed attachments are downloaded into temporary files before a
//! transport is invoked. Every temporary file is owned by a [`TempFile`]
//! guard and removed when the guard is dropped, whatever the outcome of the
//! send attempt.

use super::transport::{ResolvedAttachment, TransportError};
use crate::domain::AttachmentSet;
use metrics::counter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const TEMP_FILE_PREFIX: &str = "mailroom-attachment-";

/// A temporary file removed on drop
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove temporary attachment"
                );
            }
        }
    }
}

/// Temporary files created for one delivery
#[derive(Debug, Default)]
pub struct MaterializedAttachments {
    files: Vec<TempFile>,
}

impl MaterializedAttachments {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Downloads remote attachments into a temporary directory
#[derive(Debug, Clone)]
pub struct AttachmentDownloader {
    client: reqwest::Client,
    temp_dir: PathBuf,
}

impl Default for AttachmentDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentDownloader {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Download every attachment that has a URL but no local path.
    ///
    /// Failed downloads are logged and skipped; the attachment stays without
    /// a local path and is left out of the message.
    pub async fn materialize(&self, attachments: &mut AttachmentSet) -> MaterializedAttachments {
        let mut materialized = MaterializedAttachments::default();

        for index in 0..attachments.len() {
            let Some(url) = attachments.items()[index].pending_url().map(str::to_string) else {
                continue;
            };

            match self.download(&url).await {
                Ok(Some(file)) => {
                    attachments.set_file_path(index, file.path());
                    materialized.files.push(file);
                    counter!("mailroom_attachments_downloaded_total", "outcome" => "ok")
                        .increment(1);
                }
                Ok(None) => {
                    tracing::warn!(%url, "Attachment download returned no content, skipping");
                    counter!("mailroom_attachments_downloaded_total", "outcome" => "empty")
                        .increment(1);
                }
                Err(e) => {
                    tracing::warn!(%url, error = %e, "Attachment download failed, skipping");
                    counter!("mailroom_attachments_downloaded_total", "outcome" => "error")
                        .increment(1);
                }
            }
        }

        materialized
    }

    async fn download(&self, url: &str) -> Result<Option<TempFile>, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionError(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Attachment(e.to_string()))?;

        let content = response
            .bytes()
            .await
            .map_err(|e| TransportError::Attachment(e.to_string()))?;

        if content.is_empty() {
            return Ok(None);
        }

        let file = TempFile::new(
            self.temp_dir
                .join(format!("{}{}", TEMP_FILE_PREFIX, Uuid::new_v4())),
        );
        tokio::fs::write(file.path(), &content)
            .await
            .map_err(|e| TransportError::Attachment(e.to_string()))?;

        Ok(Some(file))
    }
}

/// Attachments with a local file, in order
pub fn resolve_local(attachments: &AttachmentSet) -> Vec<ResolvedAttachment> {
    attachments
        .local()
        .filter_map(|a| {
            a.local_path().map(|path| ResolvedAttachment {
                path: path.to_path_buf(),
                file_name: a.file_name(),
                content_type: a.content_type().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attachment;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mailroom-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_materialize_downloads_and_cleans_up() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/report.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let downloader = AttachmentDownloader::new().with_temp_dir(scratch_dir());
        let mut set = AttachmentSet::new().with(Attachment::from_url(format!(
            "{}/files/report.csv",
            mock_server.uri()
        )));

        let materialized = downloader.materialize(&mut set).await;
        assert_eq!(materialized.len(), 1);

        let local = set.items()[0].local_path().unwrap().to_path_buf();
        assert!(local.starts_with(downloader.temp_dir()));
        assert_eq!(std::fs::read_to_string(&local).unwrap(), "a,b\n1,2\n");

        let resolved = resolve_local(&set);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].file_name, "report.csv");

        drop(materialized);
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_failed_download_is_skipped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ok.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&mock_server)
            .await;

        let downloader = AttachmentDownloader::new().with_temp_dir(scratch_dir());
        let mut set = AttachmentSet::new()
            .with(Attachment::from_url(format!("{}/missing.pdf", mock_server.uri())))
            .with(Attachment::from_url(format!("{}/ok.txt", mock_server.uri())));

        let materialized = downloader.materialize(&mut set).await;

        assert_eq!(materialized.len(), 1);
        assert!(set.items()[0].local_path().is_none());
        assert!(set.items()[1].local_path().is_some());
        assert_eq!(resolve_local(&set).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_download_is_skipped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let downloader = AttachmentDownloader::new().with_temp_dir(scratch_dir());
        let mut set =
            AttachmentSet::new().with(Attachment::from_url(format!("{}/empty", mock_server.uri())));

        let materialized = downloader.materialize(&mut set).await;
        assert!(materialized.is_empty());
        assert!(set.items()[0].local_path().is_none());
    }

    #[tokio::test]
    async fn test_local_attachments_are_not_downloaded() {
        let downloader = AttachmentDownloader::new();
        let mut set = AttachmentSet::new().with(Attachment::from_path("/tmp/existing.txt"));

        let materialized = downloader.materialize(&mut set).await;
        assert!(materialized.is_empty());
        assert_eq!(
            set.items()[0].local_path(),
            Some(Path::new("/tmp/existing.txt"))
        );
    }
}
