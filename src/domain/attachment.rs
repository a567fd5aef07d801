//! Attachment descriptors

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A single attachment, backed by a local file or a remote URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub name: Option<String>,
    pub mime: Option<String>,
}

impl Attachment {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            url: None,
            name: None,
            mime: None,
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            path: None,
            url: Some(url.into()),
            name: None,
            mime: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Local file path, if one is known
    pub fn local_path(&self) -> Option<&Path> {
        self.path.as_deref().filter(|p| !p.as_os_str().is_empty())
    }

    /// Remote URL that still has to be downloaded before sending
    pub fn pending_url(&self) -> Option<&str> {
        if self.local_path().is_some() {
            return None;
        }
        self.url.as_deref().filter(|u| !u.is_empty())
    }

    /// File name presented to the recipient
    pub fn file_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }

        if let Some(url) = self.url.as_deref() {
            if let Some(segment) = url::Url::parse(url)
                .ok()
                .and_then(|u| u.path_segments()?.last().map(str::to_string))
                .filter(|s| !s.is_empty())
            {
                return segment;
            }
        }

        self.local_path()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string())
    }

    pub fn content_type(&self) -> &str {
        self.mime
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    fn log_entry(&self) -> String {
        let source = self
            .url
            .clone()
            .or_else(|| self.path.as_ref().map(|p| p.display().to_string()))
            .unwrap_or_default();
        format!("{} ({})", self.file_name(), source)
    }
}

/// Ordered attachment set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSet {
    items: Vec<Attachment>,
}

impl AttachmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attachment: Attachment) -> Self {
        self.items.push(attachment);
        self
    }

    pub fn push(&mut self, attachment: Attachment) {
        self.items.push(attachment);
    }

    pub fn items(&self) -> &[Attachment] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Point the attachment at `index` to a local file
    pub fn set_file_path(&mut self, index: usize, path: impl Into<PathBuf>) {
        if let Some(item) = self.items.get_mut(index) {
            item.path = Some(path.into());
        }
    }

    /// Attachments that can be handed to a transport
    pub fn local(&self) -> impl Iterator<Item = &Attachment> {
        self.items.iter().filter(|a| a.local_path().is_some())
    }

    /// Descriptor stored on the delivery log
    pub fn log_string(&self) -> Option<String> {
        if self.items.is_empty() {
            return None;
        }
        Some(
            self.items
                .iter()
                .map(Attachment::log_entry)
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

impl FromIterator<Attachment> for AttachmentSet {
    fn from_iter<T: IntoIterator<Item = Attachment>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_url_only_without_path() {
        let remote = Attachment::from_url("https://cdn.example.com/files/invoice.pdf");
        assert_eq!(
            remote.pending_url(),
            Some("https://cdn.example.com/files/invoice.pdf")
        );

        let mut both = remote.clone();
        both.path = Some(PathBuf::from("/tmp/invoice.pdf"));
        assert_eq!(both.pending_url(), None);
    }

    #[test]
    fn test_file_name_resolution() {
        let named = Attachment::from_url("https://cdn.example.com/a/b.pdf").with_name("Invoice.pdf");
        assert_eq!(named.file_name(), "Invoice.pdf");

        let from_url = Attachment::from_url("https://cdn.example.com/a/b.pdf?sig=1");
        assert_eq!(from_url.file_name(), "b.pdf");

        let from_path = Attachment::from_path("/var/data/report.csv");
        assert_eq!(from_path.file_name(), "report.csv");

        let bare = Attachment::from_url("not a url");
        assert_eq!(bare.file_name(), "attachment");
    }

    #[test]
    fn test_content_type_default() {
        assert_eq!(
            Attachment::from_path("/x").content_type(),
            "application/octet-stream"
        );
        assert_eq!(
            Attachment::from_path("/x").with_mime("text/csv").content_type(),
            "text/csv"
        );
    }

    #[test]
    fn test_set_file_path_and_local() {
        let mut set = AttachmentSet::new()
            .with(Attachment::from_url("https://example.com/a.txt"))
            .with(Attachment::from_path("/tmp/b.txt"));
        assert_eq!(set.local().count(), 1);

        set.set_file_path(0, "/tmp/downloaded");
        assert_eq!(set.local().count(), 2);
        assert_eq!(
            set.items()[0].local_path(),
            Some(Path::new("/tmp/downloaded"))
        );

        // out of range is ignored
        set.set_file_path(7, "/tmp/none");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_log_string() {
        assert_eq!(AttachmentSet::new().log_string(), None);

        let set = AttachmentSet::new()
            .with(Attachment::from_url("https://example.com/a.txt"))
            .with(Attachment::from_path("/tmp/b.txt").with_name("B"));
        assert_eq!(
            set.log_string().unwrap(),
            "a.txt (https://example.com/a.txt), B (/tmp/b.txt)"
        );
    }
}
