//! Attachments, selected files and preview dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::UploadError;
use crate::domain::foundation::AttachmentId;

/// A durable, uploaded file that messages can reference.
///
/// # Invariants
///
/// - Created by the upload step before any message references it
/// - Immutable once referenced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Fetchable once the upload has completed.
    pub url: String,
}

impl Attachment {
    /// How the client should present this attachment.
    pub fn preview_strategy(&self) -> PreviewStrategy {
        PreviewStrategy::for_mime(&self.mime_type)
    }

    /// Size formatted for the metadata line ("512 B", "1.5 KB", "2.0 MB").
    pub fn display_size(&self) -> String {
        format_size(self.size_bytes)
    }
}

/// Presentation chosen from the MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStrategy {
    /// Rendered inline with a full-screen preview option.
    InlineImage,
    /// Rendered in an embedded document viewer.
    EmbeddedPdf,
    /// Metadata and a download link only.
    Download,
}

impl PreviewStrategy {
    pub fn for_mime(mime_type: &str) -> Self {
        let mime = mime_type.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            PreviewStrategy::InlineImage
        } else if mime == "application/pdf" {
            PreviewStrategy::EmbeddedPdf
        } else {
            PreviewStrategy::Download
        }
    }
}

/// Formats a byte count with binary units and one decimal above bytes.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.1} GB", b / GB)
    }
}

/// A file chosen locally, not yet uploaded.
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedFile {
    name: String,
    mime_type: String,
    data: Arc<[u8]>,
}

impl SelectedFile {
    /// Wraps in-memory file content.
    ///
    /// When `mime_type` is absent it is guessed from the file name.
    pub fn from_bytes(name: impl Into<String>, mime_type: Option<&str>, data: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = match mime_type {
            Some(mime) if !mime.trim().is_empty() => mime.trim().to_string(),
            _ => mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };
        Self {
            name,
            mime_type,
            data: Arc::from(data),
        }
    }

    /// Reads a file from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::Transfer(format!("cannot read {}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::from_bytes(name, None, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn preview_strategy(&self) -> PreviewStrategy {
        PreviewStrategy::for_mime(&self.mime_type)
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.data.len())
            .finish()
    }
}

/// Size and type limits applied where uploads are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_size_bytes: u64,
    /// MIME prefixes (`image/`) or exact types (`application/pdf`).
    pub allowed_mime_types: Vec<String>,
}

impl UploadPolicy {
    pub fn new(max_size_bytes: u64, allowed_mime_types: Vec<String>) -> Self {
        Self {
            max_size_bytes,
            allowed_mime_types,
        }
    }

    /// Value for a file picker's `accept` attribute. Advisory only.
    pub fn accept_filter(&self) -> String {
        self.allowed_mime_types
            .iter()
            .map(|m| if m.ends_with('/') { format!("{}*", m) } else { m.clone() })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn allows_mime(&self, mime_type: &str) -> bool {
        let mime = mime_type.trim().to_ascii_lowercase();
        self.allowed_mime_types.iter().any(|allowed| {
            if allowed.ends_with('/') {
                mime.starts_with(allowed.as_str())
            } else {
                mime == *allowed
            }
        })
    }

    /// Checks an incoming upload. An empty allow-list accepts every type.
    pub fn check(&self, name: &str, mime_type: &str, size_bytes: u64) -> Result<(), UploadError> {
        if size_bytes > self.max_size_bytes {
            return Err(UploadError::Rejected(format!(
                "{} is {} which exceeds the {} limit",
                name,
                format_size(size_bytes),
                format_size(self.max_size_bytes)
            )));
        }
        if !self.allowed_mime_types.is_empty() && !self.allows_mime(mime_type) {
            return Err(UploadError::Rejected(format!(
                "{} has unsupported type {}",
                name, mime_type
            )));
        }
        Ok(())
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024,
            allowed_mime_types: vec![
                "image/".to_string(),
                "application/pdf".to_string(),
                "text/".to_string(),
                "application/msword".to_string(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    .to_string(),
                "application/vnd.ms-excel".to_string(),
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(mime: &str, size: u64) -> Attachment {
        Attachment {
            id: AttachmentId::new(),
            name: "file".to_string(),
            mime_type: mime.to_string(),
            size_bytes: size,
            url: "http://localhost/files/x".to_string(),
        }
    }

    #[test]
    fn preview_dispatches_on_mime_prefix() {
        assert_eq!(
            attachment("image/png", 1).preview_strategy(),
            PreviewStrategy::InlineImage
        );
        assert_eq!(
            attachment("IMAGE/JPEG", 1).preview_strategy(),
            PreviewStrategy::InlineImage
        );
        assert_eq!(
            attachment("application/pdf", 1).preview_strategy(),
            PreviewStrategy::EmbeddedPdf
        );
        assert_eq!(
            attachment("application/zip", 1).preview_strategy(),
            PreviewStrategy::Download
        );
    }

    #[test]
    fn format_size_uses_readable_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(2 * 1024 * 1024), "2.0 MB");
    }

    #[test]
    fn selected_file_guesses_mime_from_name() {
        let file = SelectedFile::from_bytes("photo.png", None, vec![1, 2, 3]);
        assert_eq!(file.mime_type(), "image/png");
        assert_eq!(file.size_bytes(), 3);
        assert_eq!(file.preview_strategy(), PreviewStrategy::InlineImage);
    }

    #[test]
    fn selected_file_keeps_explicit_mime() {
        let file = SelectedFile::from_bytes("blob", Some("application/pdf"), vec![]);
        assert_eq!(file.mime_type(), "application/pdf");
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        let file = SelectedFile::from_bytes("data.unknownext", None, vec![0]);
        assert_eq!(file.mime_type(), "application/octet-stream");
    }

    #[tokio::test]
    async fn selected_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"homework").unwrap();

        let file = SelectedFile::from_path(&path).await.unwrap();
        assert_eq!(file.name(), "notes.txt");
        assert_eq!(file.mime_type(), "text/plain");
        assert_eq!(file.data(), b"homework");
    }

    #[test]
    fn policy_rejects_oversized_files() {
        let policy = UploadPolicy::new(10, vec![]);
        assert!(policy.check("a.png", "image/png", 10).is_ok());
        assert!(matches!(
            policy.check("a.png", "image/png", 11),
            Err(UploadError::Rejected(_))
        ));
    }

    #[test]
    fn policy_matches_prefixes_and_exact_types() {
        let policy = UploadPolicy::default();
        assert!(policy.allows_mime("image/webp"));
        assert!(policy.allows_mime("application/pdf"));
        assert!(!policy.allows_mime("application/x-msdownload"));
        assert!(policy.check("virus.exe", "application/x-msdownload", 1).is_err());
    }

    #[test]
    fn accept_filter_expands_prefixes() {
        let policy = UploadPolicy::new(1, vec!["image/".into(), "application/pdf".into()]);
        assert_eq!(policy.accept_filter(), "image/*,application/pdf");
    }
}
