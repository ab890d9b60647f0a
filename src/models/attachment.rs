use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A file accepted by the attachment manager and bound to an outgoing
/// message. `data` is the local blob handle; `Bytes` clones share the
/// underlying buffer, so transferring ownership to a message is cheap.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct FileAttachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub data: Bytes,
    /// Base64 data-URL for image attachments, used for inline previews.
    pub preview: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FileAttachment {
    pub fn from_input(input: FileInput) -> Self {
        let preview = if input.mime_type.starts_with("image/") {
            Some(format!(
                "data:{};base64,{}",
                input.mime_type,
                base64::engine::general_purpose::STANDARD.encode(&input.data)
            ))
        } else {
            None
        };

        Self {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            mime_type: input.mime_type,
            size: input.data.len() as u64,
            data: input.data,
            preview,
            created_at: Utc::now(),
        }
    }
}

/// A candidate file handed to the attachment manager, before validation.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl FileInput {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read a file from disk, inferring the MIME type from its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_from_extension(&name);
        Ok(Self {
            name,
            mime_type,
            data: Bytes::from(data),
        })
    }
}

fn mime_from_extension(name: &str) -> String {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_input_gets_preview() {
        let input = FileInput::new("pic.png", "image/png", Bytes::from_static(b"\x89PNG"));
        let att = FileAttachment::from_input(input);
        assert_eq!(att.size, 4);
        let preview = att.preview.expect("image should have a preview");
        assert!(preview.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_non_image_has_no_preview() {
        let input = FileInput::new("notes.txt", "text/plain", Bytes::from_static(b"hello"));
        let att = FileAttachment::from_input(input);
        assert!(att.preview.is_none());
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_extension("a.PDF"), "application/pdf");
        assert_eq!(mime_from_extension("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_from_extension("mystery.bin"), "application/octet-stream");
    }
}
