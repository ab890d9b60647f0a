use thiserror::Error;

use crate::models::{FileAttachment, FileInput};

/// One combined, human-readable report per rejected batch.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    fn from_messages(messages: Vec<String>) -> Self {
        Self(messages.join("\n"))
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    pub max_files: usize,
    pub max_file_size: u64,
    /// Accepted entries: exact MIME types, `category/*` wildcards, or
    /// `.ext` filename suffixes.
    pub accepted_types: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_file_size: 10 * 1024 * 1024,
            accepted_types: ["image/*", "application/pdf", "text/*", ".doc", ".docx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Tracks the files pending for the next outgoing message. Validation is
/// all-or-nothing per batch. On send, `take_pending` hands the batch to
/// the message; removal and clearing drop the payloads immediately so
/// nothing lingers after a file leaves the pending set.
pub struct AttachmentManager {
    policy: AttachmentPolicy,
    pending: Vec<FileAttachment>,
}

impl AttachmentManager {
    pub fn new() -> Self {
        Self::with_policy(AttachmentPolicy::default())
    }

    pub fn with_policy(policy: AttachmentPolicy) -> Self {
        Self {
            policy,
            pending: Vec::new(),
        }
    }

    pub fn pending(&self) -> &[FileAttachment] {
        &self.pending
    }

    pub fn total_size(&self) -> u64 {
        self.pending.iter().map(|a| a.size).sum()
    }

    /// Validate and accept a batch. If any file fails, or the batch would
    /// push the pending set over the count limit, no file is accepted and
    /// the combined error names every offender.
    pub fn add_files(&mut self, files: Vec<FileInput>) -> Result<(), ValidationError> {
        if self.pending.len() + files.len() > self.policy.max_files {
            return Err(ValidationError(format!(
                "You can only attach up to {} files.",
                self.policy.max_files
            )));
        }

        let errors: Vec<String> = files.iter().filter_map(|f| self.validate(f)).collect();
        if !errors.is_empty() {
            return Err(ValidationError::from_messages(errors));
        }

        self.pending
            .extend(files.into_iter().map(FileAttachment::from_input));
        Ok(())
    }

    fn validate(&self, file: &FileInput) -> Option<String> {
        if file.data.len() as u64 > self.policy.max_file_size {
            return Some(format!(
                "File \"{}\" is too large. Maximum size is {}.",
                file.name,
                format_file_size(self.policy.max_file_size)
            ));
        }

        let name = file.name.to_lowercase();
        let accepted = self.policy.accepted_types.iter().any(|accept| {
            if let Some(ext) = accept.strip_prefix('.') {
                name.ends_with(&format!(".{}", ext.to_lowercase()))
            } else if let Some(category) = accept.strip_suffix("/*") {
                file.mime_type.starts_with(&format!("{}/", category))
            } else {
                file.mime_type == *accept
            }
        });

        if !accepted {
            return Some(format!(
                "File \"{}\" is not a supported file type.",
                file.name
            ));
        }

        None
    }

    /// Release one pending attachment. Returns false for unknown ids.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.pending.len();
        self.pending.retain(|a| a.id != id);
        self.pending.len() != before
    }

    /// Release every pending attachment.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Transfer the pending batch to the caller: ownership passes to the
    /// outgoing message and the pending set empties.
    pub fn take_pending(&mut self) -> Vec<FileAttachment> {
        std::mem::take(&mut self.pending)
    }
}

impl Default for AttachmentManager {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let exponent = ((bytes as f64).ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024_f64.powi(exponent as i32);
    let value = (value * 100.0).round() / 100.0;
    format!("{} {}", value, UNITS[exponent])
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn text_file(name: &str, size: usize) -> FileInput {
        FileInput::new(name, "text/plain", Bytes::from(vec![b'a'; size]))
    }

    #[test]
    fn test_batch_over_count_limit_rejected() {
        let mut manager = AttachmentManager::new();
        let batch: Vec<FileInput> = (0..6).map(|i| text_file(&format!("f{}.txt", i), 10)).collect();

        let err = manager.add_files(batch).unwrap_err();
        assert!(err.to_string().contains("up to 5 files"));
        assert!(manager.pending().is_empty());
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let mut manager = AttachmentManager::new();
        let batch = vec![
            text_file("good.txt", 10),
            FileInput::new("bad.exe", "application/x-msdownload", Bytes::from_static(b"MZ")),
        ];

        let err = manager.add_files(batch).unwrap_err();
        assert!(err.to_string().contains("bad.exe"));
        assert!(manager.pending().is_empty());

        // a clean batch afterwards is accepted
        manager.add_files(vec![text_file("good.txt", 10)]).unwrap();
        assert_eq!(manager.pending().len(), 1);
    }

    #[test]
    fn test_oversize_file_rejected_with_limit_in_message() {
        let policy = AttachmentPolicy {
            max_file_size: 1024,
            ..Default::default()
        };
        let mut manager = AttachmentManager::with_policy(policy);

        let err = manager
            .add_files(vec![text_file("big.txt", 2048)])
            .unwrap_err();
        assert!(err.to_string().contains("big.txt"));
        assert!(err.to_string().contains("1 KB"));
        assert!(manager.pending().is_empty());
    }

    #[test]
    fn test_combined_error_lists_every_offender() {
        let mut manager = AttachmentManager::new();
        let batch = vec![
            FileInput::new("a.exe", "application/x-msdownload", Bytes::from_static(b"x")),
            FileInput::new("b.zip", "application/zip", Bytes::from_static(b"x")),
        ];

        let err = manager.add_files(batch).unwrap_err().to_string();
        assert!(err.contains("a.exe"));
        assert!(err.contains("b.zip"));
    }

    #[test]
    fn test_extension_rule_accepts_doc_files() {
        let mut manager = AttachmentManager::new();
        // .docx matches by filename suffix even with a generic MIME type
        manager
            .add_files(vec![FileInput::new(
                "Report.DOCX",
                "application/octet-stream",
                Bytes::from_static(b"PK"),
            )])
            .unwrap();
        assert_eq!(manager.pending().len(), 1);
    }

    #[test]
    fn test_wildcard_rule_accepts_images() {
        let mut manager = AttachmentManager::new();
        manager
            .add_files(vec![FileInput::new(
                "pic.png",
                "image/png",
                Bytes::from_static(b"\x89PNG"),
            )])
            .unwrap();
        assert_eq!(manager.pending().len(), 1);
        assert!(manager.pending()[0].preview.is_some());
    }

    #[test]
    fn test_remove_and_clear_release_pending() {
        let mut manager = AttachmentManager::new();
        manager
            .add_files(vec![text_file("a.txt", 5), text_file("b.txt", 7)])
            .unwrap();
        assert_eq!(manager.total_size(), 12);

        let id = manager.pending()[0].id.clone();
        assert!(manager.remove(&id));
        assert!(!manager.remove(&id));
        assert_eq!(manager.pending().len(), 1);

        manager.clear();
        assert!(manager.pending().is_empty());
        assert_eq!(manager.total_size(), 0);
    }

    #[test]
    fn test_take_pending_transfers_ownership() {
        let mut manager = AttachmentManager::new();
        manager
            .add_files(vec![text_file("a.txt", 5), text_file("b.txt", 7)])
            .unwrap();

        let taken = manager.take_pending();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].name, "a.txt");
        assert!(manager.pending().is_empty());

        // the manager can accept a fresh batch afterwards
        manager.add_files(vec![text_file("c.txt", 3)]).unwrap();
        assert_eq!(manager.pending().len(), 1);
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
    }
}
