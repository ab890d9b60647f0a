use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::providers::types::ExportFormat;

/// Artifact name for a serialized conversation: `<title>.<ext>` with
/// path-hostile characters flattened.
pub fn export_filename(title: &str, format: ExportFormat) -> String {
    let safe: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '-',
            _ => c,
        })
        .collect();
    let safe = safe.trim();
    let stem = if safe.is_empty() { "conversation" } else { safe };
    format!("{}.{}", stem, format.extension())
}

/// Write a serialized transcript next to the caller's working directory
/// and return the path.
pub fn write_export(
    dir: &Path,
    title: &str,
    format: ExportFormat,
    content: &str,
) -> Result<PathBuf> {
    let path = dir.join(export_filename(title, format));
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write export: {}", path.display()))?;
    Ok(path)
}
