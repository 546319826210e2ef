use anyhow::{Context, Result};
use basemap::RawPayload;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Read and parse a `.base` container file
pub fn read_payload(path: &Path) -> Result<RawPayload> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    RawPayload::from_slice(&bytes)
        .with_context(|| format!("{} is not a snapshot container", path.display()))
}

/// Write one document into `dir`, creating it if needed
pub fn write_document(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(file_name);
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Format a DateTime to a human-readable string
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Truncate text to `max` characters for table display
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("「Orders」.「Total」", 5), "「Orde…");
    }

    #[test]
    fn test_format_datetime() {
        let dt = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(format_datetime(dt), "2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn test_write_document_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("docs");
        let path = write_document(&out, "field-table.md", "# Field table\n").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# Field table\n");
    }

    #[test]
    fn test_read_payload_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.base");
        std::fs::write(&path, "not json").unwrap();
        assert!(read_payload(&path).is_err());
    }
}
