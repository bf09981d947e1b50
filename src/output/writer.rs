use crate::storage::{StorageError, StorageResult};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replaces `path` with `bytes` atomically
///
/// The payload goes to a temporary file in the same directory, is fsynced,
/// then renamed over `path`. Readers see either the old file or the new one,
/// never a partial write. Missing parent directories are created.
///
/// # Arguments
///
/// * `path` - Destination file
/// * `bytes` - Complete new contents
///
/// # Returns
///
/// * `Ok(())` - The new contents are in place
/// * `Err(StorageError::Write)` - Nothing was replaced
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let write_err = |source: std::io::Error| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    tracing::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Serializes `value` as pretty JSON and writes it with [`write_atomic`]
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw/x/2025/x.json");

        write_atomic(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_replaces_existing_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_json_pretty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v.json");

        write_json(&path, &serde_json::json!({"a": 1})).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"a\": 1"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_failed_write_keeps_old_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        write_atomic(&path, b"good").unwrap();

        // A directory where the file should go cannot be replaced
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        assert!(write_atomic(&blocked, b"x").is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "good");
    }
}
