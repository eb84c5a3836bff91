//! Utility functions for log formatting and file system operations.
//!
//! - String truncation for logging long error messages and page excerpts
//! - Output directory validation at startup
//! - Atomic file replacement used by the feed sink and the dedup state

use rand::{Rng, rng};
use std::fs as stdfs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and byte count
/// indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and deletes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let scratch_path = path.join("..__write_check__");
    stdfs::File::create(&scratch_path)?;
    let _ = stdfs::remove_file(&scratch_path);
    info!("Output directory is writable");
    Ok(())
}

/// Replace `path` with `contents` so that readers see either the old file or
/// the complete new one.
///
/// The data goes to a uniquely named temporary file in the same directory,
/// is flushed to disk and then renamed over the destination. On failure the
/// temporary file is removed and the destination is untouched.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), bytes = contents.len()))]
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = temp_sibling(path);
    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    } else {
        debug!("Replaced file atomically");
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    let suffix: u32 = rng().random();
    path.with_file_name(format!(".{name}.{suffix:08x}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let s = "información pública";
        assert_eq!(truncate_for_log(s, 5), "infor…(+16 bytes)");
        let s = "ñññ";
        assert_eq!(truncate_for_log(s, 1), "ñ…(+4 bytes)");
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.json");
        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_write_atomic_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("latest.json");
        assert!(write_atomic(&path, b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("feed").join("nested");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__write_check__").exists());
    }
}
