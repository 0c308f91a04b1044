// Mountpoint directory helpers

use super::error::{DriverError, DriverResult};
use std::io::ErrorKind;
use std::path::Path;

/// Make sure `dest` exists and is a directory.
///
/// Does nothing if it is already a directory; fails if something else sits
/// at that path.
pub async fn ensure_dir(dest: &Path) -> DriverResult<()> {
    match tokio::fs::symlink_metadata(dest).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(DriverError::NotDirectory(dest.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::create_dir_all(dest).await.map_err(|e| DriverError::io(dest, e))
        }
        Err(e) => Err(DriverError::io(dest, e)),
    }
}

/// Whether `dir` is a directory with no entries.
///
/// A path that cannot be opened counts as not empty, so callers never delete
/// something they could not inspect.
pub async fn is_empty_dir(dir: &Path) -> DriverResult<bool> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(false),
    };

    let first = entries.next_entry().await.map_err(|e| DriverError::io(dir, e))?;
    Ok(first.is_none())
}

/// Recursively delete a reclaimed mountpoint directory
pub async fn remove_dir(dir: &Path) -> DriverResult<()> {
    tokio::fs::remove_dir_all(dir).await.map_err(|e| DriverError::io(dir, e))
}
