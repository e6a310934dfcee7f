//! Whole-file replacement with crash safety.
//!
//! A reader of `path` observes either the old contents or the new contents,
//! never a mix. The sequence is:
//! 1. write `<path>.tmp`
//! 2. fsync the temporary file
//! 3. rename it over `path`
//! 4. fsync the parent directory so the rename itself is durable

use crate::error::StorageResult;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Returns the temporary sibling used while replacing `path`.
#[must_use]
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replaces the contents of `path` with `data`.
///
/// # Errors
///
/// Returns an error if any write, sync or rename fails. In that case `path`
/// still holds its previous contents.
pub fn atomic_replace(path: &Path, data: &[u8]) -> StorageResult<()> {
    let temp_path = temp_path_for(path);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }

    Ok(())
}

/// Removes a leftover temporary file from an interrupted [`atomic_replace`].
///
/// Returns `true` if one was found. The committed file is never touched, so
/// the last successfully replaced contents win.
pub fn remove_stale_temp(path: &Path) -> StorageResult<bool> {
    let temp_path = temp_path_for(path);
    if !temp_path.exists() {
        return Ok(false);
    }
    warn!(path = %temp_path.display(), "removing interrupted write");
    fs::remove_file(&temp_path)?;
    Ok(true)
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> StorageResult<()> {
    // An empty parent means a bare relative file name.
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> StorageResult<()> {
    // NTFS journals metadata; directory handles cannot be fsynced.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn temp_path_is_sibling() {
        let path = Path::new("/data/state.db");
        assert_eq!(temp_path_for(path), PathBuf::from("/data/state.db.tmp"));
    }

    #[test]
    fn replace_creates_and_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");

        atomic_replace(&path, b"v1").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"v1");

        atomic_replace(&path, b"version-two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"version-two");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn stale_temp_is_removed_and_committed_file_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        atomic_replace(&path, b"committed").unwrap();
        fs::write(temp_path_for(&path), b"half-writ").unwrap();

        assert!(remove_stale_temp(&path).unwrap());
        assert!(!remove_stale_temp(&path).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"committed");
    }
}
