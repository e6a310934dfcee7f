//! Data directory layout and locking.
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK              # Advisory lock, one coordinator per directory
//! ├─ sync.queue        # Pending-sync queue log
//! ├─ history.stack     # History stack log
//! └─ state.db          # Convergence digest snapshot
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock file name.
pub const LOCK_FILE: &str = "LOCK";
/// Pending-sync queue file name.
pub const QUEUE_FILE: &str = "sync.queue";
/// History stack file name.
pub const HISTORY_FILE: &str = "history.stack";
/// State file name.
pub const STATE_FILE: &str = "state.db";

/// An exclusively locked data directory.
///
/// The lock is held until the value is dropped.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    lock_file: File,
}

impl DataDir {
    /// Opens the directory at `path` and takes its lock.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidDirectory`] if `path` is missing and
    ///   `create_if_missing` is false, or is not a directory
    /// - [`CoreError::DirectoryLocked`] if another process holds the lock
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_directory(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_directory(format!(
                "{} is not a directory",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DirectoryLocked {
                path: path.to_path_buf(),
            });
        }

        debug!(path = %path.display(), "locked data directory");
        Ok(Self {
            path: path.to_path_buf(),
            lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `sync.queue`.
    #[must_use]
    pub fn queue_path(&self) -> PathBuf {
        self.path.join(QUEUE_FILE)
    }

    /// Path of `history.stack`.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.path.join(HISTORY_FILE)
    }

    /// Path of `state.db`.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.path.join(STATE_FILE)
    }
}

impl Drop for DataDir {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directory() {
        let root = tempdir().unwrap();
        let path = root.path().join("data");

        let dir = DataDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert!(path.join(LOCK_FILE).exists());
        assert_eq!(dir.queue_path(), path.join("sync.queue"));
        assert_eq!(dir.history_path(), path.join("history.stack"));
        assert_eq!(dir.state_path(), path.join("state.db"));
    }

    #[test]
    fn missing_directory_without_create() {
        let root = tempdir().unwrap();
        let err = DataDir::open(&root.path().join("absent"), false).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDirectory { .. }));
    }

    #[test]
    fn file_is_not_a_directory() {
        let root = tempdir().unwrap();
        let file = root.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        assert!(DataDir::open(&file, true).is_err());
    }

    #[test]
    fn second_open_is_locked_out() {
        let root = tempdir().unwrap();
        let _first = DataDir::open(root.path(), true).unwrap();

        let err = DataDir::open(root.path(), true).unwrap_err();
        assert!(matches!(err, CoreError::DirectoryLocked { .. }));
    }

    #[test]
    fn lock_released_on_drop() {
        let root = tempdir().unwrap();
        drop(DataDir::open(root.path(), true).unwrap());
        assert!(DataDir::open(root.path(), true).is_ok());
    }
}
