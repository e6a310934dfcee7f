//! Error types for the durable stores.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while opening, reading or writing the durable stores.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] concordia_storage::StorageError),

    /// I/O error outside a storage backend (directory handling, locking).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A store's file failed validation.
    #[error("{store} corrupted: {message}")]
    Corrupted {
        /// Which store.
        store: &'static str,
        /// Description of the corruption.
        message: String,
    },

    /// A record in the middle of a log failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the failing record.
        offset: u64,
        /// Checksum stored with the record.
        expected: u32,
        /// Checksum computed from the bytes.
        actual: u32,
    },

    /// The store has been closed.
    #[error("{store} is closed")]
    StoreClosed {
        /// Which store.
        store: &'static str,
    },

    /// Another process holds the data directory lock.
    #[error("data directory locked by another process: {}", path.display())]
    DirectoryLocked {
        /// The locked directory.
        path: PathBuf,
    },

    /// The data directory is missing or not a directory.
    #[error("invalid data directory: {message}")]
    InvalidDirectory {
        /// Description of the problem.
        message: String,
    },

    /// A message payload is too large to be framed.
    #[error("message payload of {len} bytes exceeds the {max} byte limit")]
    MessageTooLarge {
        /// Payload length.
        len: usize,
        /// Maximum payload length.
        max: usize,
    },
}

impl CoreError {
    /// Creates a corruption error for the named store.
    pub fn corrupted(store: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupted {
            store,
            message: message.into(),
        }
    }

    /// Creates a closed-store error.
    pub fn closed(store: &'static str) -> Self {
        Self::StoreClosed { store }
    }

    /// Creates an invalid-directory error.
    pub fn invalid_directory(message: impl Into<String>) -> Self {
        Self::InvalidDirectory {
            message: message.into(),
        }
    }

    /// Returns true if the error means the stored bytes cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CoreError::Corrupted { .. } | CoreError::ChecksumMismatch { .. }
        )
    }
}
