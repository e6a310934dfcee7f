//! Test fixtures and data directory helpers.

use concordia_coordinator::CoordinatorConfig;
use concordia_core::{Message, MessageId, HISTORY_FILE, QUEUE_FILE, STATE_FILE};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// A temporary data directory, removed on drop.
pub struct TestDataDir {
    dir: TempDir,
}

impl TestDataDir {
    /// Creates an empty data directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A coordinator configuration for this directory suited to tests:
    /// no OS signals, no fsync per append and a short stop grace.
    pub fn config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new(self.dir.path())
            .without_signals()
            .with_sync_on_write(false)
            .with_stop_grace(Duration::from_secs(1))
    }

    /// Path of the queue file.
    pub fn queue_path(&self) -> PathBuf {
        self.dir.path().join(QUEUE_FILE)
    }

    /// Path of the history file.
    pub fn history_path(&self) -> PathBuf {
        self.dir.path().join(HISTORY_FILE)
    }

    /// Path of the state file.
    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join(STATE_FILE)
    }
}

impl Default for TestDataDir {
    fn default() -> Self {
        Self::new()
    }
}

/// A message whose payload is `payload-<id>`.
pub fn message(id: u64) -> Message {
    Message::new(MessageId(id), format!("payload-{id}").into_bytes())
}

/// One [`message`] per id.
pub fn messages(ids: impl IntoIterator<Item = u64>) -> Vec<Message> {
    ids.into_iter().map(message).collect()
}

/// Polls `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition held.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Awaits `future`, panicking if it takes longer than `timeout`.
pub async fn within<T>(timeout: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, future)
        .await
        .expect("operation timed out")
}
