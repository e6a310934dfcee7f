//! Configuration for the coordinator.

use crate::shutdown::ShutdownSignal;
use concordia_core::StoreOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Directory holding the durable stores.
    pub data_dir: PathBuf,
    /// OS signals that trigger a clean shutdown.
    pub signals: Vec<ShutdownSignal>,
    /// Time granted to modules between `stop` and their deadline.
    pub stop_grace: Duration,
    /// Whether to fsync after every log append.
    pub sync_on_write: bool,
    /// Dead queue records tolerated before the queue log is rewritten on open.
    pub compact_threshold: usize,
    /// Whether a missing data directory is created on start.
    pub create_if_missing: bool,
}

impl CoordinatorConfig {
    /// Creates a configuration for `data_dir` that shuts down on SIGINT and
    /// SIGTERM.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let store = StoreOptions::default();
        Self {
            data_dir: data_dir.into(),
            signals: vec![ShutdownSignal::Interrupt, ShutdownSignal::Terminate],
            stop_grace: Duration::from_secs(5),
            sync_on_write: store.sync_on_write,
            compact_threshold: store.compact_threshold,
            create_if_missing: true,
        }
    }

    /// Replaces the shutdown signals.
    pub fn with_signals(mut self, signals: impl IntoIterator<Item = ShutdownSignal>) -> Self {
        self.signals.clear();
        for signal in signals {
            self = self.with_signal(signal);
        }
        self
    }

    /// Adds a shutdown signal.
    pub fn with_signal(mut self, signal: ShutdownSignal) -> Self {
        if !self.signals.contains(&signal) {
            self.signals.push(signal);
        }
        self
    }

    /// Registers no OS signals; only `shutdown` ends `listen`.
    pub fn without_signals(mut self) -> Self {
        self.signals.clear();
        self
    }

    /// Sets the stop grace period.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Sets whether to fsync after every log append.
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Sets the queue compaction threshold.
    pub fn with_compact_threshold(mut self, records: usize) -> Self {
        self.compact_threshold = records;
        self
    }

    /// Sets whether a missing data directory is created.
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Store options derived from this configuration.
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::new()
            .sync_on_write(self.sync_on_write)
            .compact_threshold(self.compact_threshold)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new("concordia-data")
    }
}
