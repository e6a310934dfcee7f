//! Store configuration.

/// Options shared by the durable stores.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Whether to fsync after every log append (safer but slower).
    pub sync_on_write: bool,

    /// Number of consumed queue records tolerated in `sync.queue` before the
    /// log is rewritten on open with live entries only.
    pub compact_threshold: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            compact_threshold: 1024,
        }
    }
}

impl StoreOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to fsync after every append.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the queue compaction threshold.
    #[must_use]
    pub const fn compact_threshold(mut self, records: usize) -> Self {
        self.compact_threshold = records;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = StoreOptions::default();
        assert!(options.sync_on_write);
        assert_eq!(options.compact_threshold, 1024);
    }

    #[test]
    fn builder_pattern() {
        let options = StoreOptions::new()
            .sync_on_write(false)
            .compact_threshold(8);
        assert!(!options.sync_on_write);
        assert_eq!(options.compact_threshold, 8);
    }
}
