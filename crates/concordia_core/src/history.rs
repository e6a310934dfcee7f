//! The history stack of applied messages.

use crate::config::StoreOptions;
use crate::error::{CoreError, CoreResult};
use crate::log::{LogRecord, RecordKind, RecordLog};
use crate::types::{Message, MessageId};
use concordia_storage::{FileBackend, StorageBackend};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Magic bytes of `history.stack` records.
pub const HISTORY_MAGIC: [u8; 4] = *b"CHST";

const STORE: &str = "history stack";

/// Read-only view of applied messages, most recent first.
///
/// This is what a policy receives when deciding whether to apply a message.
/// It offers no way to modify history.
pub trait HistoryReader {
    /// Number of recorded messages.
    fn len(&self) -> usize;

    /// Returns true if nothing has been recorded.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The message `offset` positions below the top (0 = most recent).
    fn peek_by_offset(&self, offset: usize) -> Option<&Message>;

    /// The most recently recorded message.
    fn peek(&self) -> Option<&Message> {
        self.peek_by_offset(0)
    }

    /// Returns true if a message with `id` has been recorded.
    fn contains(&self, id: MessageId) -> bool;

    /// Iterates from the most recent message to the oldest.
    fn recent(&self) -> Box<dyn Iterator<Item = &Message> + '_>;
}

/// Rebuilds stack contents (oldest first) from its log records.
pub fn replay_history(records: &[LogRecord]) -> CoreResult<Vec<Message>> {
    records
        .iter()
        .map(|record| match record.kind {
            RecordKind::Push => Message::decode(STORE, &record.payload),
            other => Err(CoreError::corrupted(
                STORE,
                format!("unexpected {other:?} record at offset {}", record.offset),
            )),
        })
        .collect()
}

#[derive(Debug)]
struct HistoryInner {
    log: Option<RecordLog>,
    /// Oldest first; the top of the stack is the last element.
    entries: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl HistoryInner {
    fn new(log: RecordLog, entries: Vec<Message>) -> Self {
        let ids = entries.iter().map(|m| m.id).collect();
        Self {
            log: Some(log),
            entries,
            ids,
        }
    }
}

/// LIFO record of applied messages.
///
/// Entries are written once and never modified or removed.
#[derive(Debug)]
pub struct HistoryStack {
    inner: RwLock<HistoryInner>,
}

impl HistoryStack {
    /// Opens or creates the stack stored at `path`.
    pub fn open(path: &Path, options: &StoreOptions) -> CoreResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        let stack = Self::with_backend(Box::new(backend), options)?;
        info!(path = %path.display(), entries = stack.len(), "opened history stack");
        Ok(stack)
    }

    /// Opens a stack over an arbitrary backend.
    pub fn with_backend(
        backend: Box<dyn StorageBackend>,
        options: &StoreOptions,
    ) -> CoreResult<Self> {
        let (log, records) =
            RecordLog::open(backend, HISTORY_MAGIC, STORE, options.sync_on_write)?;
        let entries = replay_history(&records)?;
        Ok(Self {
            inner: RwLock::new(HistoryInner::new(log, entries)),
        })
    }

    /// Records an applied message on top of the stack.
    pub fn push(&self, message: Message) -> CoreResult<()> {
        let mut inner = self.inner.write();
        let log = inner.log.as_mut().ok_or(CoreError::closed(STORE))?;
        log.append(RecordKind::Push, &message.encode()?)?;
        debug!(message_id = %message.id, depth = inner.entries.len() + 1, "recorded in history");
        inner.ids.insert(message.id);
        inner.entries.push(message);
        Ok(())
    }

    /// Returns a read-only view for traversal.
    ///
    /// The view holds a read lock; pushes wait until it is dropped.
    pub fn reader(&self) -> CoreResult<HistoryView<'_>> {
        let guard = self.inner.read();
        if guard.log.is_none() {
            return Err(CoreError::closed(STORE));
        }
        Ok(HistoryView { guard })
    }

    /// Returns the number of recorded messages.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.read().log.is_none()
    }

    /// Syncs and closes the log. Calling it again is a no-op.
    pub fn close(&self) -> CoreResult<()> {
        let Some(mut log) = self.inner.write().log.take() else {
            return Ok(());
        };
        if let Err(e) = log.sync() {
            warn!(error = %e, "sync on close failed");
            return Err(e);
        }
        Ok(())
    }
}

/// A locked, read-only view of a [`HistoryStack`].
pub struct HistoryView<'a> {
    guard: RwLockReadGuard<'a, HistoryInner>,
}

impl HistoryReader for HistoryView<'_> {
    fn len(&self) -> usize {
        self.guard.entries.len()
    }

    fn peek_by_offset(&self, offset: usize) -> Option<&Message> {
        let entries = &self.guard.entries;
        entries
            .len()
            .checked_sub(offset + 1)
            .and_then(|index| entries.get(index))
    }

    fn contains(&self, id: MessageId) -> bool {
        self.guard.ids.contains(&id)
    }

    fn recent(&self) -> Box<dyn Iterator<Item = &Message> + '_> {
        Box::new(self.guard.entries.iter().rev())
    }
}

/// An in-memory history, oldest first.
impl HistoryReader for Vec<Message> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn peek_by_offset(&self, offset: usize) -> Option<&Message> {
        Vec::len(self)
            .checked_sub(offset + 1)
            .and_then(|index| self.get(index))
    }

    fn contains(&self, id: MessageId) -> bool {
        self.iter().any(|m| m.id == id)
    }

    fn recent(&self) -> Box<dyn Iterator<Item = &Message> + '_> {
        Box::new(self.iter().rev())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concordia_storage::InMemoryBackend;
    use tempfile::tempdir;

    fn options() -> StoreOptions {
        StoreOptions::new().sync_on_write(false)
    }

    #[test]
    fn most_recent_first() {
        let stack = HistoryStack::with_backend(Box::new(InMemoryBackend::new()), &options()).unwrap();
        for id in [10, 20, 30] {
            stack.push(Message::empty(id)).unwrap();
        }

        let view = stack.reader().unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.peek().unwrap().id, MessageId(30));
        assert_eq!(view.peek_by_offset(2).unwrap().id, MessageId(10));
        assert!(view.peek_by_offset(3).is_none());

        let order: Vec<u64> = view.recent().map(|m| m.id.as_u64()).collect();
        assert_eq!(order, vec![30, 20, 10]);
        assert!(view.contains(MessageId(20)));
        assert!(!view.contains(MessageId(40)));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.stack");

        {
            let stack = HistoryStack::open(&path, &options()).unwrap();
            stack.push(Message::new(1, b"first".to_vec())).unwrap();
            stack.push(Message::new(2, b"second".to_vec())).unwrap();
            stack.close().unwrap();
        }

        let stack = HistoryStack::open(&path, &options()).unwrap();
        let view = stack.reader().unwrap();
        assert_eq!(view.peek().unwrap().payload, b"second");
        assert!(view.contains(MessageId(1)));
    }

    #[test]
    fn torn_push_is_dropped_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.stack");

        {
            let stack = HistoryStack::open(&path, &options()).unwrap();
            stack.push(Message::empty(1)).unwrap();
            stack.close().unwrap();
        }
        let intact = std::fs::metadata(&path).unwrap().len();
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&HISTORY_MAGIC).unwrap();
        }

        let stack = HistoryStack::open(&path, &options()).unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact);
    }

    #[test]
    fn queue_file_is_rejected() {
        let data = crate::log::encode_record(
            crate::QUEUE_MAGIC,
            RecordKind::Enqueue,
            &Message::empty(1).encode().unwrap(),
        )
        .unwrap();
        let result = HistoryStack::with_backend(Box::new(InMemoryBackend::with_data(data)), &options());
        assert!(result.unwrap_err().is_corruption());
    }

    #[test]
    fn closed_stack_rejects_access() {
        let stack = HistoryStack::with_backend(Box::new(InMemoryBackend::new()), &options()).unwrap();
        stack.close().unwrap();
        stack.close().unwrap();
        assert!(stack.is_closed());
        assert!(stack.reader().is_err());
        assert!(stack.push(Message::empty(1)).is_err());
    }

    #[test]
    fn slice_reader_matches_view() {
        let messages = vec![Message::empty(1), Message::empty(2)];
        let reader: &dyn HistoryReader = &messages;
        assert_eq!(reader.peek().unwrap().id, MessageId(2));
        assert!(reader.contains(MessageId(1)));
        assert_eq!(reader.recent().count(), 2);
    }
}
