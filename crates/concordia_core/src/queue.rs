//! The pending-sync queue.

use crate::config::StoreOptions;
use crate::error::{CoreError, CoreResult};
use crate::log::{encode_record, LogRecord, RecordKind, RecordLog};
use crate::types::{read_u64, Message, MessageId};
use concordia_storage::{atomic_replace, remove_stale_temp, FileBackend, StorageBackend};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Magic bytes of `sync.queue` records.
pub const QUEUE_MAGIC: [u8; 4] = *b"CSYQ";

const STORE: &str = "pending-sync queue";

/// State rebuilt from the queue log.
#[derive(Debug, Clone, Default)]
pub struct QueueReplay {
    /// Messages still pending, oldest first.
    pub pending: VecDeque<Message>,
    /// Number of consumed `Enqueue`/`Dequeue` pairs still in the log.
    pub consumed: usize,
}

/// Rebuilds queue contents from its log records.
///
/// Every `Dequeue` record names the message it consumed; a mismatch with the
/// head of the queue means the log cannot be trusted.
pub fn replay_queue(records: &[LogRecord]) -> CoreResult<QueueReplay> {
    let mut replay = QueueReplay::default();

    for record in records {
        match record.kind {
            RecordKind::Enqueue => {
                replay
                    .pending
                    .push_back(Message::decode(STORE, &record.payload)?);
            }
            RecordKind::Dequeue => {
                if record.payload.len() != 8 {
                    return Err(CoreError::corrupted(
                        STORE,
                        format!("malformed dequeue record at offset {}", record.offset),
                    ));
                }
                let id = MessageId(read_u64(&record.payload, 0));
                match replay.pending.pop_front() {
                    Some(head) if head.id == id => replay.consumed += 1,
                    Some(head) => {
                        return Err(CoreError::corrupted(
                            STORE,
                            format!(
                                "dequeue of {id} at offset {} but head is {}",
                                record.offset, head.id
                            ),
                        ))
                    }
                    None => {
                        return Err(CoreError::corrupted(
                            STORE,
                            format!("dequeue of {id} at offset {} on empty queue", record.offset),
                        ))
                    }
                }
            }
            RecordKind::Push => {
                return Err(CoreError::corrupted(
                    STORE,
                    format!("history record at offset {}", record.offset),
                ))
            }
        }
    }

    Ok(replay)
}

#[derive(Debug)]
struct QueueInner {
    log: Option<RecordLog>,
    pending: VecDeque<Message>,
}

/// FIFO of messages awaiting delivery to remote peers.
///
/// Enqueued by the coordinator when a local message has been applied and
/// folded; drained by whichever strategy module delivers outbound messages.
/// The queue order is the local order of message creation.
#[derive(Debug)]
pub struct PendingQueue {
    path: Option<PathBuf>,
    inner: Mutex<QueueInner>,
}

impl PendingQueue {
    /// Opens or creates the queue stored at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or its records are corrupt.
    pub fn open(path: &Path, options: &StoreOptions) -> CoreResult<Self> {
        remove_stale_temp(path)?;
        let backend = FileBackend::open_with_create_dirs(path)?;
        let (mut log, records) =
            RecordLog::open(Box::new(backend), QUEUE_MAGIC, STORE, options.sync_on_write)?;
        let replay = replay_queue(&records)?;

        if replay.pending.is_empty() && replay.consumed > 0 {
            log.reset()?;
        } else if replay.consumed > options.compact_threshold {
            drop(log);
            log = Self::compact(path, &replay.pending, options)?;
        }

        info!(path = %path.display(), pending = replay.pending.len(), "opened pending-sync queue");
        Ok(Self {
            path: Some(path.to_path_buf()),
            inner: Mutex::new(QueueInner {
                log: Some(log),
                pending: replay.pending,
            }),
        })
    }

    /// Opens a queue over an arbitrary backend. No compaction is performed.
    pub fn with_backend(
        backend: Box<dyn StorageBackend>,
        options: &StoreOptions,
    ) -> CoreResult<Self> {
        let (log, records) = RecordLog::open(backend, QUEUE_MAGIC, STORE, options.sync_on_write)?;
        let replay = replay_queue(&records)?;
        Ok(Self {
            path: None,
            inner: Mutex::new(QueueInner {
                log: Some(log),
                pending: replay.pending,
            }),
        })
    }

    /// Rewrites the log with only the live entries.
    fn compact(
        path: &Path,
        pending: &VecDeque<Message>,
        options: &StoreOptions,
    ) -> CoreResult<RecordLog> {
        let mut data = Vec::new();
        for message in pending {
            data.extend(encode_record(
                QUEUE_MAGIC,
                RecordKind::Enqueue,
                &message.encode()?,
            )?);
        }
        atomic_replace(path, &data)?;
        info!(path = %path.display(), live = pending.len(), "compacted pending-sync queue");

        let backend = FileBackend::open(path)?;
        let (log, _) = RecordLog::open(Box::new(backend), QUEUE_MAGIC, STORE, options.sync_on_write)?;
        Ok(log)
    }

    /// Appends a message at the tail.
    pub fn enqueue(&self, message: Message) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        let log = inner.log.as_mut().ok_or(CoreError::closed(STORE))?;
        log.append(RecordKind::Enqueue, &message.encode()?)?;
        debug!(message_id = %message.id, "enqueued for sync");
        inner.pending.push_back(message);
        Ok(())
    }

    /// Removes and returns the message at the head, or `None` when empty.
    pub fn dequeue(&self) -> CoreResult<Option<Message>> {
        let mut inner = self.inner.lock();
        let QueueInner { log, pending } = &mut *inner;
        let log = log.as_mut().ok_or(CoreError::closed(STORE))?;

        let Some(head_id) = pending.front().map(|m| m.id) else {
            return Ok(None);
        };
        log.append(RecordKind::Dequeue, &head_id.as_u64().to_le_bytes())?;
        let message = pending.pop_front();

        if pending.is_empty() {
            if let Err(e) = log.reset() {
                warn!(error = %e, "could not reset drained queue log");
            }
        }
        Ok(message)
    }

    /// Returns a copy of the message at the head without removing it.
    pub fn peek(&self) -> CoreResult<Option<Message>> {
        let inner = self.inner.lock();
        if inner.log.is_none() {
            return Err(CoreError::closed(STORE));
        }
        Ok(inner.pending.front().cloned())
    }

    /// Returns copies of up to `limit` pending messages, oldest first.
    pub fn snapshot(&self, limit: usize) -> CoreResult<Vec<Message>> {
        let inner = self.inner.lock();
        if inner.log.is_none() {
            return Err(CoreError::closed(STORE));
        }
        Ok(inner.pending.iter().take(limit).cloned().collect())
    }

    /// Returns the number of pending messages.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().log.is_none()
    }

    /// Returns the file path, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Syncs and closes the log. Calling it again is a no-op.
    pub fn close(&self) -> CoreResult<()> {
        let Some(mut log) = self.inner.lock().log.take() else {
            return Ok(());
        };
        if let Err(e) = log.sync() {
            warn!(error = %e, "sync on close failed");
            return Err(e);
        }
        Ok(())
    }
}
