//! Log scanning, recovery and appends.

use super::record::{
    compute_crc32, encode_record, LogRecord, RecordKind, CRC_SIZE, HEADER_SIZE, LOG_VERSION,
};
use crate::error::{CoreError, CoreResult};
use concordia_storage::StorageBackend;
use tracing::{debug, warn};

/// A trailing record that was only partially written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TornTail {
    /// Offset where the torn record starts.
    pub offset: u64,
    /// Number of bytes belonging to the torn record.
    pub len: u64,
    /// Why the record was judged torn.
    pub reason: &'static str,
}

/// Result of scanning a log.
#[derive(Debug, Clone, Default)]
pub struct LogScan {
    /// Every intact record, in log order.
    pub records: Vec<LogRecord>,
    /// Length of the intact prefix.
    pub valid_len: u64,
    /// The torn trailing record, if any.
    pub torn_tail: Option<TornTail>,
}

/// Scans a complete log image.
///
/// A short trailing record, a trailing record whose checksum fails, and a
/// zero-filled tail are all reported as a [`TornTail`]: they are what a crash
/// in the middle of an append leaves behind. A bad record followed by more
/// data is corruption and fails the scan.
pub fn scan(data: &[u8], magic: [u8; 4], store: &'static str) -> CoreResult<LogScan> {
    let mut result = LogScan::default();
    let mut pos = 0usize;
    let total = data.len();

    while pos < total {
        let offset = pos as u64;
        let remaining = &data[pos..];
        let torn = |reason| TornTail {
            offset,
            len: remaining.len() as u64,
            reason,
        };

        if remaining.iter().all(|&b| b == 0) {
            result.torn_tail = Some(torn("zero-filled tail"));
            break;
        }

        if remaining.len() < HEADER_SIZE {
            result.torn_tail = Some(torn("incomplete header"));
            break;
        }

        if remaining[0..4] != magic {
            return Err(CoreError::corrupted(
                store,
                format!("invalid magic at offset {offset}"),
            ));
        }

        let version = u16::from_le_bytes([remaining[4], remaining[5]]);
        if version > LOG_VERSION {
            return Err(CoreError::corrupted(
                store,
                format!("unsupported version {version} at offset {offset}"),
            ));
        }

        let kind = RecordKind::from_byte(remaining[6]).ok_or_else(|| {
            CoreError::corrupted(
                store,
                format!("unknown record kind {} at offset {offset}", remaining[6]),
            )
        })?;

        let payload_len =
            u32::from_le_bytes([remaining[7], remaining[8], remaining[9], remaining[10]]) as usize;
        let record_len = HEADER_SIZE + payload_len + CRC_SIZE;

        if remaining.len() < record_len {
            result.torn_tail = Some(torn("incomplete record"));
            break;
        }

        let crc_at = HEADER_SIZE + payload_len;
        let stored = u32::from_le_bytes([
            remaining[crc_at],
            remaining[crc_at + 1],
            remaining[crc_at + 2],
            remaining[crc_at + 3],
        ]);
        let computed = compute_crc32(&remaining[..crc_at]);

        if stored != computed {
            if remaining.len() == record_len {
                result.torn_tail = Some(torn("checksum mismatch on final record"));
                break;
            }
            return Err(CoreError::ChecksumMismatch {
                offset,
                expected: stored,
                actual: computed,
            });
        }

        result.records.push(LogRecord {
            offset,
            kind,
            payload: remaining[HEADER_SIZE..crc_at].to_vec(),
        });
        pos += record_len;
        result.valid_len = pos as u64;
    }

    Ok(result)
}

/// An open, writable record log.
pub struct RecordLog {
    backend: Box<dyn StorageBackend>,
    magic: [u8; 4],
    store: &'static str,
    sync_on_write: bool,
}

impl std::fmt::Debug for RecordLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLog")
            .field("store", &self.store)
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

impl RecordLog {
    /// Opens a log over `backend`, recovering from a torn tail.
    ///
    /// Returns the log positioned after the last intact record together with
    /// every intact record.
    pub fn open(
        mut backend: Box<dyn StorageBackend>,
        magic: [u8; 4],
        store: &'static str,
        sync_on_write: bool,
    ) -> CoreResult<(Self, Vec<LogRecord>)> {
        let data = backend.read_all()?;
        let scanned = scan(&data, magic, store)?;

        if let Some(torn) = &scanned.torn_tail {
            warn!(
                store,
                offset = torn.offset,
                bytes = torn.len,
                reason = torn.reason,
                "truncating torn record"
            );
            backend.truncate(scanned.valid_len)?;
        }

        debug!(store, records = scanned.records.len(), "log replayed");

        let log = Self {
            backend,
            magic,
            store,
            sync_on_write,
        };
        Ok((log, scanned.records))
    }

    /// Appends a record and returns its offset.
    ///
    /// If the write fails part-way the log is cut back to its previous
    /// length, so a failed append never leaves garbage ahead of later
    /// records.
    pub fn append(&mut self, kind: RecordKind, payload: &[u8]) -> CoreResult<u64> {
        let data = encode_record(self.magic, kind, payload)?;
        let before = self.backend.size()?;

        let written = self.backend.append(&data).and_then(|offset| {
            if self.sync_on_write {
                self.backend.sync()?;
            }
            Ok(offset)
        });

        match written {
            Ok(offset) => Ok(offset),
            Err(e) => {
                if let Err(undo) = self.backend.truncate(before) {
                    warn!(store = self.store, error = %undo, "could not roll back failed append");
                }
                Err(e.into())
            }
        }
    }

    /// Drops every record.
    pub fn reset(&mut self) -> CoreResult<()> {
        self.backend.truncate(0)?;
        Ok(())
    }

    /// Flushes and syncs the backend.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        self.backend.sync()?;
        Ok(())
    }

    /// Returns the current log size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concordia_storage::InMemoryBackend;

    const MAGIC: [u8; 4] = *b"TLOG";

    fn image(records: &[(RecordKind, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        for (kind, payload) in records {
            data.extend(encode_record(MAGIC, *kind, payload).unwrap());
        }
        data
    }

    #[test]
    fn scan_intact_log() {
        let data = image(&[(RecordKind::Push, b"a"), (RecordKind::Push, b"bb")]);
        let scanned = scan(&data, MAGIC, "test").unwrap();
        assert_eq!(scanned.records.len(), 2);
        assert_eq!(scanned.records[1].payload, b"bb");
        assert_eq!(scanned.records[1].offset, (HEADER_SIZE + 1 + CRC_SIZE) as u64);
        assert_eq!(scanned.valid_len, data.len() as u64);
        assert!(scanned.torn_tail.is_none());
    }

    #[test]
    fn scan_detects_short_tail() {
        let mut data = image(&[(RecordKind::Push, b"whole")]);
        let intact = data.len() as u64;
        let partial = encode_record(MAGIC, RecordKind::Push, b"partial").unwrap();
        data.extend_from_slice(&partial[..partial.len() - 3]);

        let scanned = scan(&data, MAGIC, "test").unwrap();
        assert_eq!(scanned.records.len(), 1);
        assert_eq!(scanned.valid_len, intact);
        assert_eq!(scanned.torn_tail.unwrap().offset, intact);
    }

    #[test]
    fn scan_treats_bad_final_crc_as_torn() {
        let mut data = image(&[(RecordKind::Push, b"one"), (RecordKind::Push, b"two")]);
        let last = data.len() - 1;
        data[last] ^= 0xFF;

        let scanned = scan(&data, MAGIC, "test").unwrap();
        assert_eq!(scanned.records.len(), 1);
        assert!(scanned.torn_tail.is_some());
    }

    #[test]
    fn scan_rejects_bad_crc_mid_log() {
        let mut data = image(&[(RecordKind::Push, b"one"), (RecordKind::Push, b"two")]);
        data[HEADER_SIZE] ^= 0xFF;

        let err = scan(&data, MAGIC, "test").unwrap_err();
        assert!(matches!(err, CoreError::ChecksumMismatch { offset: 0, .. }));
    }

    #[test]
    fn scan_rejects_foreign_magic() {
        let data = encode_record(*b"XXXX", RecordKind::Push, b"x").unwrap();
        assert!(scan(&data, MAGIC, "test").unwrap_err().is_corruption());
    }

    #[test]
    fn scan_accepts_zero_filled_tail() {
        let mut data = image(&[(RecordKind::Enqueue, b"m")]);
        data.extend_from_slice(&[0u8; 32]);
        let scanned = scan(&data, MAGIC, "test").unwrap();
        assert_eq!(scanned.records.len(), 1);
        assert_eq!(scanned.torn_tail.unwrap().reason, "zero-filled tail");
    }

    #[test]
    fn open_truncates_torn_tail() {
        let mut data = image(&[(RecordKind::Push, b"kept")]);
        let intact = data.len() as u64;
        data.extend_from_slice(&[b'T', b'L']);

        let backend = InMemoryBackend::with_data(data);
        let (mut log, records) = RecordLog::open(Box::new(backend), MAGIC, "test", false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(log.size().unwrap(), intact);

        let offset = log.append(RecordKind::Push, b"next").unwrap();
        assert_eq!(offset, intact);
    }

    #[test]
    fn reset_empties_log() {
        let (mut log, _) =
            RecordLog::open(Box::new(InMemoryBackend::new()), MAGIC, "test", true).unwrap();
        log.append(RecordKind::Enqueue, b"x").unwrap();
        log.reset().unwrap();
        assert_eq!(log.size().unwrap(), 0);
    }
}
