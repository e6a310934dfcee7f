//! Record framing.

use crate::error::{CoreError, CoreResult};

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
pub const HEADER_SIZE: usize = 11;

/// CRC size.
pub const CRC_SIZE: usize = 4;

/// Kind of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// A message was appended to the pending-sync queue.
    Enqueue = 1,
    /// The head of the pending-sync queue was consumed.
    Dequeue = 2,
    /// A message was pushed onto the history stack.
    Push = 3,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Enqueue),
            2 => Some(Self::Dequeue),
            3 => Some(Self::Push),
            _ => None,
        }
    }

    /// Converts the record kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A decoded record together with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Offset of the record's first byte.
    pub offset: u64,
    /// Record kind.
    pub kind: RecordKind,
    /// Record payload.
    pub payload: Vec<u8>,
}

/// Frames `payload` as a record of `kind` under `magic`.
pub fn encode_record(magic: [u8; 4], kind: RecordKind, payload: &[u8]) -> CoreResult<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| CoreError::MessageTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&magic);
    data.extend_from_slice(&LOG_VERSION.to_le_bytes());
    data.push(kind.as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(payload);

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());

    Ok(data)
}

/// CRC32 (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_vector() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn record_layout() {
        let data = encode_record(*b"TEST", RecordKind::Push, b"abc").unwrap();
        assert_eq!(data.len(), HEADER_SIZE + 3 + CRC_SIZE);
        assert_eq!(&data[0..4], b"TEST");
        assert_eq!(data[6], RecordKind::Push.as_byte());
        assert_eq!(u32::from_le_bytes([data[7], data[8], data[9], data[10]]), 3);

        let crc_at = data.len() - CRC_SIZE;
        let stored = u32::from_le_bytes([
            data[crc_at],
            data[crc_at + 1],
            data[crc_at + 2],
            data[crc_at + 3],
        ]);
        assert_eq!(stored, compute_crc32(&data[..crc_at]));
    }

    #[test]
    fn kind_bytes() {
        for kind in [RecordKind::Enqueue, RecordKind::Dequeue, RecordKind::Push] {
            assert_eq!(RecordKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(RecordKind::from_byte(0), None);
        assert_eq!(RecordKind::from_byte(9), None);
    }
}
