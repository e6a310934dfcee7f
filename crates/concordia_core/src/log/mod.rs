//! Append-only record logs.
//!
//! The pending-sync queue and the history stack persist their operations as
//! a sequence of framed records:
//!
//! ```text
//! magic (4) | version (2) | kind (1) | length (4) | payload | crc32 (4)
//! ```
//!
//! The CRC covers everything before it. Each store uses its own magic so a
//! queue file can never be replayed as a history file.

mod record;
mod record_log;

pub use record::{compute_crc32, encode_record, LogRecord, RecordKind, CRC_SIZE, HEADER_SIZE, LOG_VERSION};
pub use record_log::{scan, LogScan, RecordLog, TornTail};
