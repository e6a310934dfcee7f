//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod verify;

use concordia_core::log::{scan, LogScan};
use concordia_core::{HISTORY_FILE, QUEUE_FILE, STATE_FILE};
use concordia_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Result type for commands.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

pub(crate) const QUEUE_STORE: &str = "pending-sync queue";
pub(crate) const HISTORY_STORE: &str = "history stack";

/// Fails unless `path` holds at least one Concordia store file.
pub fn ensure_data_dir(path: &Path) -> CliResult<()> {
    let found = [QUEUE_FILE, HISTORY_FILE, STATE_FILE]
        .iter()
        .any(|name| path.join(name).exists());
    if found {
        Ok(())
    } else {
        Err(format!("No Concordia data directory found at {}", path.display()).into())
    }
}

/// Scans a store log without modifying it. `None` if the file is absent.
pub fn read_log(path: &Path, magic: [u8; 4], store: &'static str) -> CliResult<Option<LogScan>> {
    if !path.exists() {
        return Ok(None);
    }
    let backend = FileBackend::open_read_only(path)?;
    let data = backend.read_all()?;
    Ok(Some(scan(&data, magic, store)?))
}

/// Size of the file at `path`, or 0 if it does not exist.
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Up to 32 bytes of `payload`, as text if printable and hex otherwise.
pub fn preview(payload: &[u8]) -> String {
    const MAX: usize = 32;
    let head = &payload[..payload.len().min(MAX)];
    let ellipsis = if payload.len() > MAX { "..." } else { "" };

    if head.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        format!("{}{ellipsis}", String::from_utf8_lossy(head))
    } else {
        let hex: String = head.iter().map(|b| format!("{b:02x}")).collect();
        format!("0x{hex}{ellipsis}")
    }
}
