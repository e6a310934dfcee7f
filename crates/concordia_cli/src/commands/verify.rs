//! Verify command implementation.

use super::{ensure_data_dir, read_log, CliResult, HISTORY_STORE, QUEUE_STORE};
use concordia_core::{
    replay_history, replay_queue, StateStore, HISTORY_FILE, HISTORY_MAGIC, QUEUE_FILE,
    QUEUE_MAGIC, STATE_FILE,
};
use std::path::Path;

/// Outcome of checking one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// The file does not exist.
    Missing,
    /// Every record is intact.
    Ok {
        /// Records (or entries) read.
        records: usize,
    },
    /// Intact except for a torn trailing record.
    TornTail {
        /// Intact records before the tail.
        records: usize,
        /// Offset of the torn record.
        offset: u64,
        /// Why the tail is considered torn.
        reason: &'static str,
    },
    /// The file cannot be trusted.
    Corrupt(String),
}

/// Verification result for a data directory.
#[derive(Debug)]
pub struct VerifyResult {
    /// One entry per store file.
    pub files: Vec<(&'static str, FileStatus)>,
}

impl VerifyResult {
    /// Returns true if no file is corrupt.
    pub fn is_ok(&self) -> bool {
        !self
            .files
            .iter()
            .any(|(_, status)| matches!(status, FileStatus::Corrupt(_)))
    }
}

fn check_log<F>(path: &Path, magic: [u8; 4], store: &'static str, replay: F) -> FileStatus
where
    F: Fn(&[concordia_core::log::LogRecord]) -> concordia_core::CoreResult<usize>,
{
    let scanned = match read_log(path, magic, store) {
        Ok(Some(scanned)) => scanned,
        Ok(None) => return FileStatus::Missing,
        Err(e) => return FileStatus::Corrupt(e.to_string()),
    };
    if let Err(e) = replay(&scanned.records) {
        return FileStatus::Corrupt(e.to_string());
    }

    let records = scanned.records.len();
    match scanned.torn_tail {
        Some(torn) => FileStatus::TornTail {
            records,
            offset: torn.offset,
            reason: torn.reason,
        },
        None => FileStatus::Ok { records },
    }
}

/// Checks every store file under `path`.
pub fn collect(path: &Path) -> CliResult<VerifyResult> {
    ensure_data_dir(path)?;

    let queue = check_log(&path.join(QUEUE_FILE), QUEUE_MAGIC, QUEUE_STORE, |records| {
        replay_queue(records).map(|replay| replay.pending.len())
    });
    let history = check_log(
        &path.join(HISTORY_FILE),
        HISTORY_MAGIC,
        HISTORY_STORE,
        |records| replay_history(records).map(|entries| entries.len()),
    );

    let state_path = path.join(STATE_FILE);
    let state = if !state_path.exists() {
        FileStatus::Missing
    } else {
        match StateStore::read_snapshot(&state_path) {
            Ok(_) => FileStatus::Ok { records: 1 },
            Err(e) => FileStatus::Corrupt(e.to_string()),
        }
    };

    Ok(VerifyResult {
        files: vec![(QUEUE_FILE, queue), (HISTORY_FILE, history), (STATE_FILE, state)],
    })
}

/// Runs the verify command. Fails if any file is corrupt.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying data directory at {}", path.display());
    println!();

    let result = collect(path)?;
    for (name, status) in &result.files {
        match status {
            FileStatus::Missing => println!("  {name:<14} not found"),
            FileStatus::Ok { records } => println!("  {name:<14} OK ({records} records)"),
            FileStatus::TornTail {
                records,
                offset,
                reason,
            } => println!(
                "  {name:<14} OK ({records} records), torn tail at offset {offset}: {reason}"
            ),
            FileStatus::Corrupt(message) => println!("  {name:<14} CORRUPT: {message}"),
        }
    }
    println!();

    if result.is_ok() {
        println!("✓ Data directory verification passed");
        Ok(())
    } else {
        println!("✗ Data directory verification FAILED");
        Err("Data directory corruption detected".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concordia_core::{HistoryStack, Message, StoreOptions};

    fn history_with(dir: &Path, ids: &[u64]) -> std::path::PathBuf {
        let path = dir.join(HISTORY_FILE);
        let stack = HistoryStack::open(&path, &StoreOptions::new()).unwrap();
        for id in ids {
            stack.push(Message::empty(*id)).unwrap();
        }
        stack.close().unwrap();
        path
    }

    #[test]
    fn intact_directory_passes() {
        let dir = tempfile::tempdir().unwrap();
        history_with(dir.path(), &[1, 2, 3]);

        let result = collect(dir.path()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.files[0], (QUEUE_FILE, FileStatus::Missing));
        assert_eq!(result.files[1], (HISTORY_FILE, FileStatus::Ok { records: 3 }));
    }

    #[test]
    fn torn_tail_is_not_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = history_with(dir.path(), &[1]);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0u8; 7]);
        std::fs::write(&path, &bytes).unwrap();

        let result = collect(dir.path()).unwrap();
        assert!(result.is_ok());
        assert!(matches!(
            result.files[1].1,
            FileStatus::TornTail { records: 1, .. }
        ));
    }

    #[test]
    fn mid_log_damage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = history_with(dir.path(), &[1, 2]);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[12] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let result = collect(dir.path()).unwrap();
        assert!(!result.is_ok());
        assert!(matches!(result.files[1].1, FileStatus::Corrupt(_)));
    }

    #[test]
    fn damaged_state_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), b"not a snapshot").unwrap();

        let result = collect(dir.path()).unwrap();
        assert!(!result.is_ok());
    }
}
