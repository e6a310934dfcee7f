//! Dump-queue and dump-history command implementations.

use super::{ensure_data_dir, preview, read_log, CliResult, HISTORY_STORE, QUEUE_STORE};
use concordia_core::{
    replay_history, replay_queue, Message, HISTORY_FILE, HISTORY_MAGIC, QUEUE_FILE, QUEUE_MAGIC,
};
use serde::Serialize;
use std::path::Path;

/// A dumped message.
#[derive(Debug, Serialize)]
pub struct DumpEntry {
    /// Position in the listing (0 = head of queue or top of stack).
    pub position: usize,
    /// Message id.
    pub id: u64,
    /// Payload length in bytes.
    pub payload_len: usize,
    /// Payload preview.
    pub preview: String,
}

fn entries<'a>(messages: impl Iterator<Item = &'a Message>, limit: Option<usize>) -> Vec<DumpEntry> {
    messages
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(position, message)| DumpEntry {
            position,
            id: message.id.as_u64(),
            payload_len: message.payload.len(),
            preview: preview(&message.payload),
        })
        .collect()
}

/// Pending messages, oldest first.
pub fn collect_queue(path: &Path, limit: Option<usize>) -> CliResult<Vec<DumpEntry>> {
    ensure_data_dir(path)?;
    let Some(scanned) = read_log(&path.join(QUEUE_FILE), QUEUE_MAGIC, QUEUE_STORE)? else {
        return Ok(Vec::new());
    };
    let replay = replay_queue(&scanned.records)?;
    Ok(entries(replay.pending.iter(), limit))
}

/// History entries, most recent first.
pub fn collect_history(path: &Path, limit: Option<usize>) -> CliResult<Vec<DumpEntry>> {
    ensure_data_dir(path)?;
    let Some(scanned) = read_log(&path.join(HISTORY_FILE), HISTORY_MAGIC, HISTORY_STORE)? else {
        return Ok(Vec::new());
    };
    let history = replay_history(&scanned.records)?;
    Ok(entries(history.iter().rev(), limit))
}

/// Runs the dump-queue command.
pub fn run_queue(path: &Path, limit: Option<usize>, format: &str) -> CliResult<()> {
    let dumped = collect_queue(path, limit)?;
    print(&dumped, "Pending-sync queue (oldest first)", format)
}

/// Runs the dump-history command.
pub fn run_history(path: &Path, limit: Option<usize>, format: &str) -> CliResult<()> {
    let dumped = collect_history(path, limit)?;
    print(&dumped, "History stack (most recent first)", format)
}

fn print(dumped: &[DumpEntry], title: &str, format: &str) -> CliResult<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(dumped)?);
        return Ok(());
    }

    println!("{title}: {} messages", dumped.len());
    for entry in dumped {
        println!(
            "  [{:>4}] id={:<20} len={:<8} {}",
            entry.position, entry.id, entry.payload_len, entry.preview
        );
    }
    Ok(())
}
