//! Inspect command implementation.

use super::{ensure_data_dir, file_size, read_log, CliResult, HISTORY_STORE, QUEUE_STORE};
use concordia_core::{
    replay_history, replay_queue, StateStore, HISTORY_FILE, HISTORY_MAGIC, QUEUE_FILE,
    QUEUE_MAGIC, STATE_FILE,
};
use serde::Serialize;
use std::path::Path;

/// Data directory summary.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// `sync.queue` size in bytes.
    pub queue_size: u64,
    /// `history.stack` size in bytes.
    pub history_size: u64,
    /// `state.db` size in bytes.
    pub state_size: u64,
    /// Total size in bytes.
    pub total_size: u64,
    /// Messages awaiting delivery.
    pub pending: usize,
    /// Messages in history.
    pub history: usize,
    /// Current digest, if the state file exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Messages folded into the digest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<u64>,
    /// Torn trailing records a coordinator would truncate on open.
    pub torn_tails: Vec<String>,
}

/// Gathers the summary for `path`.
pub fn collect(path: &Path) -> CliResult<InspectResult> {
    ensure_data_dir(path)?;

    let queue_path = path.join(QUEUE_FILE);
    let history_path = path.join(HISTORY_FILE);
    let state_path = path.join(STATE_FILE);

    let mut result = InspectResult {
        path: path.display().to_string(),
        queue_size: file_size(&queue_path),
        history_size: file_size(&history_path),
        state_size: file_size(&state_path),
        total_size: 0,
        pending: 0,
        history: 0,
        digest: None,
        applied: None,
        torn_tails: Vec::new(),
    };
    result.total_size = result.queue_size + result.history_size + result.state_size;

    if let Some(scanned) = read_log(&queue_path, QUEUE_MAGIC, QUEUE_STORE)? {
        result.pending = replay_queue(&scanned.records)?.pending.len();
        if let Some(torn) = scanned.torn_tail {
            result
                .torn_tails
                .push(format!("{QUEUE_FILE} at offset {}: {}", torn.offset, torn.reason));
        }
    }

    if let Some(scanned) = read_log(&history_path, HISTORY_MAGIC, HISTORY_STORE)? {
        result.history = replay_history(&scanned.records)?.len();
        if let Some(torn) = scanned.torn_tail {
            result
                .torn_tails
                .push(format!("{HISTORY_FILE} at offset {}: {}", torn.offset, torn.reason));
        }
    }

    if state_path.exists() {
        let snapshot = StateStore::read_snapshot(&state_path)?;
        result.digest = Some(snapshot.digest.to_string());
        result.applied = Some(snapshot.applied);
    }

    Ok(result)
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let result = collect(path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Concordia Data Directory: {}", result.path);
    println!();
    println!("Files:");
    println!("  {QUEUE_FILE:<14} {} bytes", result.queue_size);
    println!("  {HISTORY_FILE:<14} {} bytes", result.history_size);
    println!("  {STATE_FILE:<14} {} bytes", result.state_size);
    println!("  {:<14} {} bytes", "total", result.total_size);
    println!();
    println!("Stores:");
    println!("  Pending messages: {}", result.pending);
    println!("  History entries:  {}", result.history);
    match (&result.digest, result.applied) {
        (Some(digest), Some(applied)) => {
            println!("  Digest:           {digest}");
            println!("  Applied:          {applied}");
        }
        _ => println!("  Digest:           (no state file)"),
    }

    if !result.torn_tails.is_empty() {
        println!();
        println!("Torn tails (truncated on next open):");
        for torn in &result.torn_tails {
            println!("  {torn}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concordia_core::{
        HistoryStack, Message, PendingQueue, StoreOptions, SumFold,
    };
    use std::sync::Arc;

    #[test]
    fn summarizes_stores() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions::new().sync_on_write(false);
        {
            let queue = PendingQueue::open(&dir.path().join(QUEUE_FILE), &options).unwrap();
            let history = HistoryStack::open(&dir.path().join(HISTORY_FILE), &options).unwrap();
            let state = StateStore::open(&dir.path().join(STATE_FILE), Arc::new(SumFold)).unwrap();
            for id in [2, 5] {
                let msg = Message::empty(id);
                state.fold(&msg).unwrap();
                queue.enqueue(msg.clone()).unwrap();
                history.push(msg).unwrap();
            }
            queue.close().unwrap();
            history.close().unwrap();
        }

        let result = collect(dir.path()).unwrap();
        assert_eq!(result.pending, 2);
        assert_eq!(result.history, 2);
        assert_eq!(result.digest.as_deref(), Some("0000000000000007"));
        assert_eq!(result.applied, Some(2));
        assert!(result.torn_tails.is_empty());
        assert_eq!(
            result.total_size,
            result.queue_size + result.history_size + result.state_size
        );
    }

    #[test]
    fn reports_torn_tail_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let queue_path = dir.path().join(QUEUE_FILE);
        {
            let queue = PendingQueue::open(&queue_path, &StoreOptions::new()).unwrap();
            queue.enqueue(Message::empty(1)).unwrap();
            queue.close().unwrap();
        }
        let mut bytes = std::fs::read(&queue_path).unwrap();
        bytes.extend_from_slice(&QUEUE_MAGIC);
        std::fs::write(&queue_path, &bytes).unwrap();

        let result = collect(dir.path()).unwrap();
        assert_eq!(result.pending, 1);
        assert_eq!(result.torn_tails.len(), 1);
        assert_eq!(file_size(&queue_path), bytes.len() as u64);
    }
}
