//! Benchmark utilities.

#![warn(missing_docs)]

use concordia_core::Message;

/// Deterministic payload of `size` bytes.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// `count` messages with consecutive ids starting at `first` and payloads of
/// `payload_size` bytes.
pub fn messages(first: u64, count: usize, payload_size: usize) -> Vec<Message> {
    let body = payload(payload_size);
    (first..first + count as u64)
        .map(|id| Message::new(id, body.clone()))
        .collect()
}
