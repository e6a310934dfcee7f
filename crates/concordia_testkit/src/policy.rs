//! A policy that records every call.

use concordia_coordinator::{BoxError, Origin, Policy};
use concordia_core::{HistoryReader, Message, MessageId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Inner {
    processed: Mutex<Vec<(MessageId, Origin)>>,
    decisions: Mutex<Vec<(MessageId, bool)>>,
    fail_on: Mutex<HashSet<MessageId>>,
    reject: Mutex<HashSet<MessageId>>,
    deduplicate: bool,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// A [`Policy`] that records calls and can be told to fail or skip.
///
/// Clones share their records, so a test can keep one clone and hand the
/// other to the coordinator.
#[derive(Clone, Default)]
pub struct RecordingPolicy {
    inner: Arc<Inner>,
}

impl RecordingPolicy {
    /// Accepts and applies every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips remote messages whose id is already in history.
    pub fn deduplicating() -> Self {
        Self {
            inner: Arc::new(Inner {
                deduplicate: true,
                ..Inner::default()
            }),
        }
    }

    /// Sleeps for `delay` inside every `process` call.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay: Some(delay),
                ..Inner::default()
            }),
        }
    }

    /// Makes `process` fail for `id`.
    pub fn fail_on(self, id: u64) -> Self {
        self.inner.fail_on.lock().insert(MessageId(id));
        self
    }

    /// Makes `should_process` decline `id`.
    pub fn reject(self, id: u64) -> Self {
        self.inner.reject.lock().insert(MessageId(id));
        self
    }

    /// Every `process` call so far, in call order.
    pub fn processed(&self) -> Vec<(MessageId, Origin)> {
        self.inner.processed.lock().clone()
    }

    /// Ids passed to `process`, in call order.
    pub fn processed_ids(&self) -> Vec<u64> {
        self.processed().iter().map(|(id, _)| id.as_u64()).collect()
    }

    /// Every `should_process` decision so far.
    pub fn decisions(&self) -> Vec<(MessageId, bool)> {
        self.inner.decisions.lock().clone()
    }

    /// Highest number of concurrent `process` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Policy for RecordingPolicy {
    fn should_process(&self, message: &Message, history: &dyn HistoryReader) -> bool {
        let wanted = !self.inner.reject.lock().contains(&message.id)
            && !(self.inner.deduplicate && history.contains(message.id));
        self.inner.decisions.lock().push((message.id, wanted));
        wanted
    }

    fn process(&self, message: &Message, origin: Origin) -> Result<(), BoxError> {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.inner.delay {
            std::thread::sleep(delay);
        }
        self.inner.processed.lock().push((message.id, origin));
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.inner.fail_on.lock().contains(&message.id) {
            return Err(format!("refusing to process {}", message.id).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_fails() {
        let policy = RecordingPolicy::new().fail_on(2);
        assert!(policy.process(&Message::empty(1), Origin::Local).is_ok());
        assert!(policy.process(&Message::empty(2), Origin::Remote).is_err());
        assert_eq!(
            policy.processed(),
            vec![(MessageId(1), Origin::Local), (MessageId(2), Origin::Remote)]
        );
        assert_eq!(policy.max_in_flight(), 1);
    }

    #[test]
    fn deduplicates_against_history() {
        let policy = RecordingPolicy::deduplicating().reject(9);
        let history = vec![Message::empty(1)];

        assert!(!policy.should_process(&Message::empty(1), &history));
        assert!(policy.should_process(&Message::empty(2), &history));
        assert!(!policy.should_process(&Message::empty(9), &history));
        assert_eq!(policy.decisions().len(), 3);
    }
}
