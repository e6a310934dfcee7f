//! Strategy modules for tests.

use async_trait::async_trait;
use concordia_coordinator::{
    BoxError, CoordinatorError, CoordinatorHandle, CoordinatorResult, Outcome, StrategyModule,
};
use concordia_core::{Message, MessageId};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// An ordered log of lifecycle events shared between modules.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    /// All events, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == event)
    }

    /// Returns true if `event` was recorded.
    pub fn contains(&self, event: &str) -> bool {
        self.position(event).is_some()
    }
}

/// A module that writes its lifecycle calls to a [`Journal`].
///
/// Events are `start:<name>`, `start-failed:<name>`, `stop:<name>` and
/// `wait:<name>:stores-open` or `wait:<name>:stores-closed`, depending on
/// whether the stores could still be read when `wait_for_stop` ran.
pub struct RecordingStrategy {
    name: String,
    journal: Journal,
    fail_start: bool,
    shutdown_on_start: bool,
    handle: Option<CoordinatorHandle>,
}

impl RecordingStrategy {
    /// Creates a module named `name`.
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            fail_start: false,
            shutdown_on_start: false,
            handle: None,
        }
    }

    /// Makes `start` fail.
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Makes `start` succeed after requesting a fatal shutdown.
    pub fn shutdown_on_start(mut self) -> Self {
        self.shutdown_on_start = true;
        self
    }
}

#[async_trait]
impl StrategyModule for RecordingStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, handle: CoordinatorHandle) -> Result<(), BoxError> {
        if self.fail_start {
            self.journal.record(format!("start-failed:{}", self.name));
            return Err(format!("{} refused to start", self.name).into());
        }
        self.journal.record(format!("start:{}", self.name));
        if self.shutdown_on_start {
            handle.shutdown(CoordinatorError::other(format!(
                "{} failed while starting",
                self.name
            )));
        }
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self, _deadline: Instant) {
        self.journal.record(format!("stop:{}", self.name));
    }

    async fn wait_for_stop(&mut self) {
        tokio::task::yield_now().await;
        let open = self
            .handle
            .as_ref()
            .map_or(false, |handle| handle.digest().is_ok());
        let stores = if open { "stores-open" } else { "stores-closed" };
        self.journal.record(format!("wait:{}:{stores}", self.name));
    }
}

type OutcomeLog = Arc<Mutex<Vec<(MessageId, CoordinatorResult<Outcome>)>>>;

/// Feeds messages into a [`LoopbackStrategy`] and reads back the outcomes.
#[derive(Clone)]
pub struct LoopbackSender {
    tx: mpsc::UnboundedSender<Message>,
    outcomes: OutcomeLog,
}

impl LoopbackSender {
    /// Delivers `message` as if it came from a peer. Returns false once the
    /// module has stopped.
    pub fn send(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Outcomes of every delivered message, in processing order.
    pub fn outcomes(&self) -> Vec<(MessageId, CoordinatorResult<Outcome>)> {
        self.outcomes.lock().clone()
    }

    /// Waits until at least `count` outcomes are recorded.
    pub async fn wait_for_outcomes(&self, count: usize, timeout: Duration) -> bool {
        crate::fixtures::wait_until(timeout, || self.outcomes.lock().len() >= count).await
    }
}

/// A module that receives remote messages from a channel and, optionally,
/// delivers the local pending-sync queue to another peer's channel.
///
/// Two coordinators wired to each other's [`LoopbackSender`] replicate
/// without a network.
pub struct LoopbackStrategy {
    name: String,
    inbox: Option<mpsc::UnboundedReceiver<Message>>,
    outcomes: OutcomeLog,
    outbound: Option<LoopbackSender>,
    poll_interval: Duration,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl LoopbackStrategy {
    /// Creates a module and the sender feeding it.
    pub fn new(name: impl Into<String>) -> (Self, LoopbackSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outcomes = OutcomeLog::default();
        let (stop_tx, _) = watch::channel(false);
        let module = Self {
            name: name.into(),
            inbox: Some(rx),
            outcomes: Arc::clone(&outcomes),
            outbound: None,
            poll_interval: Duration::from_millis(10),
            stop_tx,
            task: None,
        };
        (module, LoopbackSender { tx, outcomes })
    }

    /// Drains the local pending-sync queue into `peer`.
    pub fn deliver_to(mut self, peer: LoopbackSender) -> Self {
        self.outbound = Some(peer);
        self
    }

    /// How often the pending-sync queue is drained.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

fn deliver_pending(handle: &CoordinatorHandle, peer: &LoopbackSender) {
    while let Ok(Some(message)) = handle.dequeue_pending() {
        if !peer.send(message) {
            break;
        }
    }
}

#[async_trait]
impl StrategyModule for LoopbackStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, handle: CoordinatorHandle) -> Result<(), BoxError> {
        let mut inbox = self.inbox.take().ok_or("loopback module already started")?;
        let outcomes = Arc::clone(&self.outcomes);
        let outbound = self.outbound.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        let mut ticker = tokio::time::interval(self.poll_interval);

        self.task = Some(tokio::spawn(async move {
            let mut inbox_open = true;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    received = inbox.recv(), if inbox_open => match received {
                        Some(message) => {
                            let id = message.id;
                            let outcome = handle.handle_remote_message(message);
                            outcomes.lock().push((id, outcome));
                        }
                        None => inbox_open = false,
                    },
                    _ = ticker.tick(), if outbound.is_some() => {
                        if let Some(peer) = &outbound {
                            deliver_pending(&handle, peer);
                        }
                    }
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self, _deadline: Instant) {
        self.stop_tx.send_replace(true);
    }

    async fn wait_for_stop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
