//! The serialized message path.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::lifecycle::LifecycleState;
use crate::policy::{Origin, Policy};
use crate::shutdown::{ShutdownReason, ShutdownTrigger};
use concordia_core::{DataDir, Digest, HistoryStack, Message, PendingQueue, StateStore};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of handing a remote message to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The message was applied.
    Applied {
        /// Digest after folding the message.
        digest: Digest,
    },
    /// The policy declined the message.
    Skipped,
}

/// Durable stores, opened in this order and closed in this order.
#[derive(Debug)]
pub(crate) struct Stores {
    pub(crate) queue: PendingQueue,
    pub(crate) history: HistoryStack,
    pub(crate) state: StateStore,
}

impl Stores {
    pub(crate) fn close(&self) {
        if let Err(e) = self.queue.close() {
            warn!(error = %e, "failed to close pending-sync queue");
        }
        if let Err(e) = self.history.close() {
            warn!(error = %e, "failed to close history stack");
        }
        if let Err(e) = self.state.close() {
            warn!(error = %e, "failed to close state store");
        }
    }
}

pub(crate) struct Shared {
    pub(crate) policy: Arc<dyn Policy>,
    pub(crate) stores: Stores,
    pub(crate) trigger: Arc<ShutdownTrigger>,
    pub(crate) lifecycle: RwLock<LifecycleState>,
    pub(crate) data_dir: Mutex<Option<DataDir>>,
    processing: Mutex<()>,
}

impl Shared {
    pub(crate) fn new(
        policy: Arc<dyn Policy>,
        stores: Stores,
        trigger: Arc<ShutdownTrigger>,
        data_dir: DataDir,
    ) -> Self {
        Self {
            policy,
            stores,
            trigger,
            lifecycle: RwLock::new(LifecycleState::Starting),
            data_dir: Mutex::new(Some(data_dir)),
            processing: Mutex::new(()),
        }
    }

    /// Moves to `next` only if the current state is `from`.
    pub(crate) fn advance(&self, from: LifecycleState, next: LifecycleState) -> bool {
        let mut state = self.lifecycle.write();
        if *state != from {
            return false;
        }
        info!(from = %*state, to = %next, "coordinator state changed");
        *state = next;
        true
    }

    /// Waits for the message in flight, if any, then stops accepting new
    /// ones.
    pub(crate) fn enter_stopping(&self) {
        let _guard = self.processing.lock();
        self.set_state(LifecycleState::Stopping);
    }

    pub(crate) fn set_state(&self, next: LifecycleState) {
        let mut state = self.lifecycle.write();
        if *state != next {
            info!(from = %*state, to = %next, "coordinator state changed");
            *state = next;
        }
    }
}

/// Cloneable access to a running coordinator.
///
/// Strategy modules receive one in `start`. Every method may be called from
/// any thread or task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CoordinatorHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Applies a locally created message and queues it for delivery.
    ///
    /// Runs the policy's `process`, folds the message into the digest,
    /// enqueues it on the pending-sync queue and records it in history, all
    /// under the processing lock. Any failure raises a fatal shutdown and
    /// is returned as well.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::NotRunning`] if the coordinator is not running;
    /// no shutdown is raised in that case.
    pub fn handle_new_message(&self, message: Message) -> CoordinatorResult<Digest> {
        let _guard = self.shared.processing.lock();
        self.ensure_running()?;
        debug!(message_id = %message.id, "processing local message");

        let digest = self.apply(&message, Origin::Local)?;
        let stores = &self.shared.stores;
        let recorded = stores
            .queue
            .enqueue(message.clone())
            .and_then(|()| stores.history.push(message));
        if let Err(e) = recorded {
            return Err(self.escalate(e.into()));
        }
        Ok(digest)
    }

    /// Applies a message received from a peer.
    ///
    /// Same lock as [`Self::handle_new_message`]. The policy's
    /// `should_process` is consulted first; applied messages are recorded in
    /// history but never queued for delivery.
    pub fn handle_remote_message(&self, message: Message) -> CoordinatorResult<Outcome> {
        let _guard = self.shared.processing.lock();
        self.ensure_running()?;

        let stores = &self.shared.stores;
        let wanted = match stores.history.reader() {
            Ok(view) => self.shared.policy.should_process(&message, &view),
            Err(e) => return Err(self.escalate(e.into())),
        };
        if !wanted {
            debug!(message_id = %message.id, "policy skipped remote message");
            return Ok(Outcome::Skipped);
        }
        debug!(message_id = %message.id, "processing remote message");

        let digest = self.apply(&message, Origin::Remote)?;
        if let Err(e) = stores.history.push(message) {
            return Err(self.escalate(e.into()));
        }
        Ok(Outcome::Applied { digest })
    }

    /// Effect first, then digest.
    fn apply(&self, message: &Message, origin: Origin) -> CoordinatorResult<Digest> {
        if let Err(e) = self.shared.policy.process(message, origin) {
            return Err(self.escalate(CoordinatorError::policy(message.id, e)));
        }
        self.shared
            .stores
            .state
            .fold(message)
            .map_err(|e| self.escalate(CoordinatorError::fold(message.id, e)))
    }

    fn ensure_running(&self) -> CoordinatorResult<()> {
        let state = *self.shared.lifecycle.read();
        if state.accepts_messages() {
            Ok(())
        } else {
            Err(CoordinatorError::NotRunning { state })
        }
    }

    fn escalate(&self, error: CoordinatorError) -> CoordinatorError {
        self.shutdown(error.clone());
        error
    }

    /// Requests a fatal shutdown.
    ///
    /// Returns true if this call was the one accepted; later requests and
    /// requests racing an OS signal are logged and ignored.
    pub fn shutdown(&self, error: CoordinatorError) -> bool {
        let accepted = self
            .shared
            .trigger
            .fire(ShutdownReason::Fatal(error.clone()));

        if accepted {
            warn!(error = %error, "fatal error, shutting down");
            let mut state = self.shared.lifecycle.write();
            if matches!(*state, LifecycleState::Starting | LifecycleState::Running) {
                info!(from = %*state, "coordinator state changed to fatal-shutdown");
                *state = LifecycleState::FatalShutdown;
            }
        } else {
            info!(error = %error, "shutdown already in progress, ignoring");
        }
        accepted
    }

    /// Removes the oldest message awaiting delivery.
    pub fn dequeue_pending(&self) -> CoordinatorResult<Option<Message>> {
        Ok(self.shared.stores.queue.dequeue()?)
    }

    /// Returns the oldest message awaiting delivery without removing it.
    pub fn peek_pending(&self) -> CoordinatorResult<Option<Message>> {
        Ok(self.shared.stores.queue.peek()?)
    }

    /// Number of messages awaiting delivery.
    pub fn pending_len(&self) -> usize {
        self.shared.stores.queue.len()
    }

    /// Number of applied messages in history.
    pub fn history_len(&self) -> usize {
        self.shared.stores.history.len()
    }

    /// The current digest.
    pub fn digest(&self) -> CoordinatorResult<Digest> {
        Ok(self.shared.stores.state.digest()?)
    }

    /// The coordinator's lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.shared.lifecycle.read()
    }

    /// Returns true once a shutdown has been triggered.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.trigger.is_fired()
    }
}
