//! Pluggable strategy modules.

use crate::error::BoxError;
use crate::handle::CoordinatorHandle;
use async_trait::async_trait;
use std::fmt;
use tokio::time::Instant;

/// Lifecycle of a strategy module as tracked by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Registered, not started.
    Created,
    /// `start` returned successfully.
    Started,
    /// `stop` was called.
    Stopping,
    /// `wait_for_stop` returned.
    Stopped,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A unit implementing part of the synchronization mechanism: delivering
/// queued messages, receiving remote ones, gossiping digests.
///
/// Remote messages go through [`CoordinatorHandle::handle_remote_message`];
/// unrecoverable errors go to [`CoordinatorHandle::shutdown`].
#[async_trait]
pub trait StrategyModule: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Starts the module. Must return promptly; long-running work belongs
    /// on spawned tasks.
    fn start(&mut self, handle: CoordinatorHandle) -> Result<(), BoxError>;

    /// Asks the module to stop by `deadline`. Must not block.
    fn stop(&mut self, deadline: Instant);

    /// Resolves once all background activity has finished.
    async fn wait_for_stop(&mut self);
}
