//! The policy port.

use crate::error::BoxError;
use concordia_core::{HistoryReader, Message};

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Created by this process.
    Local,
    /// Received from a peer through a strategy module.
    Remote,
}

impl Origin {
    /// Returns true for [`Origin::Remote`].
    #[must_use]
    pub const fn is_remote(self) -> bool {
        matches!(self, Self::Remote)
    }
}

/// Application logic plugged into the coordinator.
///
/// Both methods run while the coordinator holds its processing lock, so
/// they must be quick and must not call back into the coordinator.
pub trait Policy: Send + Sync {
    /// Decides whether a remote message should be applied.
    ///
    /// `history` lists applied messages, most recent first. Returning false
    /// drops the message without touching state.
    fn should_process(&self, message: &Message, history: &dyn HistoryReader) -> bool;

    /// Applies a message's effect.
    ///
    /// An error is unrecoverable: the coordinator shuts down.
    fn process(&self, message: &Message, origin: Origin) -> Result<(), BoxError>;
}
