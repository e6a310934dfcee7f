//! Error types for the coordinator.

use crate::lifecycle::LifecycleState;
use crate::shutdown::ShutdownSignal;
use concordia_core::{CoreError, MessageId};
use std::error::Error;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Error type returned by collaborators (policies and strategy modules).
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Shared collaborator error.
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors raised by the coordinator.
///
/// Cloning is cheap: sources are shared, so a fatal error can be returned to
/// the caller that hit it and also handed to [`listen`].
///
/// [`listen`]: crate::RunningCoordinator::listen
#[derive(Debug, Clone, Error)]
pub enum CoordinatorError {
    /// A durable store failed.
    #[error("store error: {0}")]
    Store(Arc<CoreError>),

    /// The policy failed to apply a message.
    #[error("policy failed to process {id}: {source}")]
    Policy {
        /// The message being processed.
        id: MessageId,
        /// Error returned by the policy.
        source: SharedError,
    },

    /// The digest could not be updated.
    #[error("failed to fold {id} into the digest: {source}")]
    Fold {
        /// The message being folded.
        id: MessageId,
        /// Underlying store error.
        source: Arc<CoreError>,
    },

    /// A strategy module failed to start.
    #[error("strategy module '{name}' failed to start: {source}")]
    StrategyStart {
        /// Module name.
        name: String,
        /// Error returned by the module.
        source: SharedError,
    },

    /// A strategy module hit an unrecoverable error at runtime.
    #[error("strategy module '{name}' failed: {source}")]
    Strategy {
        /// Module name.
        name: String,
        /// Error reported by the module.
        source: SharedError,
    },

    /// An OS signal listener could not be registered.
    #[error("failed to register {signal} listener: {source}")]
    Signal {
        /// The signal.
        signal: ShutdownSignal,
        /// Registration error.
        source: Arc<io::Error>,
    },

    /// The coordinator is not accepting messages.
    #[error("coordinator is not running (state: {state})")]
    NotRunning {
        /// State at the time of the call.
        state: LifecycleState,
    },

    /// Any other fatal condition.
    #[error("{0}")]
    Other(String),
}

impl CoordinatorError {
    /// Wraps a policy error.
    pub fn policy(id: MessageId, source: BoxError) -> Self {
        Self::Policy {
            id,
            source: Arc::from(source),
        }
    }

    /// Wraps a digest store error.
    pub fn fold(id: MessageId, source: CoreError) -> Self {
        Self::Fold {
            id,
            source: Arc::new(source),
        }
    }

    /// Wraps a module start error.
    pub fn strategy_start(name: impl Into<String>, source: BoxError) -> Self {
        Self::StrategyStart {
            name: name.into(),
            source: Arc::from(source),
        }
    }

    /// Wraps a runtime module error. Modules pass this to
    /// [`CoordinatorHandle::shutdown`](crate::CoordinatorHandle::shutdown).
    pub fn strategy(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Strategy {
            name: name.into(),
            source: Arc::from(source.into()),
        }
    }

    /// Creates an error from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Returns true if the error is a rejection rather than a failure.
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::NotRunning { .. })
    }
}

impl From<CoreError> for CoordinatorError {
    fn from(err: CoreError) -> Self {
        Self::Store(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_source() {
        let err = CoordinatorError::policy(MessageId(3), "disk full".into());
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
        assert!(err.to_string().contains("msg:3"));
        assert!(err.source().is_some());
    }

    #[test]
    fn store_errors_convert() {
        let err: CoordinatorError = CoreError::closed("state store").into();
        assert!(matches!(err, CoordinatorError::Store(_)));
        assert_eq!(err.to_string(), "store error: state store is closed");
    }

    #[test]
    fn not_running_display() {
        let err = CoordinatorError::NotRunning {
            state: LifecycleState::Stopped,
        };
        assert!(err.is_not_running());
        assert_eq!(err.to_string(), "coordinator is not running (state: stopped)");
    }

    #[test]
    fn strategy_error_names_module() {
        let err = CoordinatorError::strategy("gossip", "peer went away");
        assert!(err.to_string().contains("'gossip'"));
        assert!(!err.is_not_running());
    }
}
