//! Coordinator lifecycle states.

use std::fmt;

/// State of a coordinator.
///
/// ```text
/// Uninitialized -> Starting -> Running -> Stopping -> Stopped
///                                 |            ^
///                                 v            |
///                           FatalShutdown -----+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Built but not started.
    Uninitialized,
    /// Opening stores and starting modules.
    Starting,
    /// Accepting messages.
    Running,
    /// A fatal error was raised; waiting for teardown.
    FatalShutdown,
    /// Stopping modules and closing stores.
    Stopping,
    /// Fully torn down.
    Stopped,
}

impl LifecycleState {
    /// Returns true if messages are accepted in this state.
    #[must_use]
    pub const fn accepts_messages(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true once teardown has started or finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::FatalShutdown => "fatal-shutdown",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_accepts_messages() {
        assert!(LifecycleState::Running.accepts_messages());
        for state in [
            LifecycleState::Uninitialized,
            LifecycleState::Starting,
            LifecycleState::FatalShutdown,
            LifecycleState::Stopping,
            LifecycleState::Stopped,
        ] {
            assert!(!state.accepts_messages(), "{state}");
        }
    }

    #[test]
    fn terminal_states() {
        assert!(LifecycleState::Stopped.is_terminal());
        assert!(!LifecycleState::FatalShutdown.is_terminal());
    }
}
