//! Shutdown signalling.
//!
//! A [`ShutdownTrigger`] has two kinds of producers, OS signal listeners and
//! fatal errors raised through [`CoordinatorHandle::shutdown`], and a single
//! consumer, [`RunningCoordinator::listen`]. Only the first trigger is
//! accepted.
//!
//! [`CoordinatorHandle::shutdown`]: crate::CoordinatorHandle::shutdown
//! [`RunningCoordinator::listen`]: crate::RunningCoordinator::listen

use crate::error::CoordinatorError;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// OS signals the coordinator can shut down on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownSignal {
    /// SIGINT (Ctrl-C).
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGHUP.
    Hangup,
    /// SIGQUIT.
    Quit,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
            Self::Quit => "SIGQUIT",
        };
        f.write_str(name)
    }
}

/// Why a coordinator is shutting down.
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// A registered OS signal arrived.
    Signal(ShutdownSignal),
    /// A fatal error was raised.
    Fatal(CoordinatorError),
}

#[derive(Debug)]
enum TriggerState {
    Armed,
    Fired(ShutdownReason),
}

/// Exactly-once shutdown latch.
#[derive(Debug)]
pub struct ShutdownTrigger {
    state: Mutex<TriggerState>,
    notify: Notify,
}

impl ShutdownTrigger {
    /// Creates an armed trigger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TriggerState::Armed),
            notify: Notify::new(),
        }
    }

    /// Fires the trigger. Returns false if it had already fired, in which
    /// case `reason` is dropped.
    pub fn fire(&self, reason: ShutdownReason) -> bool {
        let mut state = self.state.lock();
        if let TriggerState::Fired(first) = &*state {
            debug!(?first, ignored = ?reason, "shutdown already triggered");
            return false;
        }
        *state = TriggerState::Fired(reason);
        drop(state);

        self.notify.notify_waiters();
        true
    }

    /// Returns true once the trigger has fired.
    pub fn is_fired(&self) -> bool {
        matches!(*self.state.lock(), TriggerState::Fired(_))
    }

    /// Returns the accepted reason, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        match &*self.state.lock() {
            TriggerState::Armed => None,
            TriggerState::Fired(reason) => Some(reason.clone()),
        }
    }

    /// Waits until the trigger fires and returns the accepted reason.
    pub async fn wait(&self) -> ShutdownReason {
        loop {
            // Registered before the state check so a fire in between is not lost.
            let notified = self.notify.notified();
            if let Some(reason) = self.reason() {
                return reason;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers a listener for `signal` and spawns a task that fires `trigger`
/// when it arrives.
///
/// Registration happens before this returns, so errors surface to the
/// caller and a signal delivered right after is not missed.
#[cfg(unix)]
pub(crate) fn spawn_signal_listener(
    signal: ShutdownSignal,
    trigger: Arc<ShutdownTrigger>,
) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let kind = match signal {
        ShutdownSignal::Interrupt => SignalKind::interrupt(),
        ShutdownSignal::Terminate => SignalKind::terminate(),
        ShutdownSignal::Hangup => SignalKind::hangup(),
        ShutdownSignal::Quit => SignalKind::quit(),
    };
    let mut stream = unix_signal(kind)?;

    Ok(tokio::spawn(async move {
        if stream.recv().await.is_some() {
            info!(%signal, "received shutdown signal");
            trigger.fire(ShutdownReason::Signal(signal));
        }
    }))
}

#[cfg(not(unix))]
pub(crate) fn spawn_signal_listener(
    signal: ShutdownSignal,
    trigger: Arc<ShutdownTrigger>,
) -> io::Result<JoinHandle<()>> {
    if signal != ShutdownSignal::Interrupt {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{signal} is not available on this platform"),
        ));
    }

    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(%signal, "received shutdown signal");
            trigger.fire(ShutdownReason::Signal(signal));
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_trigger_wins() {
        let trigger = ShutdownTrigger::new();
        assert!(!trigger.is_fired());

        assert!(trigger.fire(ShutdownReason::Fatal(CoordinatorError::other("first"))));
        assert!(!trigger.fire(ShutdownReason::Signal(ShutdownSignal::Terminate)));
        assert!(!trigger.fire(ShutdownReason::Fatal(CoordinatorError::other("second"))));

        match trigger.reason() {
            Some(ShutdownReason::Fatal(err)) => assert_eq!(err.to_string(), "first"),
            other => panic!("unexpected reason: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_returns_after_fire() {
        let trigger = Arc::new(ShutdownTrigger::new());
        let waiter = {
            let trigger = Arc::clone(&trigger);
            tokio::spawn(async move { trigger.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.fire(ShutdownReason::Signal(ShutdownSignal::Hangup));

        let reason = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(reason, ShutdownReason::Signal(ShutdownSignal::Hangup)));
    }

    #[tokio::test]
    async fn wait_after_fire_returns_immediately() {
        let trigger = ShutdownTrigger::new();
        trigger.fire(ShutdownReason::Signal(ShutdownSignal::Interrupt));
        let reason = tokio::time::timeout(Duration::from_secs(1), trigger.wait())
            .await
            .unwrap();
        assert!(matches!(reason, ShutdownReason::Signal(ShutdownSignal::Interrupt)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_producers_fire_once() {
        let trigger = Arc::new(ShutdownTrigger::new());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let trigger = Arc::clone(&trigger);
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    trigger.fire(ShutdownReason::Signal(ShutdownSignal::Terminate))
                } else {
                    trigger.fire(ShutdownReason::Fatal(CoordinatorError::other("boom")))
                }
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[test]
    fn signal_names() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Quit.to_string(), "SIGQUIT");
    }
}
