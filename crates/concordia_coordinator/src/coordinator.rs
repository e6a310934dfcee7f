//! Coordinator construction, start-up and teardown.

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::handle::{CoordinatorHandle, Shared, Stores};
use crate::lifecycle::LifecycleState;
use crate::policy::Policy;
use crate::shutdown::{spawn_signal_listener, ShutdownReason, ShutdownTrigger};
use crate::strategy::{ModuleState, StrategyModule};
use concordia_core::{
    DataDir, Digest, DigestFold, HistoryStack, Message, PendingQueue, StateStore, SumFold,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Collects everything a coordinator needs before it starts.
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    policy: Arc<dyn Policy>,
    fold: Arc<dyn DigestFold>,
    modules: Vec<Box<dyn StrategyModule>>,
}

impl CoordinatorBuilder {
    /// Registers a strategy module. Modules start in registration order.
    #[must_use]
    pub fn strategy(mut self, module: impl StrategyModule + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Registers an already boxed strategy module.
    #[must_use]
    pub fn boxed_strategy(mut self, module: Box<dyn StrategyModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// Replaces the digest fold. Defaults to [`SumFold`].
    #[must_use]
    pub fn fold(mut self, fold: impl DigestFold + 'static) -> Self {
        self.fold = Arc::new(fold);
        self
    }

    /// Finishes construction.
    #[must_use]
    pub fn build(self) -> Coordinator {
        Coordinator {
            config: self.config,
            policy: self.policy,
            fold: self.fold,
            modules: self.modules,
        }
    }
}

/// A configured coordinator that has not started.
///
/// ```rust,ignore
/// let coordinator = Coordinator::builder(CoordinatorConfig::new("data"), policy)
///     .strategy(delivery)
///     .build();
/// coordinator.start_and_listen().await?;
/// ```
pub struct Coordinator {
    config: CoordinatorConfig,
    policy: Arc<dyn Policy>,
    fold: Arc<dyn DigestFold>,
    modules: Vec<Box<dyn StrategyModule>>,
}

impl Coordinator {
    /// Starts building a coordinator around `policy`.
    pub fn builder(config: CoordinatorConfig, policy: impl Policy + 'static) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            policy: Arc::new(policy),
            fold: Arc::new(SumFold),
            modules: Vec::new(),
        }
    }

    /// Always [`LifecycleState::Uninitialized`].
    pub fn state(&self) -> LifecycleState {
        LifecycleState::Uninitialized
    }

    /// Brings the coordinator online.
    ///
    /// Registers the configured OS signal listeners, locks the data
    /// directory, opens the pending-sync queue, the history stack and the
    /// state store, then starts every module in registration order. The
    /// first failure aborts start-up and is returned. Modules that already
    /// started are left running. A shutdown requested by a module while
    /// starting is kept: the coordinator is returned in
    /// [`LifecycleState::FatalShutdown`] and `listen` returns at once.
    pub async fn start(self) -> CoordinatorResult<RunningCoordinator> {
        let Coordinator {
            config,
            policy,
            fold,
            modules,
        } = self;
        info!(data_dir = %config.data_dir.display(), modules = modules.len(), "starting coordinator");

        let trigger = Arc::new(ShutdownTrigger::new());
        let mut signal_tasks = SignalTasks::default();
        for &signal in &config.signals {
            match spawn_signal_listener(signal, Arc::clone(&trigger)) {
                Ok(task) => signal_tasks.0.push(task),
                Err(e) => {
                    warn!(%signal, error = %e, "failed to register signal listener");
                    return Err(CoordinatorError::Signal {
                        signal,
                        source: Arc::new(e),
                    });
                }
            }
        }
        if !config.signals.is_empty() {
            info!(signals = ?config.signals, "registered shutdown signals");
        }

        let data_dir = DataDir::open(&config.data_dir, config.create_if_missing)?;
        let options = config.store_options();
        let queue = PendingQueue::open(&data_dir.queue_path(), &options)?;
        let history = HistoryStack::open(&data_dir.history_path(), &options)?;
        let state = StateStore::open(&data_dir.state_path(), fold)?;

        let shared = Arc::new(Shared::new(
            policy,
            Stores {
                queue,
                history,
                state,
            },
            trigger,
            data_dir,
        ));

        let mut running = RunningCoordinator {
            shared,
            modules: modules
                .into_iter()
                .map(|module| ModuleSlot {
                    module,
                    state: ModuleState::Created,
                })
                .collect(),
            signal_tasks,
            config,
        };

        let handle = running.handle();
        for slot in &mut running.modules {
            let name = slot.module.name().to_string();
            if let Err(e) = slot.module.start(handle.clone()) {
                warn!(module = %name, error = %e, "strategy module failed to start");
                return Err(CoordinatorError::strategy_start(name, e));
            }
            slot.state = ModuleState::Started;
            info!(module = %name, "strategy module started");
        }

        if !running
            .shared
            .advance(LifecycleState::Starting, LifecycleState::Running)
        {
            warn!(state = %running.state(), "shutdown requested during start-up");
        }
        Ok(running)
    }

    /// [`Self::start`] followed by [`RunningCoordinator::listen`].
    pub async fn start_and_listen(self) -> CoordinatorResult<()> {
        self.start().await?.listen().await
    }
}

struct ModuleSlot {
    module: Box<dyn StrategyModule>,
    state: ModuleState,
}

#[derive(Default)]
struct SignalTasks(Vec<JoinHandle<()>>);

impl SignalTasks {
    fn abort_all(&mut self) {
        for task in self.0.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SignalTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// A started coordinator.
pub struct RunningCoordinator {
    shared: Arc<Shared>,
    modules: Vec<ModuleSlot>,
    signal_tasks: SignalTasks,
    config: CoordinatorConfig,
}

impl RunningCoordinator {
    /// Returns a handle for submitting messages and requesting shutdown.
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(Arc::clone(&self.shared))
    }

    /// See [`CoordinatorHandle::handle_new_message`].
    pub fn handle_new_message(&self, message: Message) -> CoordinatorResult<Digest> {
        self.handle().handle_new_message(message)
    }

    /// See [`CoordinatorHandle::shutdown`].
    pub fn shutdown(&self, error: CoordinatorError) -> bool {
        self.handle().shutdown(error)
    }

    /// The coordinator's lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.shared.lifecycle.read()
    }

    /// Name and state of every module, in registration order.
    pub fn module_states(&self) -> Vec<(String, ModuleState)> {
        self.modules
            .iter()
            .map(|slot| (slot.module.name().to_string(), slot.state))
            .collect()
    }

    /// Waits for a registered OS signal or a fatal shutdown, then stops.
    ///
    /// Returns `Ok(())` after a signal and the triggering error after a
    /// fatal shutdown.
    pub async fn listen(self) -> CoordinatorResult<()> {
        let reason = self.shared.trigger.wait().await;
        match &reason {
            ShutdownReason::Signal(signal) => info!(%signal, "shutting down on signal"),
            ShutdownReason::Fatal(e) => warn!(error = %e, "shutting down due to error"),
        }

        self.stop().await;

        match reason {
            ShutdownReason::Signal(_) => Ok(()),
            ShutdownReason::Fatal(e) => Err(e),
        }
    }

    /// Stops every module, waits for every module, then closes the stores.
    ///
    /// A message already being processed is finished first. Modules are
    /// signalled in registration order before any of them is awaited. Store
    /// close failures are logged.
    pub async fn stop(mut self) {
        self.shared.enter_stopping();
        self.signal_tasks.abort_all();

        let deadline = Instant::now() + self.config.stop_grace;
        info!("stopping strategy modules");
        for slot in &mut self.modules {
            if slot.state == ModuleState::Started {
                slot.module.stop(deadline);
                slot.state = ModuleState::Stopping;
            }
        }

        info!("waiting for strategy modules to stop");
        for slot in &mut self.modules {
            if slot.state == ModuleState::Stopping {
                slot.module.wait_for_stop().await;
                slot.state = ModuleState::Stopped;
                info!(module = %slot.module.name(), "strategy module stopped");
            }
        }

        info!("closing stores");
        self.shared.stores.close();
        drop(self.shared.data_dir.lock().take());

        self.shared.set_state(LifecycleState::Stopped);
    }
}

impl std::fmt::Debug for RunningCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningCoordinator")
            .field("state", &self.state())
            .field("modules", &self.module_states())
            .finish_non_exhaustive()
    }
}
