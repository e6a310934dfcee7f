//! # Concordia Coordinator
//!
//! A process-lifecycle shell for applications whose state must converge
//! with remote peers.
//!
//! The coordinator owns three durable stores (see [`concordia_core`]) and
//! delegates everything domain specific to collaborators:
//!
//! - a [`Policy`] decides whether a message should be applied and applies it
//! - [`StrategyModule`]s implement the replication mechanism and feed remote
//!   messages back through a [`CoordinatorHandle`]
//!
//! ## Lifecycle
//!
//! ```text
//! Coordinator::builder(config, policy)   collect modules and fold
//!        .build()
//!        .start().await                   signals -> stores -> modules
//!        .listen().await                  wait for signal or fatal error,
//!                                         then stop modules and close stores
//! ```
//!
//! ## Key Invariants
//!
//! - At most one message is applied and folded at any instant
//! - A message's effect is applied before it is folded into the digest
//! - Any failure on the message path shuts the coordinator down
//! - Exactly one shutdown reason is accepted per lifecycle
//! - Stores are closed only after every module has finished stopping

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;
mod handle;
mod lifecycle;
mod policy;
mod shutdown;
mod strategy;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder, RunningCoordinator};
pub use error::{BoxError, CoordinatorError, CoordinatorResult, SharedError};
pub use handle::{CoordinatorHandle, Outcome};
pub use lifecycle::LifecycleState;
pub use policy::{Origin, Policy};
pub use shutdown::{ShutdownReason, ShutdownSignal, ShutdownTrigger};
pub use strategy::{ModuleState, StrategyModule};

pub use async_trait::async_trait;
pub use concordia_core::{Digest, DigestFold, HistoryReader, Message, MessageId, SumFold};
