//! # Concordia Testkit
//!
//! Test utilities for Concordia.
//!
//! This crate provides:
//! - Temporary data directories and message builders
//! - A [`RecordingPolicy`] that records and can fail or skip messages
//! - A [`RecordingStrategy`] that journals lifecycle calls
//! - A [`LoopbackStrategy`] that replicates between coordinators in-process
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use concordia_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn applies_local_message() {
//!     let dir = TestDataDir::new();
//!     let running = Coordinator::builder(dir.config(), RecordingPolicy::new())
//!         .build()
//!         .start()
//!         .await
//!         .unwrap();
//!     running.handle_new_message(message(1)).unwrap();
//!     running.stop().await;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod policy;
pub mod strategy;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::policy::*;
    pub use crate::strategy::*;
    pub use concordia_coordinator::{
        Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorHandle, LifecycleState,
        ModuleState, Origin, Outcome, RunningCoordinator,
    };
    pub use concordia_core::{Digest, Message, MessageId, SumFold};
}

pub use fixtures::*;
pub use generators::*;
pub use policy::*;
pub use strategy::*;
