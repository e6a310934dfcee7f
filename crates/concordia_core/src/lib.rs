//! # Concordia Core
//!
//! The durable state a Concordia coordinator keeps under its data directory:
//!
//! - [`PendingQueue`] - FIFO of locally created messages awaiting delivery
//!   to peers (`sync.queue`)
//! - [`HistoryStack`] - LIFO of applied messages, read by the policy when it
//!   decides whether to apply an incoming message (`history.stack`)
//! - [`StateStore`] - the convergence digest, updated by an atomic
//!   read-fold-persist step (`state.db`)
//!
//! ## Crash Consistency
//!
//! The queue and the stack are append-only record logs. Every record carries
//! a CRC32 over its header and payload; a torn trailing record is cut off on
//! open and anything else that fails validation is reported as corruption.
//! The digest file is replaced wholesale through a temp file and a rename,
//! so a reopen always sees the last digest that was fully persisted.
//!
//! There is no transaction spanning the three stores. A crash between
//! folding the digest and pushing history is expected; deciding whether a
//! re-delivered message is a duplicate belongs to the policy.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod history;
pub mod log;
mod queue;
mod state;
mod types;

pub use config::StoreOptions;
pub use dir::{DataDir, HISTORY_FILE, LOCK_FILE, QUEUE_FILE, STATE_FILE};
pub use error::{CoreError, CoreResult};
pub use history::{replay_history, HistoryReader, HistoryStack, HistoryView, HISTORY_MAGIC};
pub use queue::{replay_queue, PendingQueue, QueueReplay, QUEUE_MAGIC};
pub use state::{DigestFold, StateSnapshot, StateStore, SumFold, STATE_MAGIC};
pub use types::{Digest, Message, MessageId};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
