//! # Concordia Storage
//!
//! Byte-level storage backends underneath Concordia's durable stores.
//!
//! Backends are **opaque byte stores**: they append, read back and truncate
//! bytes without knowing anything about record framing, messages or digests.
//! The pending-sync queue and the history stack are record logs layered on
//! top of a [`StorageBackend`]; the state store uses [`atomic_replace`] to
//! swap whole files in one step.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - for tests and ephemeral coordinators
//! - [`FileBackend`] - persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use concordia_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"pending").unwrap();
//! assert_eq!(backend.read_at(offset, 7).unwrap(), b"pending");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod atomic;
mod backend;
mod error;
mod file;
mod memory;

pub use atomic::{atomic_replace, remove_stale_temp, temp_path_for};
pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
