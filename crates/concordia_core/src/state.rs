//! The convergence digest store.
//!
//! `state.db` holds a single fixed-size snapshot:
//!
//! ```text
//! magic (4) | version (2) | digest (8) | applied (8) | crc32 (4)
//! ```
//!
//! Every fold rewrites the whole file through [`atomic_replace`], so after a
//! crash the file holds either the previous snapshot or the new one.

use crate::error::{CoreError, CoreResult};
use crate::log::compute_crc32;
use crate::types::{read_u64, Digest, Message};
use concordia_storage::{atomic_replace, remove_stale_temp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Magic bytes at the start of `state.db`.
pub const STATE_MAGIC: [u8; 4] = *b"CSTA";

const STATE_VERSION: u16 = 1;
const SNAPSHOT_SIZE: usize = 26;
const STORE: &str = "state store";

/// Folds applied messages into the convergence digest.
///
/// Peers converge only if the fold is order-independent: applying the same
/// set of messages in any order must produce the same digest.
pub trait DigestFold: Send + Sync {
    /// Digest of an empty state.
    fn initial(&self) -> Digest {
        Digest::ZERO
    }

    /// Returns the digest after applying `message` to `current`.
    fn fold(&self, current: Digest, message: &Message) -> Digest;
}

impl<F> DigestFold for F
where
    F: Fn(Digest, &Message) -> Digest + Send + Sync,
{
    fn fold(&self, current: Digest, message: &Message) -> Digest {
        self(current, message)
    }
}

/// Wrapping sum of message identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumFold;

impl DigestFold for SumFold {
    fn fold(&self, current: Digest, message: &Message) -> Digest {
        Digest(current.as_u64().wrapping_add(message.id.as_u64()))
    }
}

/// Contents of `state.db`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Current digest.
    pub digest: Digest,
    /// Number of messages folded so far.
    pub applied: u64,
}

impl StateSnapshot {
    /// Serializes the snapshot into its file image.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SNAPSHOT_SIZE);
        buf.extend_from_slice(&STATE_MAGIC);
        buf.extend_from_slice(&STATE_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.digest.as_u64().to_le_bytes());
        buf.extend_from_slice(&self.applied.to_le_bytes());
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parses a file image produced by [`Self::encode`].
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != SNAPSHOT_SIZE {
            return Err(CoreError::corrupted(
                STORE,
                format!("expected {SNAPSHOT_SIZE} bytes, found {}", bytes.len()),
            ));
        }
        if bytes[0..4] != STATE_MAGIC {
            return Err(CoreError::corrupted(STORE, "invalid magic"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version > STATE_VERSION {
            return Err(CoreError::corrupted(
                STORE,
                format!("unsupported version {version}"),
            ));
        }

        let crc_at = SNAPSHOT_SIZE - 4;
        let stored = u32::from_le_bytes([
            bytes[crc_at],
            bytes[crc_at + 1],
            bytes[crc_at + 2],
            bytes[crc_at + 3],
        ]);
        let computed = compute_crc32(&bytes[..crc_at]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                offset: 0,
                expected: stored,
                actual: computed,
            });
        }

        Ok(Self {
            digest: Digest(read_u64(bytes, 6)),
            applied: read_u64(bytes, 14),
        })
    }
}

#[derive(Debug)]
struct StateInner {
    snapshot: StateSnapshot,
    closed: bool,
}

/// Persistent holder of the convergence digest.
pub struct StateStore {
    path: PathBuf,
    fold: Arc<dyn DigestFold>,
    inner: Mutex<StateInner>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// Opens the state file at `path`, creating it with the fold's initial
    /// digest if it does not exist.
    ///
    /// A leftover temp file from an interrupted write is discarded; the file
    /// at `path` is always the last complete snapshot.
    pub fn open(path: &Path, fold: Arc<dyn DigestFold>) -> CoreResult<Self> {
        remove_stale_temp(path)?;

        let snapshot = if path.exists() {
            Self::read_snapshot(path)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let initial = StateSnapshot {
                digest: fold.initial(),
                applied: 0,
            };
            atomic_replace(path, &initial.encode())?;
            initial
        };

        info!(
            path = %path.display(),
            digest = %snapshot.digest,
            applied = snapshot.applied,
            "opened state store"
        );
        Ok(Self {
            path: path.to_path_buf(),
            fold,
            inner: Mutex::new(StateInner {
                snapshot,
                closed: false,
            }),
        })
    }

    /// Reads a snapshot without opening the store.
    pub fn read_snapshot(path: &Path) -> CoreResult<StateSnapshot> {
        let bytes = std::fs::read(path)?;
        StateSnapshot::decode(&bytes)
    }

    /// Folds `message` into the digest and persists the result.
    ///
    /// Read, fold and persist happen under one lock. If persisting fails the
    /// in-memory digest is left unchanged.
    pub fn fold(&self, message: &Message) -> CoreResult<Digest> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::closed(STORE));
        }

        let next = StateSnapshot {
            digest: self.fold.fold(inner.snapshot.digest, message),
            applied: inner.snapshot.applied + 1,
        };
        atomic_replace(&self.path, &next.encode())?;
        inner.snapshot = next;

        debug!(message_id = %message.id, digest = %next.digest, "folded into digest");
        Ok(next.digest)
    }

    /// Returns the current digest.
    pub fn digest(&self) -> CoreResult<Digest> {
        Ok(self.snapshot()?.digest)
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> CoreResult<StateSnapshot> {
        let inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::closed(STORE));
        }
        Ok(inner.snapshot)
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Closes the store. Every fold is already durable, so this only
    /// rejects further use.
    pub fn close(&self) -> CoreResult<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concordia_storage::temp_path_for;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn sum() -> Arc<dyn DigestFold> {
        Arc::new(SumFold)
    }

    #[test]
    fn creates_initial_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let store = StateStore::open(&path, sum()).unwrap();

        assert_eq!(store.digest().unwrap(), Digest::ZERO);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), SNAPSHOT_SIZE as u64);
    }

    #[test]
    fn fold_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = StateStore::open(&path, sum()).unwrap();
            assert_eq!(store.fold(&Message::empty(4)).unwrap(), Digest(4));
            assert_eq!(store.fold(&Message::empty(6)).unwrap(), Digest(10));
            store.close().unwrap();
        }

        let store = StateStore::open(&path, sum()).unwrap();
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.digest, Digest(10));
        assert_eq!(snapshot.applied, 2);
        assert_eq!(StateStore::read_snapshot(&path).unwrap(), snapshot);
    }

    #[test]
    fn stale_temp_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = StateStore::open(&path, sum()).unwrap();
            store.fold(&Message::empty(7)).unwrap();
        }
        let half_written = StateSnapshot {
            digest: Digest(999),
            applied: 9,
        };
        std::fs::write(temp_path_for(&path), &half_written.encode()[..10]).unwrap();

        let store = StateStore::open(&path, sum()).unwrap();
        assert_eq!(store.digest().unwrap(), Digest(7));
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn corrupted_file_fails_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let mut image = StateSnapshot {
            digest: Digest(3),
            applied: 1,
        }
        .encode();
        image[8] ^= 0x01;
        std::fs::write(&path, &image).unwrap();

        let err = StateStore::open(&path, sum()).unwrap_err();
        assert!(err.is_corruption());

        std::fs::write(&path, b"short").unwrap();
        assert!(StateStore::open(&path, sum()).unwrap_err().is_corruption());
    }

    #[test]
    fn closure_fold() {
        let dir = tempdir().unwrap();
        let xor = |current: Digest, message: &Message| Digest(current.0 ^ message.id.0);
        let store = StateStore::open(&dir.path().join("state.db"), Arc::new(xor)).unwrap();

        store.fold(&Message::empty(0b1010)).unwrap();
        assert_eq!(store.fold(&Message::empty(0b0110)).unwrap(), Digest(0b1100));
    }

    #[test]
    fn closed_store_rejects_fold() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(&dir.path().join("state.db"), sum()).unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(matches!(
            store.fold(&Message::empty(1)),
            Err(CoreError::StoreClosed { .. })
        ));
    }

    proptest! {
        #[test]
        fn sum_fold_is_order_independent(mut ids in proptest::collection::vec(any::<u64>(), 0..32),
                                         seed in any::<u64>()) {
            let forward = ids
                .iter()
                .fold(SumFold.initial(), |d, id| SumFold.fold(d, &Message::empty(*id)));

            let len = ids.len().max(1);
            ids.rotate_left((seed as usize) % len);
            ids.reverse();
            let shuffled = ids
                .iter()
                .fold(SumFold.initial(), |d, id| SumFold.fold(d, &Message::empty(*id)));

            prop_assert_eq!(forward, shuffled);
        }
    }
}
