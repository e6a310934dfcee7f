//! Message and digest types.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a message.
///
/// Identifiers are expected to be unique per origin. The stores do not
/// enforce global uniqueness; suppressing duplicates is the policy's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a new message ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg:{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A unit of synchronizable work.
///
/// The payload is opaque to Concordia; only the application's policy gives
/// it meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier, unique per origin.
    pub id: MessageId,
    /// Application payload.
    pub payload: Vec<u8>,
}

impl Message {
    /// Largest payload that can be framed (4-byte length field).
    pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

    /// Creates a message.
    pub fn new(id: impl Into<MessageId>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }

    /// Creates a message without payload.
    pub fn empty(id: impl Into<MessageId>) -> Self {
        Self::new(id, Vec::new())
    }

    /// Encodes the message as `id (u64 LE) | len (u32 LE) | payload`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MessageTooLarge`] if the payload cannot be framed.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let len = u32::try_from(self.payload.len()).map_err(|_| CoreError::MessageTooLarge {
            len: self.payload.len(),
            max: Self::MAX_PAYLOAD_SIZE,
        })?;

        let mut buf = Vec::with_capacity(12 + self.payload.len());
        buf.extend_from_slice(&self.id.as_u64().to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a message produced by [`Self::encode`].
    ///
    /// `store` names the store the bytes came from, for error messages.
    pub fn decode(store: &'static str, bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < 12 {
            return Err(CoreError::corrupted(store, "message record too short"));
        }
        let id = read_u64(bytes, 0);
        let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;

        if bytes.len() != 12 + len {
            return Err(CoreError::corrupted(
                store,
                format!(
                    "message {id} declares {len} payload bytes, record holds {}",
                    bytes.len() - 12
                ),
            ));
        }

        Ok(Self {
            id: MessageId(id),
            payload: bytes[12..].to_vec(),
        })
    }
}

/// The convergence digest.
///
/// Two peers that applied the same set of messages must hold the same
/// digest, so the fold producing it has to be order-independent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Digest(pub u64);

impl Digest {
    /// The empty digest.
    pub const ZERO: Digest = Digest(0);

    /// Returns the raw digest value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

pub(crate) fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
