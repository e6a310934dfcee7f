//! Property-based test generators using proptest.

use concordia_core::{Message, MessageId};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for message payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for a single message.
pub fn message_strategy() -> impl Strategy<Value = Message> {
    (any::<u64>(), payload_strategy()).prop_map(|(id, payload)| Message {
        id: MessageId(id),
        payload,
    })
}

/// Strategy for up to `max` messages with distinct ids.
pub fn unique_messages_strategy(max: usize) -> impl Strategy<Value = Vec<Message>> {
    prop::collection::btree_set(any::<u64>(), 0..=max).prop_map(|ids: BTreeSet<u64>| {
        ids.into_iter()
            .map(|id| Message::new(id, id.to_le_bytes().to_vec()))
            .collect()
    })
}

/// Strategy for a permutation of `0..len`.
pub fn permutation_strategy(len: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..len).collect::<Vec<_>>()).prop_shuffle()
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn unique_ids(messages in unique_messages_strategy(16)) {
            let ids: BTreeSet<_> = messages.iter().map(|m| m.id).collect();
            prop_assert_eq!(ids.len(), messages.len());
        }

        #[test]
        fn permutations_cover_range(perm in permutation_strategy(8)) {
            let mut sorted = perm.clone();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, (0..8).collect::<Vec<_>>());
        }
    }
}
