//! Property-based test generators using proptest.

use agenda_protocol::{Mutation, SyncMessage};
use agenda_store::Snapshot;
use proptest::prelude::*;

/// Strategy for contact names: short, non-blank, drawn from a small
/// alphabet so that collisions between generated operations are common.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e][a-z]{0,3}").expect("Invalid regex")
}

/// Strategy for phone numbers.
pub fn phone_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("\\+?[0-9]{3}-[0-9]{1,4}").expect("Invalid regex")
}

/// Strategy for validated mutations.
pub fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        (name_strategy(), phone_strategy()).prop_map(|(name, phone)| Mutation::Add { name, phone }),
        name_strategy().prop_map(|name| Mutation::Remove { name }),
        (name_strategy(), phone_strategy())
            .prop_map(|(name, phone)| Mutation::Update { name, phone }),
    ]
}

/// Strategy for client requests, including views.
pub fn request_strategy() -> impl Strategy<Value = SyncMessage> {
    prop_oneof![
        4 => mutation_strategy().prop_map(SyncMessage::from),
        1 => Just(SyncMessage::view()),
    ]
}

/// Strategy for directory snapshots.
pub fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    prop::collection::btree_map(name_strategy(), phone_strategy(), 0..16)
}
