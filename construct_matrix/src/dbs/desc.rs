//! Column declarations for the event graph

use construct_db::{Descriptor, PrefixTransform};

pub const EVENT_IDX: &str = "event_idx";
pub const EVENT_JSON: &str = "_event_json";
pub const EVENT_REFS: &str = "_event_refs";
pub const EVENT_HORIZON: &str = "_event_horizon";
pub const EVENT_SENDER: &str = "_event_sender";
pub const EVENT_TYPE: &str = "_event_type";
pub const EVENT_STATE: &str = "_event_state";
pub const ROOM_EVENTS: &str = "_room_events";
pub const ROOM_TYPE: &str = "_room_type";
pub const ROOM_HEAD: &str = "_room_head";
pub const ROOM_STATE: &str = "_room_state";
pub const ROOM_STATE_SPACE: &str = "_room_state_space";
pub const ROOM_JOINED: &str = "_room_joined";
pub const STATE_NODE: &str = "_state_node";
pub const STATE_ROOT: &str = "_state_root";

fn has_nul(key: &[u8]) -> bool {
    key.contains(&0)
}

fn to_nul(key: &[u8]) -> &[u8] {
    PrefixTransform::split_at(key, 0)
}

/// Keys of the form `name\0...` share a domain per name
const NUL_PFX: PrefixTransform = PrefixTransform {
    name: "nul",
    has: has_nul,
    get: to_nul,
};

fn has_idx(key: &[u8]) -> bool {
    key.len() >= 8
}

fn to_idx(key: &[u8]) -> &[u8] {
    &key[..8]
}

const IDX_PFX: PrefixTransform = PrefixTransform {
    name: "event_idx",
    has: has_idx,
    get: to_idx,
};

fn has_sender(key: &[u8]) -> bool {
    match key.first() {
        Some(b'@') => key.contains(&0),
        _ => key.contains(&b'@'),
    }
}

/// `@local:host\0idx` splits at the NUL; `host@local\0idx` splits at the
/// sigil so that every sender of an origin shares a domain.
fn to_sender(key: &[u8]) -> &[u8] {
    match key.first() {
        Some(b'@') => PrefixTransform::split_at(key, 0),
        _ => PrefixTransform::split_at(key, b'@'),
    }
}

const SENDER_PFX: PrefixTransform = PrefixTransform {
    name: "event_sender",
    has: has_sender,
    get: to_sender,
};

pub const DESCRIPTORS: &[Descriptor] = &[
    Descriptor::new(EVENT_IDX, "event_id => event_idx; an index of zero marks a blacklisted id"),
    Descriptor::new(EVENT_JSON, "event_idx => full event JSON"),
    Descriptor::new(
        EVENT_REFS,
        "target event_idx | ref_type << 56 | referer event_idx => --",
    )
    .with_prefix(IDX_PFX),
    Descriptor::new(
        EVENT_HORIZON,
        "unknown event_id \\0 referer event_idx => --",
    )
    .with_prefix(NUL_PFX),
    Descriptor::new(
        EVENT_SENDER,
        "@local:host \\0 event_idx => -- and host@local \\0 event_idx => --",
    )
    .with_prefix(SENDER_PFX),
    Descriptor::new(EVENT_TYPE, "type \\0 event_idx => --").with_prefix(NUL_PFX),
    Descriptor::new(
        EVENT_STATE,
        "state_key \\0 type \\0 room_id \\0 depth event_idx => --",
    )
    .with_prefix(NUL_PFX),
    Descriptor::new(ROOM_EVENTS, "room_id \\0 depth event_idx => --").with_prefix(NUL_PFX),
    Descriptor::new(ROOM_TYPE, "room_id \\0 type \\0 depth event_idx => --").with_prefix(NUL_PFX),
    Descriptor::new(ROOM_HEAD, "room_id \\0 event_id => event_idx").with_prefix(NUL_PFX),
    Descriptor::new(ROOM_STATE, "room_id \\0 type \\0 state_key => event_idx").with_prefix(NUL_PFX),
    Descriptor::new(
        ROOM_STATE_SPACE,
        "room_id \\0 type \\0 state_key \\0 depth event_idx => --",
    )
    .with_prefix(NUL_PFX),
    Descriptor::new(ROOM_JOINED, "room_id \\0 origin user_id => event_idx").with_prefix(NUL_PFX),
    Descriptor::new(STATE_NODE, "node id => state tree node JSON"),
    Descriptor::new(STATE_ROOT, "room_id \\0 depth event_idx => root node id").with_prefix(NUL_PFX),
    Descriptor::new("content", "event_idx => content JSON"),
    Descriptor::new("depth", "event_idx => depth"),
    Descriptor::new("event_id", "event_idx => event_id"),
    Descriptor::new("origin", "event_idx => origin"),
    Descriptor::new("origin_server_ts", "event_idx => origin_server_ts"),
    Descriptor::new("prev_events", "event_idx => prev_events JSON"),
    Descriptor::new("auth_events", "event_idx => auth_events JSON"),
    Descriptor::new("redacts", "event_idx => redacts"),
    Descriptor::new("room_id", "event_idx => room_id"),
    Descriptor::new("sender", "event_idx => sender"),
    Descriptor::new("state_key", "event_idx => state_key"),
    Descriptor::new("type", "event_idx => type"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Property;
    use strum::IntoEnumIterator;

    #[test]
    fn every_property_has_a_column() {
        for prop in Property::iter() {
            assert!(DESCRIPTORS.iter().any(|d| d.name == prop.column()));
        }
    }

    #[test]
    fn sender_domains() {
        assert_eq!(to_sender(b"@a:x\0\0\0\0\0\0\0\0\x01"), b"@a:x\0");
        assert_eq!(to_sender(b"x@a\0\0\0\0\0\0\0\0\x01"), b"x@");
        assert!(!has_sender(b"@a:x"));
    }
}
