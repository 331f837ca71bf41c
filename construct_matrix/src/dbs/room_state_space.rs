use construct_db::Txn;

use super::{append, desc, room_state, WriteOpts};
use crate::{
    event::{decode_idx, encode_idx, Event, EventIdx},
    RoomId,
};

/// `room_id \0 type \0 state_key \0`
pub fn prefix(room_id: &RoomId, kind: &str, state_key: &str) -> Vec<u8> {
    let mut key = room_state::key(room_id, kind, state_key);
    key.push(0);
    key
}

/// `room_id \0 type \0 state_key \0 depth idx`
pub fn key(room_id: &RoomId, kind: &str, state_key: &str, depth: u64, idx: EventIdx) -> Vec<u8> {
    let mut key = prefix(room_id, kind, state_key);
    key.extend_from_slice(&depth.to_be_bytes());
    key.extend_from_slice(&encode_idx(idx));
    key
}

/// `(type, state_key, depth, idx)` of a key
pub fn decode(key: &[u8]) -> Option<(&str, &str, u64, EventIdx)> {
    let tail = key.len().checked_sub(16)?;
    let (kind, state_key) = room_state::decode(key[..tail].strip_suffix(&[0])?)?;
    Some((
        kind,
        state_key,
        decode_idx(&key[tail..tail + 8])?,
        decode_idx(&key[tail + 8..])?,
    ))
}

pub(super) fn index(txn: &mut Txn, event: &Event, opts: &WriteOpts) {
    let (room_id, state_key) = match (&event.room_id, &event.state_key) {
        (Some(room_id), Some(state_key)) => (room_id, state_key),
        _ => return,
    };

    append(
        txn,
        opts.op,
        desc::ROOM_STATE_SPACE,
        key(room_id, &event.kind, state_key, event.depth, opts.event_idx),
        Vec::new(),
    );
}
