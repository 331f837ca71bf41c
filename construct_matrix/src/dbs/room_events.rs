use construct_db::Txn;

use super::{append, desc, WriteOpts};
use crate::{
    event::{decode_idx, encode_idx, Event, EventIdx},
    id, RoomId,
};

pub const KEY_MAX_SIZE: usize = id::MAX_SIZE + 1 + 8 + 8;

pub fn prefix(room_id: &RoomId) -> Vec<u8> {
    let mut key = room_id.as_bytes().to_vec();
    key.push(0);
    key
}

/// `room_id \0 depth idx`
pub fn key(room_id: &RoomId, depth: u64, idx: EventIdx) -> Vec<u8> {
    let mut key = prefix(room_id);
    key.extend_from_slice(&depth.to_be_bytes());
    key.extend_from_slice(&encode_idx(idx));
    key
}

/// `(depth, idx)` from the tail of a key
pub fn decode(key: &[u8]) -> Option<(u64, EventIdx)> {
    let at = key.len().checked_sub(16)?;
    Some((decode_idx(&key[at..at + 8])?, decode_idx(&key[at + 8..])?))
}

pub(super) fn index(txn: &mut Txn, event: &Event, opts: &WriteOpts) {
    if let Some(room_id) = &event.room_id {
        append(
            txn,
            opts.op,
            desc::ROOM_EVENTS,
            key(room_id, event.depth, opts.event_idx),
            Vec::new(),
        );
    }
}
