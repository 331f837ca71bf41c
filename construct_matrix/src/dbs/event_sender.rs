use construct_db::Txn;

use super::{append, desc, WriteOpts};
use crate::{
    event::{decode_idx, encode_idx, Event, EventIdx},
    id, UserId,
};

pub const KEY_MAX_SIZE: usize = id::MAX_SIZE + 1 + 8;

/// `@local:host \0 idx`
pub fn key(sender: &UserId, idx: EventIdx) -> Vec<u8> {
    let mut key = Vec::with_capacity(KEY_MAX_SIZE);
    key.extend_from_slice(sender.as_bytes());
    key.push(0);
    key.extend_from_slice(&encode_idx(idx));
    key
}

/// `host @local \0 idx`, grouping every sender of an origin
pub fn origin_key(sender: &UserId, idx: EventIdx) -> Vec<u8> {
    let mut key = Vec::with_capacity(KEY_MAX_SIZE);
    key.extend_from_slice(sender.host().as_bytes());
    key.extend_from_slice(sender.local().as_bytes());
    key.push(0);
    key.extend_from_slice(&encode_idx(idx));
    key
}

/// The index at the end of either key form
pub fn decode(key: &[u8]) -> Option<EventIdx> {
    key.len()
        .checked_sub(8)
        .and_then(|at| decode_idx(&key[at..]))
}

pub(super) fn index(txn: &mut Txn, event: &Event, opts: &WriteOpts) {
    append(txn, opts.op, desc::EVENT_SENDER, key(&event.sender, opts.event_idx), Vec::new());
    append(
        txn,
        opts.op,
        desc::EVENT_SENDER,
        origin_key(&event.sender, opts.event_idx),
        Vec::new(),
    );
}
