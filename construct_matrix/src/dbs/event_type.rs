use construct_db::Txn;

use super::{append, desc, WriteOpts};
use crate::event::{decode_idx, encode_idx, Event, EventIdx, TYPE_MAX_SIZE};

pub const KEY_MAX_SIZE: usize = TYPE_MAX_SIZE + 1 + 8;

/// `type \0 idx`
pub fn key(kind: &str, idx: EventIdx) -> Vec<u8> {
    let mut key = Vec::with_capacity(kind.len() + 1 + 8);
    key.extend_from_slice(kind.as_bytes());
    key.push(0);
    key.extend_from_slice(&encode_idx(idx));
    key
}

/// Prefix of every key for `kind`
pub fn prefix(kind: &str) -> Vec<u8> {
    let mut key = kind.as_bytes().to_vec();
    key.push(0);
    key
}

pub fn decode(key: &[u8]) -> Option<(&str, EventIdx)> {
    let at = key.iter().position(|&b| b == 0)?;
    let kind = std::str::from_utf8(&key[..at]).ok()?;
    Some((kind, decode_idx(&key[at + 1..])?))
}

pub(super) fn index(txn: &mut Txn, event: &Event, opts: &WriteOpts) {
    debug_assert!(event.kind.len() <= TYPE_MAX_SIZE);
    append(txn, opts.op, desc::EVENT_TYPE, key(&event.kind, opts.event_idx), Vec::new());
}
