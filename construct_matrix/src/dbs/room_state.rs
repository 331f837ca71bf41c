use construct_db::{Op, Txn};

use super::{append, desc, event_refs, Dbs, WriteOpts};
use crate::{
    event::{decode_idx, encode_idx, Event, EventIdx, STATE_KEY_MAX_SIZE, TYPE_MAX_SIZE},
    id, Error, Result, RoomId,
};

pub const KEY_MAX_SIZE: usize = id::MAX_SIZE + 1 + TYPE_MAX_SIZE + 1 + STATE_KEY_MAX_SIZE;

pub fn prefix(room_id: &RoomId) -> Vec<u8> {
    let mut key = room_id.as_bytes().to_vec();
    key.push(0);
    key
}

/// `room_id \0 type \0`
pub fn type_prefix(room_id: &RoomId, kind: &str) -> Vec<u8> {
    let mut key = prefix(room_id);
    key.extend_from_slice(kind.as_bytes());
    key.push(0);
    key
}

/// `room_id \0 type \0 state_key`
pub fn key(room_id: &RoomId, kind: &str, state_key: &str) -> Vec<u8> {
    let mut key = type_prefix(room_id, kind);
    key.extend_from_slice(state_key.as_bytes());
    key
}

/// `(type, state_key)` of a key
pub fn decode(key: &[u8]) -> Option<(&str, &str)> {
    let mut parts = key.splitn(3, |&b| b == 0);
    let _room_id = parts.next()?;
    let kind = std::str::from_utf8(parts.next()?).ok()?;
    let state_key = std::str::from_utf8(parts.next()?).ok()?;
    Some((kind, state_key))
}

/// The present state event for `(type, state_key)`, seeing writes staged in
/// `txn` before committed ones.
pub fn get(
    dbs: &Dbs,
    txn: &Txn,
    room_id: &RoomId,
    kind: &str,
    state_key: &str,
) -> Result<Option<EventIdx>> {
    let key = key(room_id, kind, state_key);
    let value = match txn.val(desc::ROOM_STATE, &key) {
        Some(staged) => staged.map(<[u8]>::to_vec),
        None => dbs.columns.room_state.get_opt(&key),
    };

    value
        .map(|v| decode_idx(&v).ok_or(Error::Corrupt(desc::ROOM_STATE)))
        .transpose()
}

/// What removing a state event leaves as the present state of its key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Undo {
    /// A later event holds the key
    Keep,
    /// The event it replaced is present again
    Restore(EventIdx),
    Clear,
}

/// Decide how unwriting `event` changes the present state.
pub(super) fn undo(dbs: &Dbs, txn: &Txn, event: &Event, opts: &WriteOpts) -> Result<Undo> {
    let (room_id, state_key) = match (&event.room_id, &event.state_key) {
        (Some(room_id), Some(state_key)) => (room_id, state_key),
        _ => return Ok(Undo::Keep),
    };

    if !opts.allow_queries {
        return Ok(Undo::Clear);
    }

    if get(dbs, txn, room_id, &event.kind, state_key)? != Some(opts.event_idx) {
        return Ok(Undo::Keep);
    }

    Ok(match event_refs::replaced(dbs, event, opts) {
        Some(prev) if dbs.columns.event_json.has(&encode_idx(prev)) => Undo::Restore(prev),
        _ => Undo::Clear,
    })
}

/// `undo` is consulted only when `opts.op` removes the event.
pub(super) fn index(txn: &mut Txn, event: &Event, opts: &WriteOpts, undo: Undo) {
    let (room_id, state_key) = match (&event.room_id, &event.state_key) {
        (Some(room_id), Some(state_key)) => (room_id, state_key),
        _ => return,
    };

    let key = key(room_id, &event.kind, state_key);

    if opts.op != Op::Set {
        match undo {
            Undo::Keep => tracing::debug!("{} is not present state; kept", event.event_id),
            Undo::Restore(prev) => append(txn, Op::Set, desc::ROOM_STATE, key, encode_idx(prev)),
            Undo::Clear => append(txn, Op::Delete, desc::ROOM_STATE, key, Vec::new()),
        }
        return;
    }

    // a redaction of this very event, staged while resolving the horizon
    if txn.val(desc::ROOM_STATE, &key) == Some(None) {
        tracing::debug!("{} was redacted before it arrived", event.event_id);
        return;
    }

    append(txn, Op::Set, desc::ROOM_STATE, key, encode_idx(opts.event_idx));
}
