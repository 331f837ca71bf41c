use construct_db::Txn;

use super::{append, desc, Dbs, WriteOpts};
use crate::{
    event::{decode_idx, encode_idx, Event, EventIdx},
    state, Result, RoomId,
};

/// `state_key \0 type \0 room_id \0 depth idx`
pub fn key(state_key: &str, kind: &str, room_id: &RoomId, depth: u64, idx: EventIdx) -> Vec<u8> {
    let mut key = prefix(state_key);
    key.extend_from_slice(kind.as_bytes());
    key.push(0);
    key.extend_from_slice(room_id.as_bytes());
    key.push(0);
    key.extend_from_slice(&depth.to_be_bytes());
    key.extend_from_slice(&encode_idx(idx));
    key
}

pub fn prefix(state_key: &str) -> Vec<u8> {
    let mut key = state_key.as_bytes().to_vec();
    key.push(0);
    key
}

/// `(type, room_id, depth, idx)` of a key
pub fn decode(key: &[u8]) -> Option<(&str, &str, u64, EventIdx)> {
    let tail = key.len().checked_sub(16)?;
    let mut parts = key[..tail].split(|&b| b == 0);
    let _state_key = parts.next()?;
    let kind = std::str::from_utf8(parts.next()?).ok()?;
    let room_id = std::str::from_utf8(parts.next()?).ok()?;
    Some((
        kind,
        room_id,
        decode_idx(&key[tail..tail + 8])?,
        decode_idx(&key[tail + 8..])?,
    ))
}

pub(super) fn index(dbs: &Dbs, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
    let (room_id, state_key) = match (&event.room_id, &event.state_key) {
        (Some(room_id), Some(state_key)) => (room_id, state_key),
        _ => return Ok(()),
    };

    append(
        txn,
        opts.op,
        desc::EVENT_STATE,
        key(state_key, &event.kind, room_id, event.depth, opts.event_idx),
        Vec::new(),
    );

    state::index(dbs, txn, event, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes() {
        let room = RoomId::new("!r:x").unwrap();
        let k = key("@a:x", "m.room.member", &room, 4, 9);
        assert_eq!(decode(&k), Some(("m.room.member", "!r:x", 4, 9)));
        assert!(k.starts_with(&prefix("@a:x")));
    }
}
