use construct_db::{Op, Txn};

use super::{append, desc, room_state::Undo, Dbs, WriteOpts};
use crate::{
    event::{encode_idx, Event},
    Result, RoomId, UserId,
};

pub fn prefix(room_id: &RoomId) -> Vec<u8> {
    let mut key = room_id.as_bytes().to_vec();
    key.push(0);
    key
}

/// `room_id \0 origin`
pub fn origin_prefix(room_id: &RoomId, origin: &str) -> Vec<u8> {
    let mut key = prefix(room_id);
    key.extend_from_slice(origin.as_bytes());
    key
}

/// `room_id \0 origin user_id`
pub fn key(room_id: &RoomId, user_id: &UserId) -> Vec<u8> {
    let mut key = origin_prefix(room_id, user_id.host());
    key.extend_from_slice(user_id.as_bytes());
    key
}

/// `(origin, user_id)` of a key
pub fn decode(key: &[u8]) -> Option<(&str, &str)> {
    let at = key.iter().position(|&b| b == 0)?;
    let rest = std::str::from_utf8(&key[at + 1..]).ok()?;
    let sigil = rest.find('@')?;
    Some(rest.split_at(sigil))
}

/// Joins add the member; any other membership removes it. Removing an
/// event that was present restores the membership it replaced.
pub(super) fn index(dbs: &Dbs, txn: &mut Txn, event: &Event, opts: &WriteOpts, undo: Undo) -> Result<()> {
    let room_id = match &event.room_id {
        Some(room_id) => room_id,
        None => return Ok(()),
    };

    let user_id = match event.state_key.as_deref().map(UserId::new) {
        Some(Ok(user_id)) => user_id,
        _ => {
            tracing::debug!("{} has no member in its state_key", event.event_id);
            return Ok(());
        }
    };

    let key = key(room_id, &user_id);
    let joined = match (opts.op, undo) {
        (Op::Set, _) => (event.membership() == Some("join")).then_some(opts.event_idx),
        (_, Undo::Keep) => return Ok(()),
        (_, Undo::Restore(prev)) => {
            (dbs.fetch(prev)?.membership() == Some("join")).then_some(prev)
        }
        (_, Undo::Clear) => None,
    };

    match joined {
        Some(idx) => append(txn, Op::Set, desc::ROOM_JOINED, key, encode_idx(idx)),
        None => append(txn, Op::Delete, desc::ROOM_JOINED, key, Vec::new()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes() {
        let room = RoomId::new("!r:x").unwrap();
        let user = UserId::new("@a:y.org").unwrap();
        let k = key(&room, &user);
        assert_eq!(k, b"!r:x\0y.org@a:y.org");
        assert_eq!(decode(&k), Some(("y.org", "@a:y.org")));
    }
}
