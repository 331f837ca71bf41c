use construct_db::{Op, Txn};

use super::{append, desc, event_horizon, Dbs, RefType, WriteOpts};
use crate::{
    event::{encode_idx, Event, Refs},
    EventId, Result, RoomId,
};

pub fn prefix(room_id: &RoomId) -> Vec<u8> {
    let mut key = room_id.as_bytes().to_vec();
    key.push(0);
    key
}

/// `room_id \0 event_id`
pub fn key(room_id: &RoomId, event_id: &EventId) -> Vec<u8> {
    let mut key = prefix(room_id);
    key.extend_from_slice(event_id.as_bytes());
    key
}

/// The event id at the end of a key
pub fn decode(key: &[u8]) -> Option<&str> {
    let at = key.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&key[at + 1..]).ok()
}

/// Add the event to the frontier, unless events already known refer to it.
pub(super) fn index(dbs: &Dbs, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
    let room_id = match &event.room_id {
        Some(room_id) => room_id,
        None => return Ok(()),
    };

    if opts.op == Op::Set && opts.allow_queries && event_horizon::has_referers(dbs, &event.event_id) {
        tracing::debug!("{} is already referenced; not a head", event.event_id);
        return Ok(());
    }

    append(
        txn,
        opts.op,
        desc::ROOM_HEAD,
        key(room_id, &event.event_id),
        encode_idx(opts.event_idx),
    );
    Ok(())
}

/// Remove the events this one references from the frontier. Removing the
/// event puts back those it leaves without a referer.
pub(super) fn index_refs(dbs: &Dbs, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
    let room_id = match &event.room_id {
        Some(room_id) => room_id,
        None => return Ok(()),
    };

    for prev in &event.prev_events {
        if opts.op == Op::Set {
            append(txn, Op::Delete, desc::ROOM_HEAD, key(room_id, prev), Vec::new());
            continue;
        }

        if !opts.allow_queries {
            continue;
        }

        let prev_idx = dbs.find_event_idx(txn, prev, opts)?;
        if prev_idx == 0 {
            continue;
        }

        let alone = Refs::new(dbs, prev_idx)
            .for_each(Some(RefType::Next), |referer, _| referer == opts.event_idx);
        if alone {
            append(txn, Op::Set, desc::ROOM_HEAD, key(room_id, prev), encode_idx(prev_idx));
        }
    }

    Ok(())
}
