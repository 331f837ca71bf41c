use construct_db::{Op, Txn};

use super::{
    append, desc, event_horizon, room_state, room_state_space, Appendix, Dbs, RefType, WriteOpts,
};
use crate::{
    event::{decode_idx, encode_idx, Event, EventIdx},
    EventId, Result,
};

/// Bit position of the reference type within the referer half of a key
pub const REF_SHIFT: u32 = 56;

/// Bits of the referer half holding the referer's index
pub const REF_MASK: u64 = (1 << REF_SHIFT) - 1;

/// `target(8) | type << 56 | referer(8)`
pub fn key(target: EventIdx, kind: RefType, referer: EventIdx) -> [u8; 16] {
    debug_assert!(referer <= REF_MASK);
    let mut key = [0; 16];
    key[..8].copy_from_slice(&encode_idx(target));
    key[8..].copy_from_slice(&encode_idx(((kind as u64) << REF_SHIFT) | (referer & REF_MASK)));
    key
}

/// Prefix of every edge pointing at `target`, optionally of one type
pub fn prefix(target: EventIdx, kind: Option<RefType>) -> Vec<u8> {
    let mut key = encode_idx(target).to_vec();
    if let Some(kind) = kind {
        key.push(kind as u8);
    }
    key
}

/// `(target, type, referer)` of a key
pub fn decode(key: &[u8]) -> Option<(EventIdx, RefType, EventIdx)> {
    if key.len() != 16 {
        return None;
    }

    let target = decode_idx(&key[..8])?;
    let rest = decode_idx(&key[8..])?;
    let kind = RefType::try_from((rest >> REF_SHIFT) as u8).ok()?;
    Some((target, kind, rest & REF_MASK))
}

fn edge(txn: &mut Txn, op: Op, target: EventIdx, kind: RefType, referer: EventIdx) {
    append(txn, op, desc::EVENT_REFS, key(target, kind, referer), Vec::new());
}

/// Write an edge from this event to `target_id`, or remember the id in the
/// horizon if it is not known yet.
fn edge_to(
    dbs: &Dbs,
    txn: &mut Txn,
    event: &Event,
    opts: &WriteOpts,
    kind: RefType,
    target_id: &EventId,
) -> Result<()> {
    let target = dbs.find_event_idx(txn, target_id, opts)?;
    if target != 0 {
        edge(txn, opts.op, target, kind, opts.event_idx);
    } else if opts.appendix.contains(Appendix::EVENT_HORIZON) {
        event_horizon::index(txn, opts.op, target_id, opts.event_idx);
    } else {
        tracing::warn!(
            "{} {} references unknown {}; not indexed",
            event.event_id,
            kind,
            target_id
        );
    }
    Ok(())
}

pub(super) fn index(dbs: &Dbs, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
    debug_assert!(opts.appendix.contains(Appendix::EVENT_REFS));

    if opts.op == Op::Delete && opts.appendix.contains(Appendix::EVENT_HORIZON) {
        index_delete_horizon(dbs, txn, event, opts);
    }

    if opts.event_refs.has(RefType::Next) {
        for prev in &event.prev_events {
            edge_to(dbs, txn, event, opts, RefType::Next, prev)?;
        }
    }

    if opts.event_refs.has(RefType::NextAuth) {
        for auth in &event.auth_events {
            edge_to(dbs, txn, event, opts, RefType::NextAuth, auth)?;
        }
    }

    if opts.event_refs.has(RefType::NextState) || opts.event_refs.has(RefType::PrevState) {
        index_state(dbs, txn, event, opts)?;
    }

    if opts.event_refs.has(RefType::MReceiptMRead) && event.kind == "ircd.read" {
        if let Some(target) = event.content_str(&["event_id"]) {
            match EventId::new(target) {
                Ok(target) => edge_to(dbs, txn, event, opts, RefType::MReceiptMRead, &target)?,
                Err(e) => tracing::debug!("{}: {}", event.event_id, e),
            }
        }
    }

    if opts.event_refs.has(RefType::MRelates) {
        let relates = event.content_str(&["m.relates_to", "event_id"]);
        let reply = match event.kind.as_str() {
            "m.room.message" => event.content_str(&["m.relates_to", "m.in_reply_to", "event_id"]),
            _ => None,
        };

        for target in relates.into_iter().chain(reply) {
            match EventId::new(target) {
                Ok(target) => edge_to(dbs, txn, event, opts, RefType::MRelates, &target)?,
                Err(e) => tracing::debug!("{}: {}", event.event_id, e),
            }
        }
    }

    if opts.event_refs.has(RefType::MRoomRedaction) && event.kind == "m.room.redaction" {
        if let Some(target) = &event.redacts {
            edge_to(dbs, txn, event, opts, RefType::MRoomRedaction, target)?;
        }
    }

    Ok(())
}

/// Edges between a state event and the state it replaces in the room.
fn index_state(dbs: &Dbs, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
    let (room_id, state_key) = match (&event.room_id, &event.state_key) {
        (Some(room_id), Some(state_key)) if opts.allow_queries => (room_id, state_key),
        _ => return Ok(()),
    };

    let prev = match opts.op {
        Op::Set => match room_state::get(dbs, txn, room_id, &event.kind, state_key)? {
            Some(prev) if prev < opts.event_idx => Some(prev),
            _ => None,
        },
        _ => replaced(dbs, event, opts),
    };

    let prev = match prev {
        Some(prev) => prev,
        None => return Ok(()),
    };

    if opts.event_refs.has(RefType::NextState) {
        edge(txn, opts.op, prev, RefType::NextState, opts.event_idx);
    }

    if opts.event_refs.has(RefType::PrevState) {
        edge(txn, opts.op, opts.event_idx, RefType::PrevState, prev);
    }

    Ok(())
}

/// The state event that `event` replaced when it was written, read back
/// from the committed edges of that write.
pub(super) fn replaced(dbs: &Dbs, event: &Event, opts: &WriteOpts) -> Option<EventIdx> {
    let mut found = None;
    let mut cursor = dbs
        .columns
        .event_refs
        .cursor(&prefix(opts.event_idx, Some(RefType::PrevState)));
    cursor.for_each(|key, _| match decode(key) {
        Some((_, RefType::PrevState, prev)) => {
            found = Some(prev);
            false
        }
        _ => true,
    });

    if found.is_some() {
        return found;
    }

    // no PREV_STATE edge; find the earlier version of this state holding a
    // NEXT_STATE edge to the event
    let (room_id, state_key) = match (&event.room_id, &event.state_key) {
        (Some(room_id), Some(state_key)) => (room_id, state_key),
        _ => return None,
    };

    let mut earlier = Vec::new();
    let mut space = dbs
        .columns
        .room_state_space
        .cursor(&room_state_space::prefix(room_id, &event.kind, state_key));
    space.for_each(|key, _| {
        if let Some((_, _, _, idx)) = room_state_space::decode(key) {
            if idx < opts.event_idx {
                earlier.push(idx);
            }
        }
        true
    });

    earlier.into_iter().find(|&prev| {
        dbs.columns
            .event_refs
            .has(&key(prev, RefType::NextState, opts.event_idx))
    })
}

/// Before this event's edges go, put the events referencing it back in the
/// horizon so that the edges return if it is written again.
fn index_delete_horizon(dbs: &Dbs, txn: &mut Txn, event: &Event, opts: &WriteOpts) {
    let mut referers = Vec::new();
    let mut cursor = dbs.columns.event_refs.cursor(&prefix(opts.event_idx, None));
    cursor.for_each(|key, _| {
        if let Some((_, kind, referer)) = decode(key) {
            // a PREV_STATE edge at this index points the other way
            if opts.event_refs.has(kind) && kind != RefType::PrevState {
                referers.push(referer);
            }
        }
        true
    });

    for referer in referers {
        event_horizon::index(txn, Op::Set, &event.event_id, referer);
    }
}
