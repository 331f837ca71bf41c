use construct_db::{Op, Txn};

use super::{append, desc, Appendix, Dbs, RefTypes, WriteOpts};
use crate::{
    event::{decode_idx, encode_idx, Event, EventIdx},
    EventId, Result,
};

/// `event_id \0 referer`
pub fn key(event_id: &EventId, referer: EventIdx) -> Vec<u8> {
    let mut key = prefix(event_id);
    key.extend_from_slice(&encode_idx(referer));
    key
}

pub fn prefix(event_id: &EventId) -> Vec<u8> {
    let mut key = event_id.as_bytes().to_vec();
    key.push(0);
    key
}

/// `(event_id, referer)` of a key
pub fn decode(key: &[u8]) -> Option<(&str, EventIdx)> {
    let at = key.iter().position(|&b| b == 0)?;
    let event_id = std::str::from_utf8(&key[..at]).ok()?;
    Some((event_id, decode_idx(&key[at + 1..])?))
}

/// Record that `referer` refers to the unknown `event_id`.
pub(super) fn index(txn: &mut Txn, op: Op, event_id: &EventId, referer: EventIdx) {
    tracing::trace!("Horizon {:?} {} <- {}", op, event_id, referer);
    append(txn, op, desc::EVENT_HORIZON, key(event_id, referer), Vec::new());
}

/// Indices of the events waiting for `event_id`
pub fn referers(dbs: &Dbs, event_id: &EventId) -> Vec<EventIdx> {
    let mut ret = Vec::new();
    let mut cursor = dbs.columns.event_horizon.cursor(&prefix(event_id));
    cursor.for_each(|key, _| {
        ret.extend(decode(key).map(|(_, idx)| idx));
        true
    });
    ret
}

pub fn has_referers(dbs: &Dbs, event_id: &EventId) -> bool {
    dbs.columns.event_horizon.cursor(&prefix(event_id)).valid()
}

/// Now that `event` is here, re-index the edges of every event which was
/// waiting for it, and clear their horizon entries.
pub(super) fn resolve(dbs: &Dbs, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
    let referers = referers(dbs, &event.event_id);
    if referers.is_empty() {
        return Ok(());
    }

    let appendix = opts.appendix
        & (Appendix::EVENT_REFS
            | Appendix::EVENT_HORIZON
            | Appendix::ROOM_REDACT
            | Appendix::ROOM_HEAD_REFS);

    for referer in referers {
        match dbs.fetch_opt(referer)? {
            Some(referer_event) => {
                let sub = WriteOpts {
                    op: Op::Set,
                    event_idx: referer,
                    appendix,
                    event_refs: opts.horizon_resolve,
                    horizon_resolve: RefTypes::empty(),
                    blacklist: false,
                    allow_queries: opts.allow_queries,
                    json_source: false,
                };

                dbs.write(txn, &referer_event, &sub)?;
                tracing::debug!(
                    "Resolved horizon {} <- {}",
                    event.event_id,
                    referer_event.event_id
                );
            }
            None => tracing::warn!(
                "Horizon entry for {} names unknown referer {}",
                event.event_id,
                referer
            ),
        }

        index(txn, Op::Delete, &event.event_id, referer);
    }

    Ok(())
}
