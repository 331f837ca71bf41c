use construct_db::{Op, Txn};

use super::{append, desc, event_horizon, room_state, Appendix, Dbs, WriteOpts};
use crate::{
    event::{encode_idx, Event, Property},
    Error, Result,
};

/// A staged property of `idx` if the transaction has one, else the stored one.
fn property(dbs: &Dbs, txn: &Txn, idx: u64, prop: Property) -> Result<Option<String>> {
    let bytes = match txn.val(prop.column(), &encode_idx(idx)) {
        Some(staged) => staged.map(<[u8]>::to_vec),
        None => dbs.get_column(idx, prop)?,
    };

    bytes
        .map(|b| String::from_utf8(b).map_err(|_| Error::Corrupt(prop.column())))
        .transpose()
}

/// A redaction of a state event removes it from the present state, if it is
/// still the present state for its key.
pub(super) fn index(dbs: &Dbs, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
    let (room_id, target_id) = match (&event.room_id, &event.redacts) {
        (Some(room_id), Some(target_id)) => (room_id, target_id),
        _ => return Ok(()),
    };

    let target = dbs.find_event_idx(txn, target_id, opts)?;
    if target == 0 {
        if opts.appendix.contains(Appendix::EVENT_HORIZON) {
            event_horizon::index(txn, opts.op, target_id, opts.event_idx);
        }
        return Ok(());
    }

    let state_key = match property(dbs, txn, target, Property::StateKey)? {
        Some(state_key) => state_key,
        None => return Ok(()),
    };

    let kind = property(dbs, txn, target, Property::Type)?.ok_or(Error::Corrupt("type"))?;
    let present = room_state::get(dbs, txn, room_id, &kind, &state_key)?;
    if present.is_some() && present != Some(target) {
        tracing::debug!("{} redacts {}, which is no longer present state", event.event_id, target_id);
        return Ok(());
    }

    // only the forward direction removes; undoing a redaction is a rebuild
    if opts.op == Op::Set {
        append(
            txn,
            Op::Delete,
            desc::ROOM_STATE,
            room_state::key(room_id, &kind, &state_key),
            Vec::new(),
        );
    }

    Ok(())
}
