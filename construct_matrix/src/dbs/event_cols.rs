use construct_db::Txn;
use strum::IntoEnumIterator;

use super::{append, WriteOpts};
use crate::{
    event::{encode_idx, Event, Property},
    Result,
};

/// One row per present property, in each property's own column.
pub(super) fn index(txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
    let key = encode_idx(opts.event_idx);
    for prop in Property::iter() {
        if let Some(value) = prop.value(event)? {
            append(txn, opts.op, prop.column(), key, value);
        }
    }
    Ok(())
}
