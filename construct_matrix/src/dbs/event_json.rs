use construct_db::Txn;

use super::{append, desc, WriteOpts};
use crate::{
    event::{encode_idx, Event},
    Result,
};

pub(super) fn index(txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
    let json = match (&event.source, opts.json_source) {
        (Some(source), true) => source.clone(),
        _ => event.to_json()?,
    };

    append(txn, opts.op, desc::EVENT_JSON, encode_idx(opts.event_idx), json);
    Ok(())
}
