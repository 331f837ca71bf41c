use construct_db::Txn;

use super::{append, desc, WriteOpts};
use crate::event::{encode_idx, Event};

pub(super) fn index(txn: &mut Txn, event: &Event, opts: &WriteOpts) {
    append(
        txn,
        opts.op,
        desc::EVENT_IDX,
        event.event_id.as_bytes(),
        encode_idx(opts.event_idx),
    );
}
