use construct_db::Op;
use serde::{Deserialize, Serialize};

use super::{Appendix, RefTypes};
use crate::event::EventIdx;

/// Options for one [`Dbs::write`](super::Dbs::write)
#[derive(Debug, Clone)]
pub struct WriteOpts {
    /// `Set` to index, `Delete` to remove exactly what indexing added
    pub op: Op,
    /// Index of the event being written. Zero is only valid with `blacklist`.
    pub event_idx: EventIdx,
    pub appendix: Appendix,
    /// Which kinds of edge `EVENT_REFS` writes
    pub event_refs: RefTypes,
    /// Which kinds of edge `EVENT_HORIZON_RESOLVE` completes
    pub horizon_resolve: RefTypes,
    /// Record the event id as known-bad instead of indexing it
    pub blacklist: bool,
    /// Permit reads of committed indices while building the transaction.
    /// Without them only the transaction itself is consulted.
    pub allow_queries: bool,
    /// Store the event's source text verbatim in `event_json`
    pub json_source: bool,
}

impl Default for WriteOpts {
    fn default() -> Self {
        Self {
            op: Op::Set,
            event_idx: 0,
            appendix: Appendix::all(),
            event_refs: RefTypes::all(),
            horizon_resolve: RefTypes::all(),
            blacklist: false,
            allow_queries: true,
            json_source: false,
        }
    }
}

impl WriteOpts {
    pub fn new(event_idx: EventIdx) -> Self {
        Self {
            event_idx,
            ..Default::default()
        }
    }

    pub fn with_idx(mut self, event_idx: EventIdx) -> Self {
        self.event_idx = event_idx;
        self
    }

    pub fn with_op(mut self, op: Op) -> Self {
        self.op = op;
        self
    }

    pub fn with_appendix(mut self, appendix: Appendix) -> Self {
        self.appendix = appendix;
        self
    }
}

/// Tunables for the write pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbsConfig {
    /// Warm the lookups an indexer is about to make
    pub prefetch_enable: bool,
    /// Default for [`WriteOpts::allow_queries`]
    pub allow_queries: bool,
    /// Deltas reserved up front in each event transaction
    pub txn_reserve: usize,
}

impl Default for DbsConfig {
    fn default() -> Self {
        Self {
            prefetch_enable: true,
            allow_queries: true,
            txn_reserve: 64,
        }
    }
}
