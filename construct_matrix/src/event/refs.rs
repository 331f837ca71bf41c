//! Reverse edges of the event graph: which events refer to a given one.

use crate::{
    dbs::{event_refs, RefType},
    event::EventIdx,
    Dbs,
};

/// The events referring to one event, by kind of reference
pub struct Refs<'a> {
    dbs: &'a Dbs,
    idx: EventIdx,
}

impl<'a> Refs<'a> {
    pub fn new(dbs: &'a Dbs, idx: EventIdx) -> Self {
        Self { dbs, idx }
    }

    pub fn idx(&self) -> EventIdx {
        self.idx
    }

    /// Visit referers, optionally of one kind only, until `f` returns
    /// false. Returns whether every referer was visited.
    pub fn for_each(
        &self,
        kind: Option<RefType>,
        mut f: impl FnMut(EventIdx, RefType) -> bool,
    ) -> bool {
        let prefix = event_refs::prefix(self.idx, kind);
        let mut cursor = self.dbs.columns.event_refs.cursor(&prefix);
        cursor.for_each(|key, _| match event_refs::decode(key) {
            Some((_, kind, referer)) => f(referer, kind),
            None => {
                tracing::warn!("Malformed event_refs key {}", hex::encode(key));
                true
            }
        })
    }

    pub fn has(&self, kind: RefType, referer: EventIdx) -> bool {
        let key = event_refs::key(self.idx, kind, referer);
        self.dbs.columns.event_refs.has(&key)
    }

    pub fn has_any(&self, kind: Option<RefType>) -> bool {
        !self.for_each(kind, |_, _| false)
    }

    pub fn count(&self, kind: Option<RefType>) -> usize {
        let mut ret = 0;
        self.for_each(kind, |_, _| {
            ret += 1;
            true
        });
        ret
    }

    pub fn referers(&self, kind: Option<RefType>) -> Vec<EventIdx> {
        let mut ret = Vec::new();
        self.for_each(kind, |referer, _| {
            ret.push(referer);
            true
        });
        ret
    }
}
