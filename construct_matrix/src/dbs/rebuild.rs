use construct_db::{Op, Txn};

use super::{desc, Appendix, Dbs, RefTypes, WriteOpts};
use crate::{event::decode_idx, Error, Result};

impl Dbs {
    /// Re-derive the indices selected by `appendix` from the stored JSON of
    /// every event, in index order. Returns the number of events visited.
    ///
    /// State edges are left alone: they depend on the present state at the
    /// time each event was first written.
    #[tracing::instrument(skip(self), fields(appendix = %appendix))]
    pub fn rebuild(&self, appendix: Appendix) -> Result<usize> {
        let appendix = appendix - (Appendix::EVENT_ID | Appendix::EVENT_JSON);
        let mut count = 0;
        let mut cursor = self.columns.event_json.cursor(b"");

        while let Some(key) = cursor.key() {
            let idx = decode_idx(key).ok_or(Error::Corrupt(desc::EVENT_JSON))?;
            let event = self.fetch(idx)?;

            let opts = WriteOpts {
                appendix,
                event_refs: RefTypes::all() - RefTypes::NEXT_STATE - RefTypes::PREV_STATE,
                horizon_resolve: RefTypes::empty(),
                ..self.write_opts().with_idx(idx)
            };

            let mut txn = Txn::with_capacity(self.config.txn_reserve);
            self.write(&mut txn, &event, &opts)?;
            self.db.commit(&txn)?;

            count += 1;
            if count % 1024 == 0 {
                tracing::info!("Rebuilt {} events, at index {}", count, idx);
            }

            cursor.next();
        }

        tracing::info!("Rebuilt {} for {} events", appendix, count);
        Ok(count)
    }

    /// Drop the horizon and derive it again from every event's references.
    #[tracing::instrument(skip(self))]
    pub fn rebuild_horizon(&self) -> Result<usize> {
        let mut txn = Txn::new();
        self.columns.event_horizon.cursor(b"").for_each(|key, _| {
            txn.delete(desc::EVENT_HORIZON, key);
            true
        });

        let dropped = txn.len();
        self.db.commit(&txn)?;
        tracing::info!("Dropped {} horizon entries", dropped);

        self.rebuild(Appendix::EVENT_REFS | Appendix::EVENT_HORIZON)
    }

    /// Remove every index of one stored event, leaving its JSON.
    pub fn unindex(&self, idx: u64) -> Result<usize> {
        let event = self.fetch(idx)?;
        let opts = WriteOpts {
            appendix: Appendix::all() - Appendix::EVENT_JSON,
            ..self.write_opts().with_idx(idx).with_op(Op::Delete)
        };

        let mut txn = Txn::with_capacity(self.config.txn_reserve);
        let count = self.write(&mut txn, &event, &opts)?;
        self.db.commit(&txn)?;
        Ok(count)
    }
}
