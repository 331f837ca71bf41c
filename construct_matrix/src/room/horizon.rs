use construct_db::Txn;

use super::Events;
use crate::{
    dbs::{event_horizon, Appendix, RefTypes, WriteOpts},
    event::EventIdx,
    Dbs, Result, RoomId,
};

/// Unknown events which events of this room refer to
pub struct Horizon<'a> {
    dbs: &'a Dbs,
    room_id: &'a RoomId,
}

impl<'a> Horizon<'a> {
    pub fn new(dbs: &'a Dbs, room_id: &'a RoomId) -> Self {
        Self { dbs, room_id }
    }

    /// Visit `(event_id, referer)` for each horizon entry whose referer is
    /// in this room, until `f` returns false.
    pub fn for_each(&self, mut f: impl FnMut(&str, EventIdx) -> bool) -> Result<bool> {
        let mut entries = Vec::new();
        self.dbs.columns.event_horizon.cursor(b"").for_each(|key, _| {
            if let Some((event_id, referer)) = event_horizon::decode(key) {
                entries.push((event_id.to_string(), referer));
            }
            true
        });

        for (event_id, referer) in entries {
            if self.dbs.room_id_of(referer)?.as_ref() != Some(self.room_id) {
                continue;
            }

            if !f(&event_id, referer) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn count(&self) -> Result<usize> {
        let mut ret = 0;
        self.for_each(|_, _| {
            ret += 1;
            true
        })?;
        Ok(ret)
    }

    /// Write the references of every event of the room again, adding horizon
    /// entries for the targets still unknown. Returns the number of events
    /// visited.
    #[tracing::instrument(skip(self), fields(room_id = %self.room_id))]
    pub fn rebuild(&self) -> Result<usize> {
        let mut events = Events::new(self.dbs, self.room_id);
        let mut indices = Vec::new();
        events.bottom();
        events.for_each(|_, idx| {
            indices.push(idx);
            true
        });

        let mut txn = Txn::new();
        for &idx in &indices {
            let event = self.dbs.fetch(idx)?;
            let opts = WriteOpts {
                appendix: Appendix::EVENT_REFS | Appendix::EVENT_HORIZON,
                event_refs: RefTypes::all() - RefTypes::NEXT_STATE - RefTypes::PREV_STATE,
                horizon_resolve: RefTypes::empty(),
                ..self.dbs.write_opts().with_idx(idx)
            };
            self.dbs.write(&mut txn, &event, &opts)?;
        }

        self.dbs.database().commit(&txn)?;
        tracing::info!("Rebuilt horizon of {} from {} events", self.room_id, indices.len());
        Ok(indices.len())
    }
}
