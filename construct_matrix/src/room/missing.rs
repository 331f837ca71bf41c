use super::Events;
use crate::{event::EventIdx, Dbs, EventId, Result, RoomId};

/// Events the room's known events refer to as prev_events but which are
/// themselves unknown
pub struct Missing<'a> {
    dbs: &'a Dbs,
    room_id: &'a RoomId,
}

impl<'a> Missing<'a> {
    pub fn new(dbs: &'a Dbs, room_id: &'a RoomId) -> Self {
        Self { dbs, room_id }
    }

    fn visit(
        &self,
        idx: EventIdx,
        f: &mut dyn FnMut(&EventId, EventIdx) -> bool,
    ) -> Result<bool> {
        for prev in self.dbs.prev_events_of(idx)? {
            if !self.dbs.exists(&prev)? && !f(&prev, idx) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn walk(
        &self,
        reverse: bool,
        f: &mut dyn FnMut(&EventId, EventIdx) -> bool,
    ) -> Result<bool> {
        let mut events = Events::new(self.dbs, self.room_id);
        let mut err = None;
        let mut visit = |_: u64, idx: EventIdx| match self.visit(idx, f) {
            Ok(more) => more,
            Err(e) => {
                err = Some(e);
                false
            }
        };

        let done = match reverse {
            false => events.bottom() && events.for_each(&mut visit),
            true => events.top() && events.rfor_each(&mut visit),
        };

        match err {
            Some(e) => Err(e),
            None => Ok(done || !events.valid()),
        }
    }

    /// Visit `(missing event id, referer)` from the bottom of the timeline
    /// up until `f` returns false.
    pub fn for_each(&self, mut f: impl FnMut(&EventId, EventIdx) -> bool) -> Result<bool> {
        self.walk(false, &mut f)
    }

    /// As [`for_each`](Self::for_each), from the top down
    pub fn rfor_each(&self, mut f: impl FnMut(&EventId, EventIdx) -> bool) -> Result<bool> {
        self.walk(true, &mut f)
    }

    pub fn count(&self) -> Result<usize> {
        let mut ret = 0;
        self.for_each(|_, _| {
            ret += 1;
            true
        })?;
        Ok(ret)
    }
}
