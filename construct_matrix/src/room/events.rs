use construct_db::Cursor;

use crate::{
    dbs::room_events,
    event::{encode_idx, Event, EventIdx},
    Dbs, EventId, Result, RoomId,
};

/// A position in a room's timeline, ordered by `(depth, idx)`.
///
/// Moving the cursor only reads the index; the event itself is fetched when
/// asked for.
pub struct Events<'a> {
    dbs: &'a Dbs,
    room_id: &'a RoomId,
    cursor: Cursor,
}

impl<'a> Events<'a> {
    /// A cursor at the top of the timeline
    pub fn new(dbs: &'a Dbs, room_id: &'a RoomId) -> Self {
        let mut cursor = dbs.columns.room_events.cursor(&room_events::prefix(room_id));
        cursor.seek_last();
        Self {
            dbs,
            room_id,
            cursor,
        }
    }

    pub fn room_id(&self) -> &'a RoomId {
        self.room_id
    }

    /// The deepest event
    pub fn top(&mut self) -> bool {
        self.cursor.seek_last()
    }

    /// The shallowest event
    pub fn bottom(&mut self) -> bool {
        self.cursor.seek_first()
    }

    /// The first event at or above `depth`
    pub fn seek(&mut self, depth: u64) -> bool {
        self.cursor.seek(&room_events::key(self.room_id, depth, 0))
    }

    /// The last event at or below `depth`
    pub fn seek_rev(&mut self, depth: u64) -> bool {
        self.cursor
            .seek_rev(&room_events::key(self.room_id, depth, u64::MAX))
    }

    /// Position at a known event of this room.
    pub fn seek_idx(&mut self, idx: EventIdx) -> Result<bool> {
        let depth = self.dbs.depth_of(idx)?;
        let found = self.cursor.seek(&room_events::key(self.room_id, depth, idx));
        Ok(found && self.event_idx() == Some(idx))
    }

    pub fn seek_event(&mut self, event_id: &EventId) -> Result<bool> {
        match self.dbs.index_opt(event_id)? {
            Some(idx) => self.seek_idx(idx),
            None => Ok(false),
        }
    }

    /// Step towards the top.
    pub fn next(&mut self) -> bool {
        self.cursor.next()
    }

    /// Step towards the bottom.
    pub fn prev(&mut self) -> bool {
        self.cursor.prev()
    }

    pub fn valid(&self) -> bool {
        self.cursor.valid()
    }

    fn position(&self) -> Option<(u64, EventIdx)> {
        self.cursor.key().and_then(room_events::decode)
    }

    pub fn depth(&self) -> Option<u64> {
        self.position().map(|(depth, _)| depth)
    }

    pub fn event_idx(&self) -> Option<EventIdx> {
        self.position().map(|(_, idx)| idx)
    }

    pub fn event_id(&self) -> Result<EventId> {
        self.dbs.event_id_of(self.current()?)
    }

    /// The event at the cursor
    pub fn fetch(&self) -> Result<Event> {
        self.dbs.fetch(self.current()?)
    }

    fn current(&self) -> Result<EventIdx> {
        self.event_idx()
            .ok_or_else(|| crate::Error::not_found(format!("event in {}", self.room_id)))
    }

    /// Visit `(depth, idx)` from the cursor towards the top until `f`
    /// returns false.
    pub fn for_each(&mut self, mut f: impl FnMut(u64, EventIdx) -> bool) -> bool {
        self.cursor.for_each(|key, _| match room_events::decode(key) {
            Some((depth, idx)) => f(depth, idx),
            None => true,
        })
    }

    /// As [`for_each`](Self::for_each), towards the bottom
    pub fn rfor_each(&mut self, mut f: impl FnMut(u64, EventIdx) -> bool) -> bool {
        self.cursor.rfor_each(|key, _| match room_events::decode(key) {
            Some((depth, idx)) => f(depth, idx),
            None => true,
        })
    }

    /// Number of events deeper than `start` and no deeper than `end`
    pub fn count(&mut self, start: u64, end: u64) -> usize {
        let mut ret = 0;
        if start >= end || !self.seek(start.saturating_add(1)) {
            return ret;
        }

        self.for_each(|depth, _| {
            if depth > end {
                return false;
            }
            ret += 1;
            true
        });
        ret
    }

    /// Warm the bodies of the events between two depths, inclusive. Returns
    /// how many were hinted.
    pub fn prefetch(&mut self, start: u64, end: u64) -> usize {
        let mut ret = 0;
        if !self.seek(start) {
            return ret;
        }

        let dbs = self.dbs;
        let json = &dbs.columns.event_json;
        self.for_each(|depth, idx| {
            if depth > end {
                return false;
            }
            json.prefetch(&encode_idx(idx));
            ret += 1;
            true
        });
        ret
    }
}
