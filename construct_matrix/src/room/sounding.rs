//! Gaps in a room's timeline: depths between two known events at which no
//! event is known. These drive backfill.

use std::ops::Range;

use crate::{dbs::room_events, event::EventIdx, Dbs, RoomId};

/// Depths `range` are missing between event `below` and event `above`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    pub range: Range<u64>,
    /// First event above the gap
    pub above: EventIdx,
    /// Last event below the gap
    pub below: EventIdx,
}

pub struct Sounding<'a> {
    dbs: &'a Dbs,
    room_id: &'a RoomId,
}

impl<'a> Sounding<'a> {
    pub fn new(dbs: &'a Dbs, room_id: &'a RoomId) -> Self {
        Self { dbs, room_id }
    }

    fn cursor(&self) -> construct_db::Cursor {
        self.dbs
            .columns
            .room_events
            .cursor(&room_events::prefix(self.room_id))
    }

    /// Visit gaps from the bottom of the timeline up until `f` returns
    /// false.
    pub fn for_each(&self, mut f: impl FnMut(&Gap) -> bool) -> bool {
        let mut last: Option<(u64, EventIdx)> = None;
        self.cursor().for_each(|key, _| {
            let (depth, idx) = match room_events::decode(key) {
                Some(pos) => pos,
                None => return true,
            };

            let gap = match last {
                Some((below_depth, below)) if depth > below_depth + 1 => Some(Gap {
                    range: below_depth + 1..depth,
                    above: idx,
                    below,
                }),
                _ => None,
            };

            last = Some((depth, idx));
            gap.map_or(true, |gap| f(&gap))
        })
    }

    /// Visit gaps from the top of the timeline down.
    pub fn rfor_each(&self, mut f: impl FnMut(&Gap) -> bool) -> bool {
        let mut cursor = self.cursor();
        cursor.seek_last();

        let mut last: Option<(u64, EventIdx)> = None;
        cursor.rfor_each(|key, _| {
            let (depth, idx) = match room_events::decode(key) {
                Some(pos) => pos,
                None => return true,
            };

            let gap = match last {
                Some((above_depth, above)) if above_depth > depth + 1 => Some(Gap {
                    range: depth + 1..above_depth,
                    above,
                    below: idx,
                }),
                _ => None,
            };

            last = Some((depth, idx));
            gap.map_or(true, |gap| f(&gap))
        })
    }

    /// The highest gap
    pub fn top(&self) -> Option<Gap> {
        let mut ret = None;
        self.rfor_each(|gap| {
            ret = Some(gap.clone());
            false
        });
        ret
    }

    /// The lowest gap
    pub fn bottom(&self) -> Option<Gap> {
        let mut ret = None;
        self.for_each(|gap| {
            ret = Some(gap.clone());
            false
        });
        ret
    }

    /// Where backfill starts: the deepest missing depth of the highest gap
    /// and the event just above it.
    pub fn sounding(&self) -> Option<(u64, EventIdx)> {
        self.top().map(|gap| (gap.range.end - 1, gap.above))
    }

    /// The known event just below the highest gap, with its depth.
    pub fn twain(&self) -> Option<(u64, EventIdx)> {
        self.top().map(|gap| (gap.range.start - 1, gap.below))
    }

    /// The shallowest missing depth of the lowest gap and the event just
    /// below it.
    pub fn hazard(&self) -> Option<(u64, EventIdx)> {
        self.bottom().map(|gap| (gap.range.start, gap.below))
    }

    pub fn count(&self) -> usize {
        let mut ret = 0;
        self.for_each(|_| {
            ret += 1;
            true
        });
        ret
    }
}
