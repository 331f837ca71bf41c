use construct_db::Txn;
use itertools::{Itertools, MinMaxResult};

use super::Events;
use crate::{
    dbs::{desc, room_head, RefType},
    event::{decode_idx, encode_idx, EventIdx},
    Dbs, Error, EventId, Refs, Result, RoomId,
};

/// References for a new event of the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub prev_events: Vec<EventId>,
    /// Shallowest and deepest of `prev_events`; the new event belongs one
    /// above the latter.
    pub depth: (u64, u64),
}

/// The room's forward extremities: events no other known event refers to
pub struct Head<'a> {
    dbs: &'a Dbs,
    room_id: &'a RoomId,
}

impl<'a> Head<'a> {
    pub fn new(dbs: &'a Dbs, room_id: &'a RoomId) -> Self {
        Self { dbs, room_id }
    }

    /// Visit `(event_id, idx)` in event id order until `f` returns false.
    pub fn for_each(&self, mut f: impl FnMut(&str, EventIdx) -> bool) -> Result<bool> {
        let mut corrupt = false;
        let done = self
            .dbs
            .columns
            .room_head
            .cursor(&room_head::prefix(self.room_id))
            .for_each(|key, value| match (room_head::decode(key), decode_idx(value)) {
                (Some(event_id), Some(idx)) => f(event_id, idx),
                _ => {
                    corrupt = true;
                    false
                }
            });

        match corrupt {
            true => Err(Error::Corrupt(desc::ROOM_HEAD)),
            false => Ok(done),
        }
    }

    pub fn count(&self) -> usize {
        self.dbs
            .columns
            .room_head
            .count(&room_head::prefix(self.room_id))
    }

    pub fn has(&self, event_id: &EventId) -> bool {
        self.dbs
            .columns
            .room_head
            .has(&room_head::key(self.room_id, event_id))
    }

    /// Choose up to `limit` of the deepest heads as the prev_events of a new
    /// event.
    pub fn generate(&self, limit: usize) -> Result<Generated> {
        let mut heads = Vec::new();
        self.for_each(|event_id, idx| {
            heads.push((event_id.to_string(), idx));
            true
        })?;

        let mut chosen = Vec::with_capacity(limit.min(heads.len()));
        for (event_id, idx) in heads {
            chosen.push((self.dbs.depth_of(idx)?, idx, event_id));
        }

        let chosen = chosen
            .into_iter()
            .sorted_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)))
            .take(limit)
            .collect_vec();

        let depth = match chosen.iter().map(|(depth, ..)| *depth).minmax() {
            MinMaxResult::NoElements => (0, 0),
            MinMaxResult::OneElement(d) => (d, d),
            MinMaxResult::MinMax(lo, hi) => (lo, hi),
        };

        let prev_events = chosen
            .into_iter()
            .map(|(_, _, event_id)| EventId::new(event_id))
            .collect::<std::result::Result<_, _>>()?;

        Ok(Generated { prev_events, depth })
    }

    /// Derive the head again from the timeline: every event of the room
    /// without a `Next` reference from another event. Returns the size of
    /// the new head.
    #[tracing::instrument(skip(self), fields(room_id = %self.room_id))]
    pub fn rebuild(&self) -> Result<usize> {
        let mut txn = Txn::new();
        self.dbs
            .columns
            .room_head
            .cursor(&room_head::prefix(self.room_id))
            .for_each(|key, _| {
                txn.delete(desc::ROOM_HEAD, key);
                true
            });

        let mut events = Events::new(self.dbs, self.room_id);
        let mut heads = Vec::new();
        events.bottom();
        events.for_each(|_, idx| {
            if !Refs::new(self.dbs, idx).has_any(Some(RefType::Next)) {
                heads.push(idx);
            }
            true
        });

        for &idx in &heads {
            let event_id = self.dbs.event_id_of(idx)?;
            txn.set(
                desc::ROOM_HEAD,
                room_head::key(self.room_id, &event_id),
                encode_idx(idx),
            );
        }

        self.dbs.database().commit(&txn)?;
        tracing::info!("Rebuilt head of {} with {} events", self.room_id, heads.len());
        Ok(heads.len())
    }
}
