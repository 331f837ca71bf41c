//! Read-side views over one room's indices

use crate::{dbs::room_events, Dbs, EventId, Result, RoomId};

mod events;
pub use events::Events;

mod state;
pub use state::State;

mod sounding;
pub use sounding::{Gap, Sounding};

mod head;
pub use head::{Generated, Head};

mod members;
pub use members::Members;

mod missing;
pub use missing::Missing;

mod horizon;
pub use horizon::Horizon;

/// A room of the event graph
#[derive(Clone, Copy)]
pub struct Room<'a> {
    dbs: &'a Dbs,
    room_id: &'a RoomId,
}

impl<'a> Room<'a> {
    pub fn new(dbs: &'a Dbs, room_id: &'a RoomId) -> Self {
        Self { dbs, room_id }
    }

    pub fn room_id(&self) -> &'a RoomId {
        self.room_id
    }

    pub fn dbs(&self) -> &'a Dbs {
        self.dbs
    }

    /// Whether any event of the room is known
    pub fn exists(&self) -> bool {
        self.dbs
            .columns
            .room_events
            .cursor(&room_events::prefix(self.room_id))
            .valid()
    }

    /// Depth of the deepest known event
    pub fn depth(&self) -> Option<u64> {
        let mut events = self.events();
        events.top().then(|| events.depth()).flatten()
    }

    pub fn events(&self) -> Events<'a> {
        Events::new(self.dbs, self.room_id)
    }

    /// The present state
    pub fn state(&self) -> State<'a> {
        State::present(self.dbs, self.room_id)
    }

    /// The state as of `event_id`, including that event's own effect
    pub fn state_at(&self, event_id: &EventId) -> Result<State<'a>> {
        State::at(self.dbs, self.room_id, event_id)
    }

    pub fn head(&self) -> Head<'a> {
        Head::new(self.dbs, self.room_id)
    }

    pub fn members(&self) -> Members<'a> {
        Members::new(self.dbs, self.room_id)
    }

    pub fn missing(&self) -> Missing<'a> {
        Missing::new(self.dbs, self.room_id)
    }

    pub fn horizon(&self) -> Horizon<'a> {
        Horizon::new(self.dbs, self.room_id)
    }

    pub fn sounding(&self) -> Sounding<'a> {
        Sounding::new(self.dbs, self.room_id)
    }
}
