use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

bitflags! {
    /// Selects which indices a write touches
    #[derive(Serialize,Deserialize)]
    pub struct Appendix : u64
    {
        /// `event_id` to index
        const EVENT_ID = 1 << 0;
        /// One column per event property
        const EVENT_COLS = 1 << 1;
        /// Full event JSON by index
        const EVENT_JSON = 1 << 2;
        const EVENT_SENDER = 1 << 3;
        const EVENT_TYPE = 1 << 4;
        /// State events by state key, and the room's state tree
        const EVENT_STATE = 1 << 5;
        /// Graph edges to the events this one references
        const EVENT_REFS = 1 << 6;
        /// Remember references to events not yet known
        const EVENT_HORIZON = 1 << 7;
        /// Complete edges recorded in the horizon for this event
        const EVENT_HORIZON_RESOLVE = 1 << 8;
        /// Room timeline by depth
        const ROOM_EVENTS = 1 << 9;
        const ROOM_TYPE = 1 << 10;
        /// Add the event to the room's frontier
        const ROOM_HEAD = 1 << 11;
        /// Drop the events this one references from the frontier
        const ROOM_HEAD_REFS = 1 << 12;
        /// Present state of the room
        const ROOM_STATE = 1 << 13;
        /// Every state event of the room, by state key and depth
        const ROOM_STATE_SPACE = 1 << 14;
        /// Joined members by origin
        const ROOM_JOINED = 1 << 15;
        /// Redactions remove their target from the present state
        const ROOM_REDACT = 1 << 16;

        const EVENT = Self::EVENT_ID.bits
            | Self::EVENT_COLS.bits
            | Self::EVENT_JSON.bits
            | Self::EVENT_SENDER.bits
            | Self::EVENT_TYPE.bits
            | Self::EVENT_STATE.bits
            | Self::EVENT_REFS.bits
            | Self::EVENT_HORIZON.bits
            | Self::EVENT_HORIZON_RESOLVE.bits;

        const ROOM = Self::ROOM_EVENTS.bits
            | Self::ROOM_TYPE.bits
            | Self::ROOM_HEAD.bits
            | Self::ROOM_HEAD_REFS.bits
            | Self::ROOM_STATE.bits
            | Self::ROOM_STATE_SPACE.bits
            | Self::ROOM_JOINED.bits
            | Self::ROOM_REDACT.bits;

        /// Room indices applied only to state events
        const STATE = Self::ROOM_STATE.bits
            | Self::ROOM_STATE_SPACE.bits
            | Self::ROOM_JOINED.bits;

        /// Room indices applied only to redactions
        const REDACT = Self::ROOM_REDACT.bits;

        /// Room indices which never change once written
        const HISTORY = Self::ROOM_EVENTS.bits
            | Self::ROOM_TYPE.bits;

        /// Room indices tracking the frontier
        const OTHER = Self::ROOM_HEAD.bits
            | Self::ROOM_HEAD_REFS.bits;
    }
}

/// The individual indices in the order a write applies them
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Index {
    EventId,
    EventCols,
    EventJson,
    EventSender,
    EventType,
    EventState,
    EventRefs,
    EventHorizon,
    EventHorizonResolve,
    RoomEvents,
    RoomType,
    RoomHead,
    RoomHeadRefs,
    RoomState,
    RoomStateSpace,
    RoomJoined,
    RoomRedact,
}

impl Index {
    pub fn flag(self) -> Appendix {
        match self {
            Index::EventId => Appendix::EVENT_ID,
            Index::EventCols => Appendix::EVENT_COLS,
            Index::EventJson => Appendix::EVENT_JSON,
            Index::EventSender => Appendix::EVENT_SENDER,
            Index::EventType => Appendix::EVENT_TYPE,
            Index::EventState => Appendix::EVENT_STATE,
            Index::EventRefs => Appendix::EVENT_REFS,
            Index::EventHorizon => Appendix::EVENT_HORIZON,
            Index::EventHorizonResolve => Appendix::EVENT_HORIZON_RESOLVE,
            Index::RoomEvents => Appendix::ROOM_EVENTS,
            Index::RoomType => Appendix::ROOM_TYPE,
            Index::RoomHead => Appendix::ROOM_HEAD,
            Index::RoomHeadRefs => Appendix::ROOM_HEAD_REFS,
            Index::RoomState => Appendix::ROOM_STATE,
            Index::RoomStateSpace => Appendix::ROOM_STATE_SPACE,
            Index::RoomJoined => Appendix::ROOM_JOINED,
            Index::RoomRedact => Appendix::ROOM_REDACT,
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl Appendix {
    /// The indices selected, in write order
    pub fn indices(self) -> impl Iterator<Item = Index> {
        Index::iter().filter(move |i| self.contains(i.flag()))
    }
}

impl std::fmt::Display for Appendix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.indices().map(Index::name).collect();
        f.write_str(&names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_index_has_a_distinct_flag() {
        let all = Index::iter().fold(Appendix::empty(), |acc, i| {
            assert!(!acc.intersects(i.flag()));
            acc | i.flag()
        });
        assert_eq!(all, Appendix::EVENT | Appendix::ROOM);
        assert_eq!(Appendix::HISTORY | Appendix::OTHER | Appendix::STATE | Appendix::REDACT, Appendix::ROOM);
    }

    #[test]
    fn display_in_write_order() {
        let a = Appendix::ROOM_HEAD | Appendix::EVENT_ID;
        assert_eq!(a.to_string(), "EVENT_ID|ROOM_HEAD");
    }
}
