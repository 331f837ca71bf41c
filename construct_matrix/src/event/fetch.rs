use strum::{EnumIter, IntoStaticStr};

use super::{decode_idx, encode_idx, Event, EventIdx};
use crate::{dbs::desc, Dbs, Error, EventId, Result, RoomId};

/// Event properties with a column of their own, keyed by event index
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Property {
    Content,
    Depth,
    EventId,
    Origin,
    OriginServerTs,
    PrevEvents,
    AuthEvents,
    Redacts,
    RoomId,
    Sender,
    StateKey,
    Type,
}

impl Property {
    pub fn column(self) -> &'static str {
        self.into()
    }

    /// The stored form of this property of `event`, if it has one. Strings
    /// are stored raw, integers big-endian and structures as JSON.
    pub fn value(self, event: &Event) -> Result<Option<Vec<u8>>> {
        let ret = match self {
            Property::Content => Some(serde_json::to_vec(&event.content)?),
            Property::Depth => Some(event.depth.to_be_bytes().to_vec()),
            Property::EventId => Some(event.event_id.as_bytes().to_vec()),
            Property::Origin => event.origin.as_ref().map(|o| o.as_bytes().to_vec()),
            Property::OriginServerTs => Some(event.origin_server_ts.to_be_bytes().to_vec()),
            Property::PrevEvents => Some(serde_json::to_vec(&event.prev_events)?),
            Property::AuthEvents => Some(serde_json::to_vec(&event.auth_events)?),
            Property::Redacts => event.redacts.as_ref().map(|r| r.as_bytes().to_vec()),
            Property::RoomId => event.room_id.as_ref().map(|r| r.as_bytes().to_vec()),
            Property::Sender => Some(event.sender.as_bytes().to_vec()),
            Property::StateKey => event.state_key.as_ref().map(|s| s.as_bytes().to_vec()),
            Property::Type => Some(event.kind.as_bytes().to_vec()),
        };
        Ok(ret)
    }
}

fn to_string(column: &'static str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| Error::Corrupt(column))
}

impl Dbs {
    /// The index of `event_id`, or `None` if it is unknown or blacklisted
    pub fn index_opt(&self, event_id: &EventId) -> Result<Option<EventIdx>> {
        match self.columns.event_idx.get_opt(event_id.as_bytes()) {
            None => Ok(None),
            Some(bytes) => match decode_idx(&bytes) {
                Some(0) => Ok(None),
                Some(idx) => Ok(Some(idx)),
                None => Err(Error::Corrupt(desc::EVENT_IDX)),
            },
        }
    }

    pub fn index(&self, event_id: &EventId) -> Result<EventIdx> {
        self.index_opt(event_id)?
            .ok_or_else(|| Error::not_found(event_id))
    }

    pub fn exists(&self, event_id: &EventId) -> Result<bool> {
        Ok(self.index_opt(event_id)?.is_some())
    }

    pub fn is_blacklisted(&self, event_id: &EventId) -> Result<bool> {
        Ok(self
            .columns
            .event_idx
            .get_opt(event_id.as_bytes())
            .map_or(false, |bytes| decode_idx(&bytes) == Some(0)))
    }

    pub fn fetch_opt(&self, idx: EventIdx) -> Result<Option<Event>> {
        match self.columns.event_json.get_opt(&encode_idx(idx)) {
            None => Ok(None),
            Some(json) => {
                let json = to_string(desc::EVENT_JSON, json)?;
                Ok(Some(Event::from_json(&json)?))
            }
        }
    }

    pub fn fetch(&self, idx: EventIdx) -> Result<Event> {
        self.fetch_opt(idx)?
            .ok_or_else(|| Error::not_found(format!("event index {}", idx)))
    }

    pub fn fetch_id(&self, event_id: &EventId) -> Result<Event> {
        self.fetch(self.index(event_id)?)
    }

    /// One property of a stored event, without reading the whole event
    pub fn get_column(&self, idx: EventIdx, prop: Property) -> Result<Option<Vec<u8>>> {
        Ok(self.columns.prop(prop).get_opt(&encode_idx(idx)))
    }

    pub(crate) fn get_string(&self, idx: EventIdx, prop: Property) -> Result<Option<String>> {
        self.get_column(idx, prop)?
            .map(|bytes| to_string(prop.column(), bytes))
            .transpose()
    }

    pub fn event_id_of(&self, idx: EventIdx) -> Result<EventId> {
        let id = self
            .get_string(idx, Property::EventId)?
            .ok_or_else(|| Error::not_found(format!("event_id of index {}", idx)))?;
        Ok(EventId::new(id)?)
    }

    pub fn depth_of(&self, idx: EventIdx) -> Result<u64> {
        let bytes = self
            .get_column(idx, Property::Depth)?
            .ok_or_else(|| Error::not_found(format!("depth of index {}", idx)))?;
        decode_idx(&bytes).ok_or(Error::Corrupt("depth"))
    }

    pub fn room_id_of(&self, idx: EventIdx) -> Result<Option<RoomId>> {
        match self.get_string(idx, Property::RoomId)? {
            Some(room_id) => Ok(Some(RoomId::new(room_id)?)),
            None => Ok(None),
        }
    }

    pub fn prev_events_of(&self, idx: EventIdx) -> Result<Vec<EventId>> {
        match self.get_column(idx, Property::PrevEvents)? {
            Some(json) => Ok(serde_json::from_slice(&json)?),
            None => Ok(Vec::new()),
        }
    }
}
