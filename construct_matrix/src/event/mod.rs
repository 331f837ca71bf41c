//! The event model and the internal event index

use base64::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{EventId, Result, RoomId, UserId};

mod fetch;
pub use fetch::Property;

pub mod refs;
pub use refs::Refs;

/// Internal sequence number of a stored event. Zero is never issued.
pub type EventIdx = u64;

/// Longest event type, in bytes
pub const TYPE_MAX_SIZE: usize = 256;

/// Longest state key, in bytes
pub const STATE_KEY_MAX_SIZE: usize = 256;

/// Big-endian encoding of an index, so that keys sort by it.
pub fn encode_idx(idx: EventIdx) -> [u8; 8] {
    idx.to_be_bytes()
}

/// Read an index written by [`encode_idx`]. `None` if `bytes` is not eight
/// bytes long.
pub fn decode_idx(bytes: &[u8]) -> Option<EventIdx> {
    bytes.try_into().ok().map(EventIdx::from_be_bytes)
}

/// Accepts both `["$id", ...]` and the older `[["$id", {hashes}], ...]`.
fn deserialize_refs<'de, D>(deserializer: D) -> std::result::Result<Vec<EventId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ref {
        Id(EventId),
        Pair(EventId, Value),
    }

    let refs = Vec::<Ref>::deserialize(deserializer)?;
    Ok(refs
        .into_iter()
        .map(|r| match r {
            Ref::Id(id) | Ref::Pair(id, _) => id,
        })
        .collect())
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// One event of a room's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    pub sender: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(default)]
    pub depth: u64,
    #[serde(default, deserialize_with = "deserialize_refs")]
    pub prev_events: Vec<EventId>,
    #[serde(default, deserialize_with = "deserialize_refs")]
    pub auth_events: Vec<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<EventId>,
    #[serde(default = "empty_object")]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub origin_server_ts: u64,

    /// The JSON this event was parsed from, if any
    #[serde(skip)]
    pub source: Option<String>,
}

impl Event {
    /// Parse an event, retaining the source text.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut event: Self = serde_json::from_str(json)?;
        event.source = Some(json.to_string());
        Ok(event)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// Check the bounds the indexers rely on.
    pub fn check(&self) -> Result<()> {
        if self.kind.is_empty() || self.kind.len() > TYPE_MAX_SIZE || self.kind.contains('\0') {
            return Err(crate::Error::InvalidEvent(format!(
                "bad type in {}",
                self.event_id
            )));
        }

        if let Some(state_key) = &self.state_key {
            if state_key.len() > STATE_KEY_MAX_SIZE || state_key.contains('\0') {
                return Err(crate::Error::InvalidEvent(format!(
                    "bad state_key in {}",
                    self.event_id
                )));
            }
        }

        if self.kind == "m.room.redaction" && self.redacts.is_none() {
            return Err(crate::Error::InvalidEvent(format!(
                "redaction {} has no target",
                self.event_id
            )));
        }

        Ok(())
    }

    /// Reference hash id: `$` and the unpadded url-safe base64 of the SHA-256
    /// of the event's canonical JSON without its `event_id`.
    pub fn compute_id(&self) -> Result<EventId> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("event_id");
        }

        // serde_json's default map keeps keys sorted
        let canonical = serde_json::to_string(&value)?;
        let digest = hex::decode(sha256::digest(canonical))
            .map_err(|e| crate::Error::InvalidEvent(e.to_string()))?;

        Ok(EventId::new(format!("${}", BASE64_URL_SAFE_NO_PAD.encode(digest)))?)
    }

    /// Look up a string at a path of object keys within `content`.
    pub fn content_str(&self, path: &[&str]) -> Option<&str> {
        path.iter()
            .try_fold(&self.content, |value, key| value.get(key))
            .and_then(Value::as_str)
    }

    /// Membership of a `m.room.member` event.
    pub fn membership(&self) -> Option<&str> {
        match self.kind.as_str() {
            "m.room.member" => self.content_str(&["membership"]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = r#"{
        "event_id": "$a:x", "room_id": "!r:x", "sender": "@u:x", "type": "m.room.message",
        "depth": 3, "prev_events": [["$p:x", {"sha256": "abc"}]], "content": {"body": "hi"}
    }"#;

    #[test]
    fn parses_both_ref_forms() {
        let event = Event::from_json(V1).unwrap();
        assert_eq!(event.prev_events, vec![EventId::new("$p:x").unwrap()]);
        assert!(event.auth_events.is_empty());
        assert_eq!(event.content_str(&["body"]), Some("hi"));
        assert!(event.source.is_some());

        let json = event.to_json().unwrap();
        let again = Event::from_json(&json).unwrap();
        assert_eq!(again.prev_events, event.prev_events);
    }

    #[test]
    fn computed_id_ignores_event_id() {
        let mut event = Event::from_json(V1).unwrap();
        let id = event.compute_id().unwrap();
        event.event_id = EventId::new("$other").unwrap();
        assert_eq!(event.compute_id().unwrap(), id);
        assert_eq!(id.as_str().len(), 44);
    }

    #[test]
    fn check_bounds() {
        let mut event = Event::from_json(V1).unwrap();
        assert!(event.check().is_ok());
        event.state_key = Some("k".repeat(STATE_KEY_MAX_SIZE + 1));
        assert!(event.check().is_err());
    }

    #[test]
    fn idx_codec() {
        assert_eq!(decode_idx(&encode_idx(0x0102)), Some(0x0102));
        assert_eq!(decode_idx(b"short"), None);
        assert!(encode_idx(1) < encode_idx(256));
    }
}
