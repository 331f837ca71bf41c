use base64::prelude::*;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::{event::EventIdx, Result};

/// Content address of a node
pub type NodeId = String;

/// Most keys a node holds before it splits
pub const NODE_MAX_KEY: usize = 8;

/// Deepest tree the walkers will descend
pub const MAX_HEIGHT: usize = 16;

/// One node of the state tree.
///
/// Keys are `(type, state_key)` pairs in ascending order with the event
/// index of each beside it. An inner node has one more child than it has
/// keys, and records how many entries each child's subtree holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "k")]
    pub keys: Vec<(String, String)>,
    #[serde(rename = "v")]
    pub vals: Vec<EventIdx>,
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
    #[serde(rename = "n", default, skip_serializing_if = "Vec::is_empty")]
    pub counts: Vec<usize>,
}

impl Node {
    pub fn leaf(key: (&str, &str), val: EventIdx) -> Self {
        Self {
            keys: vec![(key.0.to_string(), key.1.to_string())],
            vals: vec![val],
            ..Default::default()
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Entries in this node and every node below it
    pub fn total(&self) -> usize {
        self.keys.len() + self.counts.iter().sum::<usize>()
    }

    pub(crate) fn find(&self, key: (&str, &str)) -> std::result::Result<usize, usize> {
        self.keys
            .binary_search_by(|(t, s)| (t.as_str(), s.as_str()).cmp(&key))
    }

    /// Position of the first key not less than `key`
    pub(crate) fn lower_bound(&self, key: (&str, &str)) -> usize {
        self.keys
            .partition_point(|(t, s)| (t.as_str(), s.as_str()) < key)
    }

    pub fn encode(&self) -> Result<(NodeId, Vec<u8>)> {
        let json = serde_json::to_vec(self)?;
        Ok((id(&json), json))
    }

    pub fn decode(json: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(json)?)
    }

    /// Split an overfull node about its middle key.
    pub(crate) fn split(mut self) -> (Node, (String, String), EventIdx, Node) {
        let mid = self.keys.len() / 2;
        let right = Node {
            keys: self.keys.split_off(mid + 1),
            vals: self.vals.split_off(mid + 1),
            children: match self.is_leaf() {
                true => Vec::new(),
                false => self.children.split_off(mid + 1),
            },
            counts: match self.counts.is_empty() {
                true => Vec::new(),
                false => self.counts.split_off(mid + 1),
            },
        };

        let key = self.keys.remove(mid);
        let val = self.vals.remove(mid);
        (self, key, val, right)
    }
}

/// Unpadded url-safe base64 of the SHA-1 of a node's JSON
pub fn id(json: &[u8]) -> NodeId {
    let mut hasher = Sha1::new();
    hasher.update(json);
    BASE64_URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_form() {
        let node = Node::leaf(("m.room.create", ""), 1);
        let (id, json) = node.encode().unwrap();
        assert_eq!(
            String::from_utf8(json.clone()).unwrap(),
            r#"{"k":[["m.room.create",""]],"v":[1]}"#
        );
        assert_eq!(id.len(), 27);
        assert_eq!(Node::decode(&json).unwrap(), node);
    }

    #[test]
    fn split_keeps_order() {
        let mut node = Node::default();
        for i in 0..=NODE_MAX_KEY {
            node.keys.push(("t".to_string(), i.to_string()));
            node.vals.push(i as EventIdx);
        }

        let (left, key, val, right) = node.split();
        assert_eq!(left.keys.len(), 4);
        assert_eq!(right.keys.len(), 4);
        assert_eq!(key, ("t".to_string(), "4".to_string()));
        assert_eq!(val, 4);
        assert_eq!(left.find(("t", "3")), Ok(3));
        assert_eq!(right.lower_bound(("t", "5")), 0);
    }
}
