//! The persistent state tree.
//!
//! A room's state at any point is a B-tree mapping `(type, state_key)` to
//! an event index. Nodes are immutable and stored under the hash of their
//! content, so an update writes only the path from the changed leaf to a
//! new root and shares every other node with the previous version. The
//! `state_root` column records which root is in effect from each point of
//! a room's timeline onward.

use construct_db::{Column, Op, Txn};

use crate::{
    dbs::{append, desc, WriteOpts},
    event::{decode_idx, encode_idx, Event, EventIdx},
    Dbs, Error, Result, RoomId,
};

mod node;
pub use node::{Node, NodeId, MAX_HEIGHT, NODE_MAX_KEY};

/// Nodes produced by an update, ready to be staged
pub type Staged = Vec<(NodeId, Vec<u8>)>;

enum Inserted {
    Node(Node),
    Split(Node, (String, String), EventIdx, Node),
}

fn emit(node: Node, out: &mut Staged) -> Result<NodeId> {
    let (id, json) = node.encode()?;
    out.push((id.clone(), json));
    Ok(id)
}

fn corrupt() -> Error {
    Error::Corrupt(desc::STATE_NODE)
}

/// Read and update access to the nodes of the tree
pub struct Tree<'a> {
    nodes: &'a Column,
    staged: Option<&'a Txn>,
}

impl<'a> Tree<'a> {
    pub fn new(nodes: &'a Column) -> Self {
        Self {
            nodes,
            staged: None,
        }
    }

    /// A tree which also sees nodes staged in `txn`
    pub fn with_txn(nodes: &'a Column, txn: &'a Txn) -> Self {
        Self {
            nodes,
            staged: Some(txn),
        }
    }

    pub fn node(&self, id: &str) -> Result<Node> {
        if let Some(Some(json)) = self.staged.and_then(|txn| txn.val(desc::STATE_NODE, id.as_bytes())) {
            return Node::decode(json);
        }

        let json = self.nodes.get_opt(id.as_bytes()).ok_or_else(corrupt)?;
        Node::decode(&json)
    }

    pub fn get(&self, root: Option<&str>, key: (&str, &str)) -> Result<Option<EventIdx>> {
        let mut id = match root {
            Some(id) => id.to_string(),
            None => return Ok(None),
        };

        for _ in 0..MAX_HEIGHT {
            let node = self.node(&id)?;
            match node.find(key) {
                Ok(i) => return Ok(Some(node.vals[i])),
                Err(_) if node.is_leaf() => return Ok(None),
                Err(i) => id = node.children[i].clone(),
            }
        }

        Err(corrupt())
    }

    /// Visit entries in key order, starting at the first not less than
    /// `lower`, until `f` returns false. Returns whether every entry was
    /// visited.
    pub fn for_each(
        &self,
        root: Option<&str>,
        lower: Option<(&str, &str)>,
        f: &mut dyn FnMut(&str, &str, EventIdx) -> bool,
    ) -> Result<bool> {
        match root {
            Some(id) => self.walk(id, lower, f, 0),
            None => Ok(true),
        }
    }

    fn walk(
        &self,
        id: &str,
        lower: Option<(&str, &str)>,
        f: &mut dyn FnMut(&str, &str, EventIdx) -> bool,
        height: usize,
    ) -> Result<bool> {
        if height >= MAX_HEIGHT {
            return Err(corrupt());
        }

        let node = self.node(id)?;
        let start = lower.map_or(0, |key| node.lower_bound(key));

        if node.is_leaf() {
            for i in start..node.keys.len() {
                if !f(&node.keys[i].0, &node.keys[i].1, node.vals[i]) {
                    return Ok(false);
                }
            }
            return Ok(true);
        }

        for i in start..node.children.len() {
            let bound = if i == start { lower } else { None };
            if !self.walk(&node.children[i], bound, f, height + 1)? {
                return Ok(false);
            }

            if i < node.keys.len() && !f(&node.keys[i].0, &node.keys[i].1, node.vals[i]) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn count(&self, root: Option<&str>) -> Result<usize> {
        match root {
            Some(id) => Ok(self.node(id)?.total()),
            None => Ok(0),
        }
    }

    /// Map `key` to `val` in a new version of the tree at `root`. Returns the
    /// new root; the nodes created are pushed to `out`.
    pub fn insert(
        &self,
        root: Option<&str>,
        key: (&str, &str),
        val: EventIdx,
        out: &mut Staged,
    ) -> Result<NodeId> {
        let node = match root {
            Some(id) => self.node(id)?,
            None => return emit(Node::leaf(key, val), out),
        };

        match self.ins(node, key, val, out, 0)? {
            Inserted::Node(node) => emit(node, out),
            Inserted::Split(left, k, v, right) => {
                let counts = vec![left.total(), right.total()];
                let children = vec![emit(left, out)?, emit(right, out)?];
                emit(
                    Node {
                        keys: vec![k],
                        vals: vec![v],
                        children,
                        counts,
                    },
                    out,
                )
            }
        }
    }

    fn ins(
        &self,
        mut node: Node,
        key: (&str, &str),
        val: EventIdx,
        out: &mut Staged,
        height: usize,
    ) -> Result<Inserted> {
        if height >= MAX_HEIGHT {
            return Err(corrupt());
        }

        match node.find(key) {
            Ok(i) => {
                node.vals[i] = val;
                return Ok(Inserted::Node(node));
            }
            Err(i) if node.is_leaf() => {
                node.keys.insert(i, (key.0.to_string(), key.1.to_string()));
                node.vals.insert(i, val);
            }
            Err(i) => {
                let child = self.node(&node.children[i])?;
                match self.ins(child, key, val, out, height + 1)? {
                    Inserted::Node(child) => {
                        node.counts[i] = child.total();
                        node.children[i] = emit(child, out)?;
                    }
                    Inserted::Split(left, k, v, right) => {
                        node.counts[i] = left.total();
                        node.children[i] = emit(left, out)?;
                        node.keys.insert(i, k);
                        node.vals.insert(i, v);
                        node.counts.insert(i + 1, right.total());
                        node.children.insert(i + 1, emit(right, out)?);
                    }
                }
            }
        }

        if node.keys.len() > NODE_MAX_KEY {
            let (left, k, v, right) = node.split();
            Ok(Inserted::Split(left, k, v, right))
        } else {
            Ok(Inserted::Node(node))
        }
    }

    /// Remove `key` from a new version of the tree at `root`. Returns the
    /// new root, which is `None` once the tree is empty, and is `root`
    /// itself if the key was not present.
    ///
    /// Nodes are never merged; a leaf may be left empty, and an inner key
    /// is replaced by its neighbour from whichever side still has entries.
    pub fn remove(
        &self,
        root: Option<&str>,
        key: (&str, &str),
        out: &mut Staged,
    ) -> Result<Option<NodeId>> {
        let id = match root {
            Some(id) => id,
            None => return Ok(None),
        };

        let mut node = match self.rem(self.node(id)?, key, out, 0)? {
            Some(node) => node,
            None => return Ok(Some(id.to_string())),
        };

        for _ in 0..MAX_HEIGHT {
            if node.total() == 0 {
                return Ok(None);
            }

            if !node.keys.is_empty() || node.children.len() != 1 {
                return emit(node, out).map(Some);
            }

            node = self.node(&node.children[0])?;
        }

        Err(corrupt())
    }

    fn rem(
        &self,
        mut node: Node,
        key: (&str, &str),
        out: &mut Staged,
        height: usize,
    ) -> Result<Option<Node>> {
        if height >= MAX_HEIGHT {
            return Err(corrupt());
        }

        match node.find(key) {
            Ok(i) if node.is_leaf() => {
                node.keys.remove(i);
                node.vals.remove(i);
            }
            Ok(i) => self.replace(&mut node, i, out, height)?,
            Err(_) if node.is_leaf() => return Ok(None),
            Err(i) => {
                let child = self.node(&node.children[i])?;
                match self.rem(child, key, out, height + 1)? {
                    Some(child) => {
                        node.counts[i] = child.total();
                        node.children[i] = emit(child, out)?;
                    }
                    None => return Ok(None),
                }
            }
        }

        Ok(Some(node))
    }

    fn replace(&self, node: &mut Node, i: usize, out: &mut Staged, height: usize) -> Result<()> {
        if node.counts[i] > 0 {
            let (child, k, v) = self.pop_max(self.node(&node.children[i])?, out, height + 1)?;
            node.keys[i] = k;
            node.vals[i] = v;
            node.counts[i] = child.total();
            node.children[i] = emit(child, out)?;
        } else if node.counts[i + 1] > 0 {
            let (child, k, v) = self.pop_min(self.node(&node.children[i + 1])?, out, height + 1)?;
            node.keys[i] = k;
            node.vals[i] = v;
            node.counts[i + 1] = child.total();
            node.children[i + 1] = emit(child, out)?;
        } else {
            node.keys.remove(i);
            node.vals.remove(i);
            node.children.remove(i + 1);
            node.counts.remove(i + 1);
        }
        Ok(())
    }

    fn pop_max(
        &self,
        mut node: Node,
        out: &mut Staged,
        height: usize,
    ) -> Result<(Node, (String, String), EventIdx)> {
        if height >= MAX_HEIGHT {
            return Err(corrupt());
        }

        let last = node.children.len().saturating_sub(1);
        if !node.is_leaf() && node.counts[last] > 0 {
            let (child, k, v) = self.pop_max(self.node(&node.children[last])?, out, height + 1)?;
            node.counts[last] = child.total();
            node.children[last] = emit(child, out)?;
            return Ok((node, k, v));
        }

        // an empty rightmost subtree makes the last key the greatest
        let (k, v) = node.keys.pop().zip(node.vals.pop()).ok_or_else(corrupt)?;
        if !node.is_leaf() {
            node.children.pop();
            node.counts.pop();
        }
        Ok((node, k, v))
    }

    fn pop_min(
        &self,
        mut node: Node,
        out: &mut Staged,
        height: usize,
    ) -> Result<(Node, (String, String), EventIdx)> {
        if height >= MAX_HEIGHT {
            return Err(corrupt());
        }

        if !node.is_leaf() && node.counts[0] > 0 {
            let (child, k, v) = self.pop_min(self.node(&node.children[0])?, out, height + 1)?;
            node.counts[0] = child.total();
            node.children[0] = emit(child, out)?;
            return Ok((node, k, v));
        }

        if node.keys.is_empty() {
            return Err(corrupt());
        }

        let k = node.keys.remove(0);
        let v = node.vals.remove(0);
        if !node.is_leaf() {
            node.children.remove(0);
            node.counts.remove(0);
        }
        Ok((node, k, v))
    }
}

/// Stage the nodes of an update, skipping any already staged.
pub(crate) fn stage(txn: &mut Txn, out: Staged) {
    for (id, json) in out {
        if txn.val(desc::STATE_NODE, id.as_bytes()).is_none() {
            txn.set(desc::STATE_NODE, id, json);
        }
    }
}

pub fn root_prefix(room_id: &RoomId) -> Vec<u8> {
    let mut key = room_id.as_bytes().to_vec();
    key.push(0);
    key
}

/// `room_id \0 depth idx`
pub fn root_key(room_id: &RoomId, depth: u64, idx: EventIdx) -> Vec<u8> {
    let mut key = root_prefix(room_id);
    key.extend_from_slice(&depth.to_be_bytes());
    key.extend_from_slice(&encode_idx(idx));
    key
}

/// Depth and index of a `state_root` key
pub fn decode_root_key(key: &[u8]) -> Option<(u64, EventIdx)> {
    let at = key.len().checked_sub(16)?;
    Some((decode_idx(&key[at..at + 8])?, decode_idx(&key[at + 8..])?))
}

/// The root in effect at position `(depth, idx)` of a room: the last one
/// recorded at or before it. Roots staged in `txn` take part.
pub fn root_at(
    dbs: &Dbs,
    txn: Option<&Txn>,
    room_id: &RoomId,
    depth: u64,
    idx: EventIdx,
) -> Result<Option<NodeId>> {
    let target = root_key(room_id, depth, idx);

    let mut cursor = dbs.columns.state_root.cursor(&root_prefix(room_id));
    let mut best = match cursor.seek_rev(&target) {
        true => cursor.key().zip(cursor.value()).map(|(k, v)| (k.to_vec(), v.to_vec())),
        false => None,
    };

    let prefix = root_prefix(room_id);
    for delta in txn.map(Txn::deltas).unwrap_or_default() {
        let candidate = delta.column == desc::STATE_ROOT
            && delta.op == Op::Set
            && delta.key.starts_with(&prefix)
            && delta.key <= target
            && best.as_ref().map_or(true, |(k, _)| delta.key >= *k);

        if candidate {
            best = Some((delta.key.clone(), delta.value.clone()));
        }
    }

    best.map(|(_, id)| String::from_utf8(id).map_err(|_| Error::Corrupt(desc::STATE_ROOT)))
        .transpose()
}

/// Chain a new root for the room of a state event, or drop the one it
/// recorded.
pub(crate) fn index(dbs: &Dbs, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
    let (room_id, state_key) = match (&event.room_id, &event.state_key) {
        (Some(room_id), Some(state_key)) => (room_id, state_key),
        _ => return Ok(()),
    };

    let key = root_key(room_id, event.depth, opts.event_idx);
    if opts.op != Op::Set {
        append(txn, opts.op, desc::STATE_ROOT, key, Vec::new());
        return Ok(());
    }

    let prev = root_at(dbs, Some(txn), room_id, event.depth, opts.event_idx)?;
    let mut out = Staged::new();
    let root = Tree::with_txn(&dbs.columns.state_node, txn).insert(
        prev.as_deref(),
        (&event.kind, state_key),
        opts.event_idx,
        &mut out,
    )?;

    tracing::trace!("State root for {} is now {}", room_id, root);
    stage(txn, out);
    append(txn, Op::Set, desc::STATE_ROOT, key, root);
    Ok(())
}
