use crate::{
    dbs::{desc, room_state},
    event::{decode_idx, EventIdx},
    state::{self, NodeId, Tree},
    Dbs, Error, EventId, Result, RoomId,
};

/// Where a [`State`] reads from
enum Source {
    /// The `room_state` column
    Present,
    /// A root of the state tree; `None` before the room had any state
    Root(Option<NodeId>),
}

/// A room's state, as it is now or as it was at some event.
///
/// Entries are ordered by `(type, state_key)` in both forms.
pub struct State<'a> {
    dbs: &'a Dbs,
    room_id: &'a RoomId,
    source: Source,
}

impl<'a> State<'a> {
    pub fn present(dbs: &'a Dbs, room_id: &'a RoomId) -> Self {
        Self {
            dbs,
            room_id,
            source: Source::Present,
        }
    }

    /// The state once `event_id` had been applied
    pub fn at(dbs: &'a Dbs, room_id: &'a RoomId, event_id: &EventId) -> Result<Self> {
        Self::at_idx(dbs, room_id, dbs.index(event_id)?)
    }

    pub fn at_idx(dbs: &'a Dbs, room_id: &'a RoomId, idx: EventIdx) -> Result<Self> {
        let depth = dbs.depth_of(idx)?;
        let root = state::root_at(dbs, None, room_id, depth, idx)?;
        Ok(Self::at_root(dbs, room_id, root))
    }

    pub fn at_root(dbs: &'a Dbs, room_id: &'a RoomId, root: Option<NodeId>) -> Self {
        Self {
            dbs,
            room_id,
            source: Source::Root(root),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self.source, Source::Present)
    }

    /// The tree root this state reads, if it is historical
    pub fn root(&self) -> Option<&str> {
        match &self.source {
            Source::Root(root) => root.as_deref(),
            Source::Present => None,
        }
    }

    fn tree(&self) -> Tree<'a> {
        Tree::new(&self.dbs.columns.state_node)
    }

    pub fn get_opt(&self, kind: &str, state_key: &str) -> Result<Option<EventIdx>> {
        match &self.source {
            Source::Present => {
                let key = room_state::key(self.room_id, kind, state_key);
                self.dbs
                    .columns
                    .room_state
                    .get_opt(&key)
                    .map(|v| decode_idx(&v).ok_or(Error::Corrupt(desc::ROOM_STATE)))
                    .transpose()
            }
            Source::Root(root) => self.tree().get(root.as_deref(), (kind, state_key)),
        }
    }

    pub fn get(&self, kind: &str, state_key: &str) -> Result<EventIdx> {
        self.get_opt(kind, state_key)?.ok_or_else(|| {
            Error::not_found(format!("({}, {}) in {}", kind, state_key, self.room_id))
        })
    }

    pub fn has(&self, kind: &str, state_key: &str) -> Result<bool> {
        Ok(self.get_opt(kind, state_key)?.is_some())
    }

    /// Visit every entry until `f` returns false. Returns whether every
    /// entry was visited.
    pub fn for_each(&self, f: impl FnMut(&str, &str, EventIdx) -> bool) -> Result<bool> {
        self.for_each_from(None, f)
    }

    /// Visit the entries of one type.
    pub fn for_each_type(
        &self,
        kind: &str,
        mut f: impl FnMut(&str, EventIdx) -> bool,
    ) -> Result<bool> {
        let mut done = true;
        self.for_each_from(Some((kind, "")), |k, state_key, idx| {
            if k != kind {
                return false;
            }
            done = f(state_key, idx);
            done
        })?;
        Ok(done)
    }

    /// Visit entries from the first not less than `lower`, for resuming a
    /// walk where an earlier one stopped.
    pub fn for_each_from(
        &self,
        lower: Option<(&str, &str)>,
        mut f: impl FnMut(&str, &str, EventIdx) -> bool,
    ) -> Result<bool> {
        match &self.source {
            Source::Root(root) => self.tree().for_each(root.as_deref(), lower, &mut f),
            Source::Present => {
                let mut cursor = self
                    .dbs
                    .columns
                    .room_state
                    .cursor(&room_state::prefix(self.room_id));

                if let Some((kind, state_key)) = lower {
                    cursor.seek(&room_state::key(self.room_id, kind, state_key));
                }

                let mut corrupt = false;
                let done = cursor.for_each(|key, value| {
                    match (room_state::decode(key), decode_idx(value)) {
                        (Some((kind, state_key)), Some(idx)) => f(kind, state_key, idx),
                        _ => {
                            corrupt = true;
                            false
                        }
                    }
                });

                match corrupt {
                    true => Err(Error::Corrupt(desc::ROOM_STATE)),
                    false => Ok(done),
                }
            }
        }
    }

    pub fn count(&self) -> Result<usize> {
        match &self.source {
            Source::Root(root) => self.tree().count(root.as_deref()),
            Source::Present => Ok(self
                .dbs
                .columns
                .room_state
                .count(&room_state::prefix(self.room_id))),
        }
    }

    pub fn count_type(&self, kind: &str) -> Result<usize> {
        let mut ret = 0;
        self.for_each_type(kind, |_, _| {
            ret += 1;
            true
        })?;
        Ok(ret)
    }

    /// Hint that entries of `kind` will be read soon. Returns whether a
    /// lookup was issued.
    pub fn prefetch(&self, kind: &str) -> bool {
        match &self.source {
            Source::Present => self
                .dbs
                .columns
                .room_state
                .prefetch_prefix(&room_state::type_prefix(self.room_id, kind)),
            Source::Root(Some(root)) => self.dbs.columns.state_node.prefetch(root.as_bytes()),
            Source::Root(None) => false,
        }
    }
}
