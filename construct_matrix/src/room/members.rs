use itertools::Itertools;

use crate::{dbs::room_joined, Dbs, RoomId, UserId};

/// Joined members of a room, grouped by origin
pub struct Members<'a> {
    dbs: &'a Dbs,
    room_id: &'a RoomId,
}

impl<'a> Members<'a> {
    pub fn new(dbs: &'a Dbs, room_id: &'a RoomId) -> Self {
        Self { dbs, room_id }
    }

    fn walk(&self, prefix: &[u8], mut f: impl FnMut(&str, &str) -> bool) -> bool {
        self.dbs
            .columns
            .room_joined
            .cursor(prefix)
            .for_each(|key, _| match room_joined::decode(key) {
                Some((origin, user_id)) => f(origin, user_id),
                None => true,
            })
    }

    /// Visit joined user ids until `f` returns false.
    pub fn for_each(&self, mut f: impl FnMut(&str) -> bool) -> bool {
        self.walk(&room_joined::prefix(self.room_id), |_, user_id| f(user_id))
    }

    /// Visit the joined users of one origin.
    pub fn for_each_origin(&self, origin: &str, mut f: impl FnMut(&str) -> bool) -> bool {
        let mut prefix = room_joined::origin_prefix(self.room_id, origin);
        prefix.push(b'@');
        self.walk(&prefix, |_, user_id| f(user_id))
    }

    /// Every origin with at least one joined user
    pub fn origins(&self) -> Vec<String> {
        let mut origins = Vec::new();
        self.walk(&room_joined::prefix(self.room_id), |origin, _| {
            origins.push(origin.to_string());
            true
        });
        origins.into_iter().dedup().collect()
    }

    pub fn count(&self) -> usize {
        self.dbs
            .columns
            .room_joined
            .count(&room_joined::prefix(self.room_id))
    }

    pub fn count_origin(&self, origin: &str) -> usize {
        let mut ret = 0;
        self.for_each_origin(origin, |_| {
            ret += 1;
            true
        });
        ret
    }

    pub fn has(&self, user_id: &UserId) -> bool {
        self.dbs
            .columns
            .room_joined
            .has(&room_joined::key(self.room_id, user_id))
    }
}
