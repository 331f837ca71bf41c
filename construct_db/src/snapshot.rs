use std::sync::{Arc, Weak};

use crate::{database::DbInner, Database};

/// A pinned sequence number. Versions visible at it are kept until the
/// snapshot is dropped.
pub struct Snapshot {
    seq: u64,
    db: Weak<DbInner>,
}

impl Snapshot {
    pub(crate) fn new(db: &Database) -> Self {
        let mut snapshots = db.inner.snapshots.lock();
        let seq = db.sequence();
        *snapshots.entry(seq).or_insert(0) += 1;

        Self {
            seq,
            db: Arc::downgrade(&db.inner),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        let db = match self.db.upgrade() {
            Some(db) => db,
            None => return,
        };

        let mut snapshots = db.snapshots.lock();
        if let Some(count) = snapshots.get_mut(&self.seq) {
            *count -= 1;
            if *count == 0 {
                snapshots.remove(&self.seq);
            }
        }
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot").field("seq", &self.seq).finish()
    }
}
