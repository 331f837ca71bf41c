use std::{
    ops::Bound,
    sync::{atomic::Ordering, Arc},
};

use crate::{
    database::{visible, ColumnData},
    Cursor, Database, Descriptor, Error, Result, Snapshot, Txn,
};

/// Handle to one column of a [`Database`]
#[derive(Clone)]
pub struct Column {
    db: Database,
    data: Arc<ColumnData>,
}

impl Column {
    pub(crate) fn new(db: Database, data: Arc<ColumnData>) -> Self {
        Self { db, data }
    }

    pub fn name(&self) -> &'static str {
        self.data.desc.name
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.data.desc
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub(crate) fn data(&self) -> &ColumnData {
        &self.data
    }

    pub(crate) fn read_at(&self, seq: u64, key: &[u8]) -> Option<Vec<u8>> {
        self.db.inner.counters.gets.fetch_add(1, Ordering::Relaxed);
        let rows = self.data.rows.read();
        rows.get(key).and_then(|v| visible(v, seq)).cloned()
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.get_opt(key)
            .ok_or_else(|| Error::not_found(self.name(), key))
    }

    pub fn get_opt(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.read_at(self.db.sequence(), key)
    }

    pub fn get_at(&self, snapshot: &Snapshot, key: &[u8]) -> Result<Vec<u8>> {
        self.read_at(snapshot.sequence(), key)
            .ok_or_else(|| Error::not_found(self.name(), key))
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.get_opt(key).is_some()
    }

    /// Hint that `key` will be read soon. Returns whether it is present.
    pub fn prefetch(&self, key: &[u8]) -> bool {
        self.db
            .inner
            .counters
            .prefetches
            .fetch_add(1, Ordering::Relaxed);
        let rows = self.data.rows.read();
        rows.get(key)
            .and_then(|v| visible(v, self.db.sequence()))
            .is_some()
    }

    /// Hint that the keys starting with `prefix` will be read soon. Returns
    /// whether any is present.
    pub fn prefetch_prefix(&self, prefix: &[u8]) -> bool {
        self.db
            .inner
            .counters
            .prefetches
            .fetch_add(1, Ordering::Relaxed);
        let seq = self.db.sequence();
        let rows = self.data.rows.read();
        rows.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .any(|(_, v)| visible(v, seq).is_some())
    }

    /// Write a single key in its own transaction.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        let mut txn = Txn::new();
        txn.set(self.name(), key, value);
        self.db.commit(&txn)
    }

    pub fn del(&self, key: &[u8]) -> Result<u64> {
        let mut txn = Txn::new();
        txn.delete(self.name(), key);
        self.db.commit(&txn)
    }

    /// A cursor over the keys starting with `prefix`, positioned at the
    /// first of them.
    pub fn cursor(&self, prefix: &[u8]) -> Cursor {
        Cursor::new(self.clone(), prefix.to_vec(), self.db.sequence())
    }

    pub fn cursor_at(&self, snapshot: &Snapshot, prefix: &[u8]) -> Cursor {
        Cursor::new(self.clone(), prefix.to_vec(), snapshot.sequence())
    }

    /// A cursor over the domain of `key` as defined by the column's prefix
    /// transform, positioned at `key`. Without a transform the domain is the
    /// whole column.
    pub fn domain(&self, key: &[u8]) -> Cursor {
        let prefix = match &self.data.desc.prefix {
            Some(transform) => transform.domain(key).to_vec(),
            None => Vec::new(),
        };

        let mut cursor = Cursor::new(self.clone(), prefix, self.db.sequence());
        cursor.seek(key);
        cursor
    }

    /// Number of visible keys starting with `prefix`
    pub fn count(&self, prefix: &[u8]) -> usize {
        let seq = self.db.sequence();
        let rows = self.data.rows.read();
        rows.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, v)| visible(v, seq).is_some())
            .count()
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column").field("name", &self.name()).finish()
    }
}
