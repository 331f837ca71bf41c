use std::{
    collections::BTreeMap,
    ops::Bound,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::{
    saved::{SavedColumn, SavedDatabase},
    Column, DbOpts, Descriptor, Error, Op, Result, Snapshot, Txn,
};

/// A write to a key at one sequence number; `None` is a deletion.
#[derive(Debug, Clone)]
pub(crate) struct Version {
    pub seq: u64,
    pub value: Option<Vec<u8>>,
}

pub(crate) type Rows = BTreeMap<Vec<u8>, Vec<Version>>;

/// The value of a key as of `seq`, if it has one.
pub(crate) fn visible(versions: &[Version], seq: u64) -> Option<&Vec<u8>> {
    versions
        .iter()
        .rev()
        .find(|v| v.seq <= seq)
        .and_then(|v| v.value.as_ref())
}

pub(crate) struct ColumnData {
    pub desc: Descriptor,
    pub rows: RwLock<Rows>,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub gets: AtomicU64,
    pub sets: AtomicU64,
    pub deletes: AtomicU64,
    pub commits: AtomicU64,
    pub prefetches: AtomicU64,
}

/// Operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub commits: u64,
    pub prefetches: u64,
    pub sequence: u64,
    pub snapshots: usize,
}

pub(crate) struct DbInner {
    pub opts: DbOpts,
    pub columns: BTreeMap<&'static str, Arc<ColumnData>>,
    /// Last committed sequence number
    pub sequence: AtomicU64,
    /// Serialises commits
    pub write: Mutex<()>,
    /// Live snapshot sequence numbers and their reference counts
    pub snapshots: Mutex<BTreeMap<u64, usize>>,
    pub counters: Counters,
}

impl DbInner {
    /// Oldest sequence number any reader may still ask for.
    fn horizon(&self) -> u64 {
        self.snapshots
            .lock()
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.sequence.load(Ordering::Acquire))
    }
}

/// Handle to an open column store. Clones share the same store.
#[derive(Clone)]
pub struct Database {
    pub(crate) inner: Arc<DbInner>,
}

impl Database {
    /// Create an empty store with the given columns.
    pub fn open(opts: DbOpts, descriptors: &[Descriptor]) -> Self {
        let columns = descriptors
            .iter()
            .map(|desc| {
                (
                    desc.name,
                    Arc::new(ColumnData {
                        desc: *desc,
                        rows: RwLock::new(BTreeMap::new()),
                    }),
                )
            })
            .collect();

        tracing::debug!("Opened database with {} columns", descriptors.len());

        Self {
            inner: Arc::new(DbInner {
                opts,
                columns,
                sequence: AtomicU64::new(0),
                write: Mutex::new(()),
                snapshots: Mutex::new(BTreeMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn opts(&self) -> &DbOpts {
        &self.inner.opts
    }

    pub fn column(&self, name: &str) -> Result<Column> {
        self.inner
            .columns
            .get(name)
            .map(|data| Column::new(self.clone(), Arc::clone(data)))
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.inner.columns.values().map(|c| &c.desc)
    }

    /// The last committed sequence number
    pub fn sequence(&self) -> u64 {
        self.inner.sequence.load(Ordering::Acquire)
    }

    /// Pin the current committed state for consistent reads.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self)
    }

    /// Apply every delta in `txn` at a single new sequence number.
    ///
    /// The whole transaction is validated first; if any delta is rejected
    /// nothing is written.
    pub fn commit(&self, txn: &Txn) -> Result<u64> {
        let _write = self.inner.write.lock();
        self.validate(txn)?;

        let seq = self.sequence() + 1;
        let prune = self.inner.snapshots.lock().is_empty();

        for delta in txn.deltas() {
            let column = &self.inner.columns[delta.column];
            let mut rows = column.rows.write();
            match delta.op {
                Op::Set => {
                    put(&mut rows, &delta.key, seq, Some(delta.value.clone()), prune);
                    self.inner.counters.sets.fetch_add(1, Ordering::Relaxed);
                }
                Op::Delete => {
                    put(&mut rows, &delta.key, seq, None, prune);
                    self.inner.counters.deletes.fetch_add(1, Ordering::Relaxed);
                }
                Op::DeleteRange => {
                    let keys: Vec<_> = rows
                        .range::<[u8], _>((
                            Bound::Included(delta.key.as_slice()),
                            Bound::Excluded(delta.value.as_slice()),
                        ))
                        .filter(|(_, versions)| visible(versions, seq).is_some())
                        .map(|(k, _)| k.clone())
                        .collect();

                    for key in keys {
                        put(&mut rows, &key, seq, None, prune);
                        self.inner.counters.deletes.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        self.inner.sequence.store(seq, Ordering::Release);
        self.inner.counters.commits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            "Committed sequence {} ({} deltas, {} bytes)",
            seq,
            txn.len(),
            txn.bytes()
        );

        Ok(seq)
    }

    fn validate(&self, txn: &Txn) -> Result<()> {
        let opts = &self.inner.opts;
        if txn.bytes() > opts.max_txn_size {
            return Err(Error::TxnTooLarge {
                size: txn.bytes(),
                max: opts.max_txn_size,
            });
        }

        for delta in txn.deltas() {
            if !self.inner.columns.contains_key(delta.column) {
                return Err(Error::UnknownColumn(delta.column.to_string()));
            }

            if delta.key.len() > opts.max_key_size {
                return Err(Error::KeyTooLarge {
                    column: delta.column,
                    size: delta.key.len(),
                    max: opts.max_key_size,
                });
            }

            match delta.op {
                Op::Set if delta.value.len() > opts.max_value_size => {
                    return Err(Error::ValueTooLarge {
                        column: delta.column,
                        size: delta.value.len(),
                        max: opts.max_value_size,
                    });
                }
                Op::DeleteRange if delta.value < delta.key => {
                    return Err(Error::InvalidRange(delta.column));
                }
                _ => (),
            }
        }

        Ok(())
    }

    /// Drop versions which no reader can observe any more.
    pub fn compact(&self) -> usize {
        let horizon = self.inner.horizon();
        let mut dropped = 0;

        for column in self.inner.columns.values() {
            let mut rows = column.rows.write();
            rows.retain(|_, versions| {
                // newest version at or below the horizon; everything older is hidden
                if let Some(pos) = versions.iter().rposition(|v| v.seq <= horizon) {
                    dropped += pos;
                    versions.drain(..pos);
                }

                let dead = versions.len() == 1 && versions[0].value.is_none();
                if dead {
                    dropped += 1;
                }
                !dead
            });
        }

        tracing::debug!("Compaction at sequence {} dropped {} versions", horizon, dropped);
        dropped
    }

    pub fn stats(&self) -> Stats {
        let c = &self.inner.counters;
        Stats {
            gets: c.gets.load(Ordering::Relaxed),
            sets: c.sets.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
            prefetches: c.prefetches.load(Ordering::Relaxed),
            sequence: self.sequence(),
            snapshots: self.inner.snapshots.lock().values().sum(),
        }
    }

    /// Write the latest committed state to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let _write = self.inner.write.lock();
        let seq = self.sequence();

        let columns = self
            .inner
            .columns
            .values()
            .map(|column| SavedColumn {
                name: column.desc.name.to_string(),
                rows: column
                    .rows
                    .read()
                    .iter()
                    .filter_map(|(k, v)| visible(v, seq).map(|v| (k.clone(), v.clone())))
                    .collect(),
            })
            .collect();

        let saved = SavedDatabase { seq, columns };
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bincode::serialize(&saved)?)?;
        std::fs::rename(&tmp, path)?;

        tracing::info!("Saved database at sequence {} to {}", seq, path.display());
        Ok(())
    }

    /// Open a store with `descriptors` and restore whatever `path` holds.
    /// A missing file yields an empty store; saved columns which are no
    /// longer declared are dropped.
    pub fn load(path: impl AsRef<Path>, opts: DbOpts, descriptors: &[Descriptor]) -> Result<Self> {
        let path = path.as_ref();
        let db = Self::open(opts, descriptors);
        if !path.exists() {
            tracing::info!("No database at {}, starting empty", path.display());
            return Ok(db);
        }

        let saved: SavedDatabase = bincode::deserialize(&std::fs::read(path)?)?;
        for column in saved.columns {
            let data = match db.inner.columns.get(column.name.as_str()) {
                Some(data) => data,
                None => {
                    tracing::warn!("Dropping undeclared column '{}'", column.name);
                    continue;
                }
            };

            let mut rows = data.rows.write();
            for (key, value) in column.rows {
                rows.insert(
                    key,
                    vec![Version {
                        seq: saved.seq,
                        value: Some(value),
                    }],
                );
            }
        }
        db.inner.sequence.store(saved.seq, Ordering::Release);

        tracing::info!(
            "Loaded database at sequence {} from {}",
            saved.seq,
            path.display()
        );
        Ok(db)
    }
}

fn put(rows: &mut Rows, key: &[u8], seq: u64, value: Option<Vec<u8>>, prune: bool) {
    match rows.get_mut(key) {
        Some(versions) => {
            // readers still at the previous sequence need its version
            if prune && versions.len() > 1 {
                let keep = versions.len() - 1;
                versions.drain(..keep);
            }
            versions.push(Version { seq, value });
        }
        None if value.is_none() => (),
        None => {
            rows.insert(key.to_vec(), vec![Version { seq, value }]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[Descriptor] = &[Descriptor::new("a", "test column a"), Descriptor::new("b", "")];

    #[test]
    fn snapshot_pins_old_versions() {
        let db = Database::open(DbOpts::default(), COLUMNS);
        let col = db.column("a").unwrap();

        col.set(b"k", b"1").unwrap();
        let snap = db.snapshot();
        col.set(b"k", b"2").unwrap();
        col.del(b"k").unwrap();

        assert_eq!(col.get_at(&snap, b"k").unwrap(), b"1");
        assert!(!col.has(b"k"));

        // the snapshot's version survives compaction
        db.compact();
        assert_eq!(col.get_at(&snap, b"k").unwrap(), b"1");

        drop(snap);
        db.compact();
        assert_eq!(db.inner.columns["a"].rows.read().len(), 0);
    }

    #[test]
    fn rejected_txn_writes_nothing() {
        let db = Database::open(
            DbOpts {
                max_key_size: 4,
                ..Default::default()
            },
            COLUMNS,
        );

        let mut txn = Txn::new();
        txn.set("a", b"ok".to_vec(), b"v".to_vec());
        txn.set("b", b"too long".to_vec(), b"v".to_vec());
        assert!(matches!(db.commit(&txn), Err(Error::KeyTooLarge { .. })));
        assert!(!db.column("a").unwrap().has(b"ok"));
        assert_eq!(db.sequence(), 0);

        let mut txn = Txn::new();
        txn.set("nope", b"k".to_vec(), b"v".to_vec());
        assert!(matches!(db.commit(&txn), Err(Error::UnknownColumn(_))));
    }
}
