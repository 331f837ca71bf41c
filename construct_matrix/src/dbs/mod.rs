//! The event graph write pipeline.
//!
//! [`Dbs::write`] turns one event into the deltas of every index selected
//! by its [`Appendix`], appended to a caller-owned [`Txn`]. Nothing is
//! visible until that transaction is committed, so an event is either fully
//! indexed or not at all. Each indexer is invertible: writing the same event
//! with [`Op::Delete`] removes exactly the keys a `Set` added.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use construct_ctx::{SharedMutex, UpgradeLock};
use construct_db::{Column, Database, Descriptor, Op, Txn};
use dashmap::DashMap;
use strum::IntoEnumIterator;

use crate::{
    event::{decode_idx, encode_idx, Event, EventIdx, Property},
    Error, EventId, Result, RoomId,
};

mod appendix;
pub use appendix::{Appendix, Index};

mod ref_type;
pub use ref_type::{RefType, RefTypes};

mod opts;
pub use opts::{DbsConfig, WriteOpts};

pub mod desc;

pub mod event_cols;
pub mod event_horizon;
pub mod event_id;
pub mod event_json;
pub mod event_refs;
pub mod event_sender;
pub mod event_state;
pub mod event_type;
pub mod room_events;
pub mod room_head;
pub mod room_joined;
pub mod room_redact;
pub mod room_state;
pub mod room_state_space;
pub mod room_type;

mod rebuild;

/// Handles to every column the pipeline writes
pub(crate) struct Columns {
    pub event_idx: Column,
    pub event_json: Column,
    pub event_refs: Column,
    pub event_horizon: Column,
    pub event_sender: Column,
    pub event_type: Column,
    pub event_state: Column,
    pub room_events: Column,
    pub room_type: Column,
    pub room_head: Column,
    pub room_state: Column,
    pub room_state_space: Column,
    pub room_joined: Column,
    pub state_node: Column,
    pub state_root: Column,
    props: Vec<Column>,
}

impl Columns {
    fn open(db: &Database) -> Result<Self> {
        Ok(Self {
            event_idx: db.column(desc::EVENT_IDX)?,
            event_json: db.column(desc::EVENT_JSON)?,
            event_refs: db.column(desc::EVENT_REFS)?,
            event_horizon: db.column(desc::EVENT_HORIZON)?,
            event_sender: db.column(desc::EVENT_SENDER)?,
            event_type: db.column(desc::EVENT_TYPE)?,
            event_state: db.column(desc::EVENT_STATE)?,
            room_events: db.column(desc::ROOM_EVENTS)?,
            room_type: db.column(desc::ROOM_TYPE)?,
            room_head: db.column(desc::ROOM_HEAD)?,
            room_state: db.column(desc::ROOM_STATE)?,
            room_state_space: db.column(desc::ROOM_STATE_SPACE)?,
            room_joined: db.column(desc::ROOM_JOINED)?,
            state_node: db.column(desc::STATE_NODE)?,
            state_root: db.column(desc::STATE_ROOT)?,
            props: Property::iter()
                .map(|p| db.column(p.column()))
                .collect::<construct_db::Result<_>>()?,
        })
    }

    pub fn prop(&self, prop: Property) -> &Column {
        &self.props[prop as usize]
    }
}

/// Stage a write or its inverse.
pub(crate) fn append(
    txn: &mut Txn,
    op: Op,
    column: &'static str,
    key: impl Into<Vec<u8>>,
    value: impl Into<Vec<u8>>,
) {
    match op {
        Op::Set => txn.set(column, key, value),
        Op::Delete => txn.delete(column, key),
        Op::DeleteRange => {
            debug_assert!(false, "indexers write single keys");
            txn.delete(column, key)
        }
    }
}

/// The event graph: indices over a [`Database`] plus the write pipeline
/// which maintains them.
pub struct Dbs {
    db: Database,
    config: DbsConfig,
    pub(crate) columns: Columns,
    next_idx: AtomicU64,
    room_locks: DashMap<RoomId, Arc<SharedMutex>>,
}

impl Dbs {
    /// Columns to open the underlying database with
    pub fn descriptors() -> &'static [Descriptor] {
        desc::DESCRIPTORS
    }

    pub fn open(db: Database, config: DbsConfig) -> Result<Self> {
        let columns = Columns::open(&db)?;

        let mut last = columns.event_json.cursor(b"");
        let last_idx = match last.seek_last() {
            true => last
                .key()
                .and_then(decode_idx)
                .ok_or(Error::Corrupt(desc::EVENT_JSON))?,
            false => 0,
        };

        tracing::info!("Opened event graph; last event index {}", last_idx);

        Ok(Self {
            db,
            config,
            columns,
            next_idx: AtomicU64::new(last_idx + 1),
            room_locks: DashMap::new(),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &DbsConfig {
        &self.config
    }

    /// Default write options under this configuration
    pub fn write_opts(&self) -> WriteOpts {
        WriteOpts {
            allow_queries: self.config.allow_queries,
            ..Default::default()
        }
    }

    /// Issue a fresh event index.
    pub fn next_idx(&self) -> EventIdx {
        self.next_idx.fetch_add(1, Ordering::SeqCst)
    }

    /// The most recently issued event index, or zero
    pub fn last_idx(&self) -> EventIdx {
        self.next_idx.load(Ordering::SeqCst) - 1
    }

    /// The per-room writer lock. Writers hold its upgrade phase while
    /// building a transaction and its exclusive phase while committing it,
    /// which serialises the chaining of state roots within a room.
    pub fn room_lock(&self, room_id: &RoomId) -> Arc<SharedMutex> {
        self.room_locks
            .entry(room_id.clone())
            .or_insert_with(|| Arc::new(SharedMutex::new()))
            .clone()
    }

    /// Append the deltas indexing `event` to `txn`. Returns how many were
    /// appended.
    #[tracing::instrument(skip(self, txn, event), fields(event_id = %event.event_id, idx = opts.event_idx, op = ?opts.op))]
    pub fn write(&self, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<usize> {
        let before = txn.len();

        if opts.event_idx == 0 && opts.blacklist {
            self.blacklist(txn, &event.event_id, opts);
            return Ok(txn.len() - before);
        }

        if opts.event_idx == 0 {
            debug_assert!(false, "writing an event without an index");
            return Err(Error::InvalidEvent(format!(
                "no index for {}",
                event.event_id
            )));
        }

        self.index_event(txn, event, opts)?;

        if event.room_id.is_some() {
            self.index_room(txn, event, opts)?;
        }

        let count = txn.len() - before;
        tracing::trace!("Appended {} deltas for {}", count, opts.appendix);
        Ok(count)
    }

    fn blacklist(&self, txn: &mut Txn, event_id: &EventId, opts: &WriteOpts) {
        tracing::debug!("Blacklisting {}", event_id);
        append(
            txn,
            opts.op,
            desc::EVENT_IDX,
            event_id.as_bytes(),
            encode_idx(0),
        );
    }

    fn index_event(&self, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
        let appendix = opts.appendix;

        if appendix.contains(Appendix::EVENT_ID) {
            event_id::index(txn, event, opts);
        }

        if appendix.contains(Appendix::EVENT_COLS) {
            event_cols::index(txn, event, opts)?;
        }

        if appendix.contains(Appendix::EVENT_JSON) {
            event_json::index(txn, event, opts)?;
        }

        if appendix.contains(Appendix::EVENT_SENDER) {
            event_sender::index(txn, event, opts);
        }

        if appendix.contains(Appendix::EVENT_TYPE) {
            event_type::index(txn, event, opts);
        }

        if appendix.contains(Appendix::EVENT_STATE) && event.is_state() {
            event_state::index(self, txn, event, opts)?;
        }

        if appendix.contains(Appendix::EVENT_REFS) && !opts.event_refs.is_empty() {
            event_refs::index(self, txn, event, opts)?;
        }

        if appendix.contains(Appendix::EVENT_HORIZON_RESOLVE)
            && !opts.horizon_resolve.is_empty()
            && opts.op == Op::Set
        {
            event_horizon::resolve(self, txn, event, opts)?;
        }

        Ok(())
    }

    fn index_room(&self, txn: &mut Txn, event: &Event, opts: &WriteOpts) -> Result<()> {
        let appendix = opts.appendix;

        if appendix.contains(Appendix::ROOM_EVENTS) {
            room_events::index(txn, event, opts);
        }

        if appendix.contains(Appendix::ROOM_TYPE) {
            room_type::index(txn, event, opts);
        }

        if appendix.contains(Appendix::ROOM_HEAD) {
            room_head::index(self, txn, event, opts)?;
        }

        if appendix.contains(Appendix::ROOM_HEAD_REFS) {
            room_head::index_refs(self, txn, event, opts)?;
        }

        if appendix.intersects(Appendix::STATE) && event.is_state() {
            // read before any present-state row of this txn is staged
            let undo = match opts.op {
                Op::Set => room_state::Undo::Keep,
                _ => room_state::undo(self, txn, event, opts)?,
            };

            if appendix.contains(Appendix::ROOM_STATE) {
                room_state::index(txn, event, opts, undo);
            }

            if appendix.contains(Appendix::ROOM_STATE_SPACE) {
                room_state_space::index(txn, event, opts);
            }

            if appendix.contains(Appendix::ROOM_JOINED) && event.kind == "m.room.member" {
                room_joined::index(self, txn, event, opts, undo)?;
            }
        }

        if appendix.intersects(Appendix::REDACT) && event.kind == "m.room.redaction" {
            room_redact::index(self, txn, event, opts)?;
        }

        Ok(())
    }

    /// Resolve an event id to its index, consulting the transaction's own
    /// staged writes first. Zero if the event is unknown.
    pub(crate) fn find_event_idx(
        &self,
        txn: &Txn,
        event_id: &EventId,
        opts: &WriteOpts,
    ) -> Result<EventIdx> {
        if let Some(staged) = txn.val(desc::EVENT_IDX, event_id.as_bytes()) {
            return Ok(staged.and_then(decode_idx).unwrap_or(0));
        }

        if !opts.allow_queries {
            return Ok(0);
        }

        Ok(self.index_opt(event_id)?.unwrap_or(0))
    }

    /// Warm the reads a write of `event` with `opts` is going to make.
    /// Returns how many lookups were issued.
    pub fn prefetch(&self, event: &Event, opts: &WriteOpts) -> usize {
        if !self.config.prefetch_enable || !opts.allow_queries {
            return 0;
        }

        let mut ids: Vec<&EventId> = Vec::new();
        if opts.appendix.contains(Appendix::EVENT_REFS) {
            if opts.event_refs.has(RefType::Next) {
                ids.extend(&event.prev_events);
            }
            if opts.event_refs.has(RefType::NextAuth) {
                ids.extend(&event.auth_events);
            }
        }
        if opts.appendix.intersects(Appendix::EVENT_REFS | Appendix::ROOM_REDACT) {
            ids.extend(&event.redacts);
        }

        let mut ret = 0;
        for id in ids {
            self.columns.event_idx.prefetch(id.as_bytes());
            ret += 1;
        }

        if let (Some(room_id), Some(state_key)) = (&event.room_id, &event.state_key) {
            if opts.appendix.intersects(Appendix::EVENT_REFS | Appendix::ROOM_STATE) {
                let key = room_state::key(room_id, &event.kind, state_key);
                self.columns.room_state.prefetch(&key);
                ret += 1;
            }
        }

        ret
    }

    /// Index and commit one event under its room's writer lock. An index is
    /// issued unless `opts` carries one.
    #[tracing::instrument(skip(self, event, opts), fields(event_id = %event.event_id))]
    pub async fn commit_event(&self, event: &Event, opts: WriteOpts) -> Result<EventIdx> {
        event.check()?;

        let mutex = event.room_id.as_ref().map(|room_id| self.room_lock(room_id));
        let mut lock = match &mutex {
            Some(mutex) => Some(UpgradeLock::new(mutex).await?),
            None => None,
        };

        if self.exists(&event.event_id)? {
            return Err(Error::Exists(event.event_id.clone()));
        }

        if self.is_blacklisted(&event.event_id)? && !opts.blacklist {
            return Err(Error::InvalidEvent(format!(
                "{} is blacklisted",
                event.event_id
            )));
        }

        let event_idx = match (opts.blacklist, opts.event_idx) {
            (true, _) => 0,
            (false, 0) => self.next_idx(),
            (false, idx) => idx,
        };
        let opts = WriteOpts { event_idx, ..opts };

        self.prefetch(event, &opts);
        let mut txn = Txn::with_capacity(self.config.txn_reserve);
        self.write(&mut txn, event, &opts)?;

        if let Some(lock) = lock.as_mut() {
            lock.lock_exclusive().await?;
        }

        let seq = self.db.commit(&txn)?;
        tracing::debug!(
            "Committed {} at index {} (sequence {}, {} deltas)",
            event.event_id,
            event_idx,
            seq,
            txn.len()
        );

        Ok(event_idx)
    }
}
