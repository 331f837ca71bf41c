#![allow(dead_code)]

use std::collections::BTreeMap;

use construct_db::{Database, DbOpts, Op, Txn};
use construct_matrix::*;
use serde_json::{json, Value};

pub const ROOM: &str = "!room:test";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn open() -> Dbs {
    open_with(DbOpts::default())
}

pub fn open_with(opts: DbOpts) -> Dbs {
    init_tracing();
    let db = Database::open(opts, Dbs::descriptors());
    Dbs::open(db, DbsConfig::default()).unwrap()
}

pub fn room_id() -> RoomId {
    RoomId::new(ROOM).unwrap()
}

pub fn id(name: &str) -> EventId {
    EventId::new(format!("${}:test", name)).unwrap()
}

/// Builds test events in room [`ROOM`]
pub struct EventBuilder {
    event: Event,
}

pub fn event(name: &str, kind: &str, depth: u64) -> EventBuilder {
    EventBuilder {
        event: Event {
            event_id: id(name),
            room_id: Some(room_id()),
            sender: UserId::new("@alice:test").unwrap(),
            kind: kind.to_string(),
            state_key: None,
            depth,
            prev_events: Vec::new(),
            auth_events: Vec::new(),
            redacts: None,
            content: json!({}),
            origin: Some("test".to_string()),
            origin_server_ts: 1000 + depth,
            source: None,
        },
    }
}

/// A `m.room.member` event for `user`
pub fn member(name: &str, user: &str, membership: &str, depth: u64) -> EventBuilder {
    event(name, "m.room.member", depth)
        .state_key(user)
        .content(json!({ "membership": membership }))
}

impl EventBuilder {
    pub fn state_key(mut self, state_key: &str) -> Self {
        self.event.state_key = Some(state_key.to_string());
        self
    }

    pub fn prev(mut self, names: &[&str]) -> Self {
        self.event.prev_events = names.iter().map(|n| id(n)).collect();
        self
    }

    pub fn auth(mut self, names: &[&str]) -> Self {
        self.event.auth_events = names.iter().map(|n| id(n)).collect();
        self
    }

    pub fn redacts(mut self, name: &str) -> Self {
        self.event.redacts = Some(id(name));
        self
    }

    pub fn content(mut self, content: Value) -> Self {
        self.event.content = content;
        self
    }

    pub fn sender(mut self, sender: &str) -> Self {
        self.event.sender = UserId::new(sender).unwrap();
        self
    }

    pub fn build(self) -> Event {
        self.event
    }
}

/// Index and commit an event with a fresh index and the given appendix.
pub fn write_with(dbs: &Dbs, event: &Event, appendix: Appendix) -> EventIdx {
    let opts = dbs
        .write_opts()
        .with_idx(dbs.next_idx())
        .with_appendix(appendix);

    let mut txn = Txn::new();
    dbs.write(&mut txn, event, &opts).unwrap();
    dbs.database().commit(&txn).unwrap();
    opts.event_idx
}

pub fn write(dbs: &Dbs, event: &Event) -> EventIdx {
    write_with(dbs, event, Appendix::all())
}

/// Commit the inverse of a full write of `event` at `idx`.
pub fn unwrite(dbs: &Dbs, event: &Event, idx: EventIdx) {
    let opts = dbs.write_opts().with_idx(idx).with_op(Op::Delete);
    let mut txn = Txn::new();
    dbs.write(&mut txn, event, &opts).unwrap();
    dbs.database().commit(&txn).unwrap();
}

/// Every row of every column except `skip`, for comparing whole databases
pub fn dump(db: &Database, skip: &[&str]) -> BTreeMap<(String, Vec<u8>), Vec<u8>> {
    let mut ret = BTreeMap::new();
    for desc in db.descriptors() {
        if skip.contains(&desc.name) {
            continue;
        }

        let column = db.column(desc.name).unwrap();
        column.cursor(b"").for_each(|key, value| {
            ret.insert((desc.name.to_string(), key.to_vec()), value.to_vec());
            true
        });
    }
    ret
}
