mod utils;

use construct_db::{DbOpts, Op, Txn};
use construct_matrix::{
    dbs::{desc, event_type},
    event::decode_idx,
    Appendix, RefType, Refs, WriteOpts,
};
use pretty_assertions::assert_eq;
use utils::*;

#[test]
fn event_type_index_decodes_to_assigned_idx() {
    let dbs = open();
    let ev = event("a", "m.room.message", 5).build();
    let idx = write_with(
        &dbs,
        &ev,
        Appendix::EVENT_ID | Appendix::EVENT_JSON | Appendix::EVENT_TYPE,
    );

    let column = dbs.database().column(desc::EVENT_TYPE).unwrap();
    let mut keys = Vec::new();
    column
        .cursor(&event_type::prefix("m.room.message"))
        .for_each(|key, _| {
            keys.push(key.to_vec());
            true
        });
    let found: Vec<_> = keys.iter().map(|key| event_type::decode(key).unwrap()).collect();

    assert_eq!(found, vec![("m.room.message", idx)]);
    assert_eq!(dbs.index(&ev.event_id).unwrap(), idx);
    assert_eq!(dbs.fetch(idx).unwrap().depth, 5);

    // nothing outside the appendix was touched
    assert!(!Refs::new(&dbs, idx).has_any(None));
    assert_eq!(dbs.database().column(desc::ROOM_EVENTS).unwrap().count(b""), 0);
}

#[test]
fn delete_restores_previous_contents() {
    let dbs = open();
    write(&dbs, &event("create", "m.room.create", 1).state_key("").build());
    write(
        &dbs,
        &member("join", "@alice:test", "join", 2)
            .prev(&["create"])
            .auth(&["create"])
            .build(),
    );

    let before = dump(dbs.database(), &[desc::STATE_NODE]);

    let ev = event("topic", "m.room.topic", 3)
        .state_key("")
        .auth(&["create", "join"])
        .content(serde_json::json!({ "topic": "hello" }))
        .build();
    let idx = write(&dbs, &ev);
    assert!(Refs::new(&dbs, dbs.index(&utils::id("join")).unwrap()).has(RefType::NextAuth, idx));

    let opts = dbs.write_opts().with_idx(idx).with_op(Op::Delete);
    let mut txn = Txn::new();
    dbs.write(&mut txn, &ev, &opts).unwrap();
    dbs.database().commit(&txn).unwrap();

    assert_eq!(dump(dbs.database(), &[desc::STATE_NODE]), before);
}

#[test]
fn deleting_replacement_state_restores_what_it_replaced() {
    let dbs = open();
    let room_id = room_id();
    let room = construct_matrix::Room::new(&dbs, &room_id);

    write(&dbs, &event("create", "m.room.create", 1).state_key("").build());
    let name1 = write(
        &dbs,
        &event("name1", "m.room.name", 2)
            .state_key("")
            .prev(&["create"])
            .content(serde_json::json!({ "name": "one" }))
            .build(),
    );

    let before = dump(dbs.database(), &[desc::STATE_NODE]);

    let ev = event("name2", "m.room.name", 3)
        .state_key("")
        .prev(&["name1"])
        .content(serde_json::json!({ "name": "two" }))
        .build();
    let name2 = write(&dbs, &ev);

    let refs = Refs::new(&dbs, name1);
    assert!(refs.has(RefType::NextState, name2));
    assert!(Refs::new(&dbs, name2).has(RefType::PrevState, name1));
    assert_eq!(room.state().get_opt("m.room.name", "").unwrap(), Some(name2));
    assert!(!room.head().has(&utils::id("name1")));

    unwrite(&dbs, &ev, name2);

    assert!(!refs.has(RefType::NextState, name2));
    assert_eq!(room.state().get_opt("m.room.name", "").unwrap(), Some(name1));
    assert!(room.head().has(&utils::id("name1")));
    assert_eq!(dump(dbs.database(), &[desc::STATE_NODE]), before);
}

#[test]
fn deleting_merge_restores_only_unreferenced_heads() {
    let dbs = open();
    let room_id = room_id();
    let head = construct_matrix::Room::new(&dbs, &room_id).head();

    write(&dbs, &event("a", "m.room.message", 1).build());
    write(&dbs, &event("b1", "m.room.message", 2).prev(&["a"]).build());
    write(&dbs, &event("b2", "m.room.message", 2).prev(&["a"]).build());
    assert_eq!(head.count(), 2);

    let before = dump(dbs.database(), &[desc::STATE_NODE]);

    // `a` is referenced by both forks, so it must not come back as a head
    let merge = event("merge", "m.room.message", 3)
        .prev(&["b1", "b2", "a"])
        .build();
    let idx = write(&dbs, &merge);
    assert_eq!(head.count(), 1);

    unwrite(&dbs, &merge, idx);

    assert_eq!(head.count(), 2);
    assert!(head.has(&utils::id("b1")));
    assert!(head.has(&utils::id("b2")));
    assert!(!head.has(&utils::id("a")));
    assert_eq!(dump(dbs.database(), &[desc::STATE_NODE]), before);
}

#[test]
fn deleting_membership_change_keeps_the_member_joined() {
    let dbs = open();
    let room_id = room_id();
    let room = construct_matrix::Room::new(&dbs, &room_id);
    let alice = construct_matrix::UserId::new("@alice:test").unwrap();

    let join = write(&dbs, &member("join", "@alice:test", "join", 1).build());
    let before = dump(dbs.database(), &[desc::STATE_NODE]);

    let leave = member("leave", "@alice:test", "leave", 2)
        .prev(&["join"])
        .build();
    let idx = write(&dbs, &leave);
    assert!(!room.members().has(&alice));

    unwrite(&dbs, &leave, idx);

    assert!(room.members().has(&alice));
    assert_eq!(room.state().get_opt("m.room.member", "@alice:test").unwrap(), Some(join));
    assert_eq!(dump(dbs.database(), &[desc::STATE_NODE]), before);
}

#[test]
fn unindexing_superseded_state_keeps_present_state() {
    let dbs = open();
    let room_id = room_id();
    let room = construct_matrix::Room::new(&dbs, &room_id);

    let a = write(
        &dbs,
        &event("topic_a", "m.room.topic", 1)
            .state_key("")
            .content(serde_json::json!({ "topic": "a" }))
            .build(),
    );
    let b = write(
        &dbs,
        &event("topic_b", "m.room.topic", 2)
            .state_key("")
            .prev(&["topic_a"])
            .content(serde_json::json!({ "topic": "b" }))
            .build(),
    );

    assert!(dbs.unindex(a).unwrap() > 0);

    assert_eq!(room.state().get_opt("m.room.topic", "").unwrap(), Some(b));
    assert!(room.head().has(&utils::id("topic_b")));
    assert!(!dbs.exists(&utils::id("topic_a")).unwrap());
}

#[test]
fn deleting_refs_removes_the_edge() {
    let dbs = open();
    let target = write(&dbs, &event("msg", "m.room.message", 1).build());
    let redaction = event("redact", "m.room.redaction", 2)
        .prev(&["msg"])
        .redacts("msg")
        .build();
    let idx = write(&dbs, &redaction);

    let refs = Refs::new(&dbs, target);
    assert!(refs.has(RefType::MRoomRedaction, idx));
    assert!(refs.has(RefType::Next, idx));

    let opts = WriteOpts {
        op: Op::Delete,
        event_idx: idx,
        appendix: Appendix::EVENT_REFS,
        ..Default::default()
    };
    let mut txn = Txn::new();
    dbs.write(&mut txn, &redaction, &opts).unwrap();
    dbs.database().commit(&txn).unwrap();

    assert!(!refs.has(RefType::MRoomRedaction, idx));
    assert!(!refs.has_any(None));
    assert!(dbs.exists(&redaction.event_id).unwrap());
}

#[test]
fn failed_commit_leaves_nothing_behind() {
    let dbs = open_with(DbOpts {
        max_value_size: 256,
        ..Default::default()
    });

    let ev = event("big", "m.room.message", 1)
        .content(serde_json::json!({ "body": "x".repeat(1024) }))
        .build();

    let opts = dbs.write_opts().with_idx(dbs.next_idx());
    let mut txn = Txn::new();
    assert!(dbs.write(&mut txn, &ev, &opts).unwrap() > 5);
    assert!(dbs.database().commit(&txn).is_err());

    assert!(dump(dbs.database(), &[]).is_empty());
    assert!(!dbs.exists(&ev.event_id).unwrap());
}

#[test]
fn uncommitted_writes_are_invisible() {
    let dbs = open();
    let ev = event("a", "m.room.message", 1).build();
    let opts = dbs.write_opts().with_idx(dbs.next_idx());

    let mut txn = Txn::new();
    dbs.write(&mut txn, &ev, &opts).unwrap();
    assert!(txn.has(Op::Set, desc::EVENT_IDX, ev.event_id.as_bytes()));
    assert!(dbs.index_opt(&ev.event_id).unwrap().is_none());
}

#[test]
fn blacklisted_ids_read_as_absent() {
    let dbs = open();
    let ev = event("bad", "m.room.message", 1).build();
    let opts = WriteOpts {
        blacklist: true,
        ..dbs.write_opts()
    };

    let mut txn = Txn::new();
    assert_eq!(dbs.write(&mut txn, &ev, &opts).unwrap(), 1);
    dbs.database().commit(&txn).unwrap();

    assert!(dbs.is_blacklisted(&ev.event_id).unwrap());
    assert!(!dbs.exists(&ev.event_id).unwrap());
    assert!(dbs.index(&ev.event_id).unwrap_err().is_not_found());

    let raw = dbs
        .database()
        .column(desc::EVENT_IDX)
        .unwrap()
        .get(ev.event_id.as_bytes())
        .unwrap();
    assert_eq!(decode_idx(&raw), Some(0));
}

#[test]
fn horizon_completes_when_target_arrives() {
    let dbs = open();
    let child = event("child", "m.room.message", 2).prev(&["parent"]).build();
    let child_idx = write(&dbs, &child);

    let room_id = room_id();
    let room = construct_matrix::Room::new(&dbs, &room_id);
    assert_eq!(room.horizon().count().unwrap(), 1);
    assert_eq!(room.missing().count().unwrap(), 1);
    assert!(room.head().has(&child.event_id));

    let parent = event("parent", "m.room.message", 1).build();
    let parent_idx = write(&dbs, &parent);

    assert!(Refs::new(&dbs, parent_idx).has(RefType::Next, child_idx));
    assert_eq!(room.horizon().count().unwrap(), 0);
    assert_eq!(room.missing().count().unwrap(), 0);

    // the late parent is referenced already, so it never became a head
    assert!(!room.head().has(&parent.event_id));
    assert!(room.head().has(&child.event_id));
    assert_eq!(room.head().count(), 1);
}

#[test]
fn redaction_before_target_keeps_it_out_of_present_state() {
    let dbs = open();
    let room_id = room_id();
    let room = construct_matrix::Room::new(&dbs, &room_id);

    write(
        &dbs,
        &event("redact", "m.room.redaction", 3).redacts("name").build(),
    );

    let name = event("name", "m.room.name", 2)
        .state_key("")
        .content(serde_json::json!({ "name": "lobby" }))
        .build();
    let name_idx = write(&dbs, &name);

    assert!(!room.state().has("m.room.name", "").unwrap());
    let redaction = dbs.index(&utils::id("redact")).unwrap();
    assert!(Refs::new(&dbs, name_idx).has(RefType::MRoomRedaction, redaction));
}

#[test]
fn rebuild_restores_dropped_indices() {
    let dbs = open();
    write(&dbs, &event("a", "m.room.message", 1).build());
    write(&dbs, &event("b", "m.room.message", 2).prev(&["a"]).build());

    let before = dump(dbs.database(), &[]);

    let mut txn = Txn::new();
    dbs.database()
        .column(desc::EVENT_TYPE)
        .unwrap()
        .cursor(b"")
        .for_each(|key, _| {
            txn.delete(desc::EVENT_TYPE, key);
            true
        });
    dbs.database().commit(&txn).unwrap();
    assert_ne!(dump(dbs.database(), &[]), before);

    assert_eq!(dbs.rebuild(Appendix::EVENT_TYPE).unwrap(), 2);
    assert_eq!(dump(dbs.database(), &[]), before);
}
