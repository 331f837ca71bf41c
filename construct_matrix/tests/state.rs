mod utils;

use construct_matrix::Room;
use pretty_assertions::assert_eq;
use serde_json::json;
use utils::*;

fn name(n: &str, value: &str, depth: u64, prev: &str) -> construct_matrix::Event {
    event(n, "m.room.name", depth)
        .state_key("")
        .prev(&[prev])
        .content(json!({ "name": value }))
        .build()
}

#[test]
fn historical_state_is_isolated() {
    let dbs = open();
    let room_id = room_id();
    let room = Room::new(&dbs, &room_id);

    let create = write(&dbs, &event("create", "m.room.create", 1).state_key("").build());
    let first = write(&dbs, &name("n1", "first", 2, "create"));
    write(&dbs, &event("msg", "m.room.message", 3).prev(&["n1"]).build());
    let second = write(&dbs, &name("n2", "second", 4, "msg"));

    let at_create = room.state_at(&id("create")).unwrap();
    assert!(!at_create.is_present());
    assert_eq!(at_create.get_opt("m.room.name", "").unwrap(), None);
    assert_eq!(at_create.get("m.room.create", "").unwrap(), create);

    let at_first = room.state_at(&id("n1")).unwrap();
    assert_eq!(at_first.get("m.room.name", "").unwrap(), first);

    // a non-state event sees the state in effect before it
    let at_msg = room.state_at(&id("msg")).unwrap();
    assert_eq!(at_msg.get("m.room.name", "").unwrap(), first);
    assert_eq!(at_msg.root(), at_first.root());

    let at_second = room.state_at(&id("n2")).unwrap();
    assert_eq!(at_second.get("m.room.name", "").unwrap(), second);
    assert_eq!(at_second.count().unwrap(), 2);

    let present = room.state();
    assert!(present.is_present());
    assert_eq!(present.get("m.room.name", "").unwrap(), second);
    assert!(present.get("m.room.topic", "").unwrap_err().is_not_found());
}

#[test]
fn iteration_is_ordered_and_resumable() {
    let dbs = open();
    let room_id = room_id();
    let room = Room::new(&dbs, &room_id);

    write(&dbs, &event("create", "m.room.create", 1).state_key("").build());
    let users = ["@dave:test", "@bob:test", "@carol:test", "@alice:test"];
    let mut prev = "create".to_string();
    for (i, user) in users.iter().enumerate() {
        let n = format!("m{}", i);
        write(
            &dbs,
            &member(&n, user, "join", i as u64 + 2).prev(&[prev.as_str()]).build(),
        );
        prev = n;
    }

    let last = room.state_at(&id(&prev)).unwrap();
    for state in [room.state(), last] {
        let mut seen = Vec::new();
        state
            .for_each(|kind, state_key, _| {
                seen.push(format!("{} {}", kind, state_key));
                true
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                "m.room.create ",
                "m.room.member @alice:test",
                "m.room.member @bob:test",
                "m.room.member @carol:test",
                "m.room.member @dave:test",
            ]
        );

        let mut page = Vec::new();
        state
            .for_each_from(Some(("m.room.member", "@bob:test")), |_, state_key, _| {
                page.push(state_key.to_string());
                page.len() < 2
            })
            .unwrap();
        assert_eq!(page, vec!["@bob:test", "@carol:test"]);

        assert_eq!(state.count_type("m.room.member").unwrap(), 4);
        assert_eq!(state.count().unwrap(), 5);
    }
}

#[test]
fn membership_tracks_joins_and_leaves() {
    let dbs = open();
    let room_id = room_id();
    let members = Room::new(&dbs, &room_id).members();

    write(&dbs, &member("a1", "@alice:test", "join", 1).build());
    write(&dbs, &member("b1", "@bob:other.org", "join", 2).prev(&["a1"]).build());
    write(&dbs, &member("c1", "@carol:test", "invite", 3).prev(&["b1"]).build());

    assert_eq!(members.count(), 2);
    assert_eq!(members.origins(), vec!["other.org", "test"]);
    assert_eq!(members.count_origin("test"), 1);

    write(&dbs, &member("a2", "@alice:test", "leave", 4).prev(&["c1"]).build());
    assert!(!members.has(&construct_matrix::UserId::new("@alice:test").unwrap()));
    assert_eq!(members.origins(), vec!["other.org"]);

    let mut all = Vec::new();
    members.for_each(|user| {
        all.push(user.to_string());
        true
    });
    assert_eq!(all, vec!["@bob:other.org"]);
}

#[test]
fn redaction_removes_present_state_only() {
    let dbs = open();
    let room_id = room_id();
    let room = Room::new(&dbs, &room_id);

    write(&dbs, &event("create", "m.room.create", 1).state_key("").build());
    let first = write(&dbs, &name("n1", "first", 2, "create"));
    write(
        &dbs,
        &event("r1", "m.room.redaction", 3)
            .prev(&["n1"])
            .redacts("n1")
            .build(),
    );

    assert!(!room.state().has("m.room.name", "").unwrap());
    assert_eq!(
        room.state_at(&id("n1")).unwrap().get("m.room.name", "").unwrap(),
        first
    );
}

#[test]
fn present_prefetch_covers_every_state_key_of_a_type() {
    let dbs = open();
    let room_id = room_id();
    let room = Room::new(&dbs, &room_id);

    write(&dbs, &event("create", "m.room.create", 1).state_key("").build());
    write(&dbs, &member("m0", "@alice:test", "join", 2).prev(&["create"]).build());
    write(&dbs, &member("m1", "@bob:test", "join", 3).prev(&["m0"]).build());

    let before = dbs.database().stats().prefetches;
    let present = room.state();
    assert!(present.prefetch("m.room.member"));
    assert!(present.prefetch("m.room.create"));
    assert!(!present.prefetch("m.room.topic"));
    assert_eq!(dbs.database().stats().prefetches - before, 3);
}
