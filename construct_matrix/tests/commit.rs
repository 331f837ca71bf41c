mod utils;

use std::sync::Arc;

use construct_matrix::{Error, Room, WriteOpts};
use pretty_assertions::assert_eq;
use utils::*;

#[tokio::test]
async fn commit_issues_indices_and_rejects_duplicates() {
    let dbs = open();
    let a = event("a", "m.room.message", 1).build();
    let b = event("b", "m.room.message", 2).prev(&["a"]).build();

    let ia = dbs.commit_event(&a, WriteOpts::default()).await.unwrap();
    let ib = dbs.commit_event(&b, WriteOpts::default()).await.unwrap();
    assert_eq!((ia, ib), (1, 2));
    assert_eq!(dbs.last_idx(), 2);

    match dbs.commit_event(&a, WriteOpts::default()).await {
        Err(Error::Exists(id)) => assert_eq!(id, a.event_id),
        other => panic!("expected Exists, got {:?}", other),
    }
}

#[tokio::test]
async fn blacklisted_events_are_refused() {
    let dbs = open();
    let ev = event("spam", "m.room.message", 1).build();

    let opts = WriteOpts {
        blacklist: true,
        ..WriteOpts::default()
    };
    assert_eq!(dbs.commit_event(&ev, opts).await.unwrap(), 0);
    assert!(dbs.is_blacklisted(&ev.event_id).unwrap());

    let err = dbs.commit_event(&ev, WriteOpts::default()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidEvent(_)));
}

#[tokio::test]
async fn invalid_events_are_rejected_before_indexing() {
    let dbs = open();
    let ev = event("r", "m.room.redaction", 1).build();
    let err = dbs.commit_event(&ev, WriteOpts::default()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidEvent(_)));
    assert_eq!(dbs.last_idx(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_chain_state_roots() {
    let dbs = Arc::new(open());

    let mut tasks = Vec::new();
    for i in 0..32 {
        let dbs = dbs.clone();
        tasks.push(tokio::spawn(async move {
            let user = format!("@user{:02}:test", i);
            let ev = member(&format!("m{}", i), &user, "join", 1).build();
            dbs.commit_event(&ev, WriteOpts::default()).await
        }));
    }

    let mut last = 0;
    for task in tasks {
        last = last.max(task.await.unwrap().unwrap());
    }

    let room_id = room_id();
    let room = Room::new(&dbs, &room_id);
    assert_eq!(room.members().count(), 32);
    assert_eq!(room.state().count().unwrap(), 32);

    // the newest root includes every earlier write to the room
    let newest = construct_matrix::room::State::at_idx(&dbs, &room_id, last).unwrap();
    assert_eq!(newest.count().unwrap(), 32);
}
