mod utils;

use construct_matrix::{room::Gap, Room};
use pretty_assertions::assert_eq;
use utils::*;

/// A linear chain of messages, one per depth, skipping `missing`
fn chain(dbs: &construct_matrix::Dbs, depths: std::ops::RangeInclusive<u64>, missing: &[u64]) -> Vec<u64> {
    let mut indices = Vec::new();
    let mut prev: Option<String> = None;
    for depth in depths {
        let n = format!("e{}", depth);
        if !missing.contains(&depth) {
            let mut ev = event(&n, "m.room.message", depth);
            if let Some(prev) = &prev {
                ev = ev.prev(&[prev.as_str()]);
            }
            indices.push(write(dbs, &ev.build()));
        }
        prev = Some(n);
    }
    indices
}

#[test]
fn gaps_are_reported_exactly() {
    let dbs = open();
    let room_id = room_id();
    let sounding = Room::new(&dbs, &room_id).sounding();

    let idx = chain(&dbs, 1..=10, &[4, 5, 6, 9]);
    // idx: depths 1 2 3 7 8 10
    let (d3, d7, d8, d10) = (idx[2], idx[3], idx[4], idx[5]);

    let mut gaps = Vec::new();
    sounding.for_each(|gap| {
        gaps.push(gap.clone());
        true
    });
    assert_eq!(
        gaps,
        vec![
            Gap { range: 4..7, above: d7, below: d3 },
            Gap { range: 9..10, above: d10, below: d8 },
        ]
    );

    let mut rgaps = Vec::new();
    sounding.rfor_each(|gap| {
        rgaps.push(gap.range.clone());
        true
    });
    assert_eq!(rgaps, vec![9..10, 4..7]);

    assert_eq!(sounding.sounding(), Some((9, d10)));
    assert_eq!(sounding.twain(), Some((8, d8)));
    assert_eq!(sounding.hazard(), Some((4, d3)));
    assert_eq!(sounding.count(), 2);
}

#[test]
fn contiguous_timeline_has_no_gaps() {
    let dbs = open();
    let room_id = room_id();
    let sounding = Room::new(&dbs, &room_id).sounding();

    assert_eq!(sounding.sounding(), None);
    chain(&dbs, 1..=5, &[]);
    assert_eq!(sounding.sounding(), None);
    assert_eq!(sounding.hazard(), None);
    assert_eq!(sounding.count(), 0);
}

#[test]
fn timeline_cursor_moves_both_ways() {
    let dbs = open();
    let room_id = room_id();
    let room = Room::new(&dbs, &room_id);
    let idx = chain(&dbs, 1..=6, &[3]);

    let mut events = room.events();
    assert_eq!(events.depth(), Some(6));
    assert_eq!(room.depth(), Some(6));

    assert!(events.seek(3));
    assert_eq!(events.depth(), Some(4));
    assert!(events.seek_rev(3));
    assert_eq!(events.depth(), Some(2));

    assert!(events.seek_event(&id("e5")).unwrap());
    assert_eq!(events.event_idx(), Some(idx[3]));
    assert_eq!(events.fetch().unwrap().event_id, id("e5"));
    assert!(events.prev());
    assert_eq!(events.event_id().unwrap(), id("e4"));
    assert!(!events.seek_event(&id("e3")).unwrap());

    let mut down = Vec::new();
    events.top();
    events.rfor_each(|depth, _| {
        down.push(depth);
        true
    });
    assert_eq!(down, vec![6, 5, 4, 2, 1]);
    assert!(!events.valid());

    assert_eq!(events.count(1, 5), 3);
    assert_eq!(events.prefetch(2, 4), 2);
}

#[test]
fn head_follows_forward_extremities() {
    let dbs = open();
    let room_id = room_id();
    let head = Room::new(&dbs, &room_id).head();

    chain(&dbs, 1..=3, &[]);
    write(&dbs, &event("fork", "m.room.message", 3).prev(&["e2"]).build());
    assert_eq!(head.count(), 2);
    assert!(head.has(&id("e3")));
    assert!(head.has(&id("fork")));

    let generated = head.generate(8).unwrap();
    assert_eq!(generated.depth, (3, 3));
    assert_eq!(generated.prev_events.len(), 2);
    assert_eq!(head.generate(1).unwrap().prev_events, vec![id("e3")]);

    write(&dbs, &event("merge", "m.room.message", 4).prev(&["e3", "fork"]).build());
    assert_eq!(head.count(), 1);

    let mut heads = Vec::new();
    head.for_each(|event_id, _| {
        heads.push(event_id.to_string());
        true
    })
    .unwrap();
    assert_eq!(heads, vec![id("merge").to_string()]);

    assert_eq!(head.rebuild().unwrap(), 1);
    assert!(head.has(&id("merge")));
}

#[test]
fn missing_lists_unknown_prev_events() {
    let dbs = open();
    let room_id = room_id();
    let room = Room::new(&dbs, &room_id);
    chain(&dbs, 1..=4, &[2]);

    let mut missing = Vec::new();
    room.missing()
        .for_each(|event_id, _| {
            missing.push(event_id.clone());
            true
        })
        .unwrap();
    assert_eq!(missing, vec![id("e2")]);

    let mut horizon = Vec::new();
    room.horizon()
        .for_each(|event_id, _| {
            horizon.push(event_id.to_string());
            true
        })
        .unwrap();
    assert_eq!(horizon, vec![id("e2").to_string()]);
    assert_eq!(room.horizon().rebuild().unwrap(), 3);
    assert_eq!(room.horizon().count().unwrap(), 1);
}
