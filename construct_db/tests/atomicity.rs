mod utils;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use construct_db::{Error, Txn};
use pretty_assertions::assert_eq;

#[test]
fn readers_never_see_partial_commits() {
    let db = utils::open();
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let db = db.clone();
        thread::spawn(move || {
            for round in 0u32..500 {
                let mut txn = Txn::new();
                for key in 0u8..8 {
                    txn.set("idx", vec![key], round.to_be_bytes().to_vec());
                    txn.set("json", vec![key], round.to_be_bytes().to_vec());
                }
                db.commit(&txn).unwrap();
            }
        })
    };

    let reader = {
        let db = db.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let idx = db.column("idx").unwrap();
            let json = db.column("json").unwrap();
            while !stop.load(Ordering::Acquire) {
                let snap = db.snapshot();
                let seen: Vec<_> = (0u8..8)
                    .flat_map(|k| [idx.get_at(&snap, &[k]).ok(), json.get_at(&snap, &[k]).ok()])
                    .collect();
                assert!(seen.windows(2).all(|w| w[0] == w[1]), "torn read: {:?}", seen);
            }
        })
    };

    writer.join().unwrap();
    stop.store(true, Ordering::Release);
    reader.join().unwrap();
    assert_eq!(db.stats().commits, 500);
}

#[test]
fn oversized_txn_is_rejected_whole() {
    let db = utils::open();
    let max = db.opts().max_value_size;

    let mut txn = Txn::new();
    txn.set("idx", b"$event".to_vec(), 1u64.to_be_bytes().to_vec());
    txn.set("json", 1u64.to_be_bytes().to_vec(), vec![0u8; max + 1]);

    assert!(matches!(db.commit(&txn), Err(Error::ValueTooLarge { .. })));
    assert!(!db.column("idx").unwrap().has(b"$event"));
    assert_eq!(db.stats().commits, 0);
}

#[test]
fn range_delete_and_not_found() {
    let db = utils::open();
    let col = db.column("by_type").unwrap();

    let mut txn = Txn::new();
    for i in 0u8..5 {
        txn.set("by_type", [&b"m.room.message\0"[..], &[i]].concat(), Vec::new());
    }
    txn.set("by_type", b"m.room.member\0\x01".to_vec(), Vec::new());
    db.commit(&txn).unwrap();

    let mut txn = Txn::new();
    txn.delete_range("by_type", b"m.room.message\0\x01".to_vec(), b"m.room.message\0\x03".to_vec());
    db.commit(&txn).unwrap();

    assert_eq!(col.count(b"m.room.message\0"), 3);
    assert_eq!(col.count(b"m.room.member\0"), 1);

    let err = col.get(b"m.room.message\0\x02").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn save_and_load_round_trip() {
    let path = utils::temp_path("save");
    let db = utils::open();

    let mut txn = Txn::new();
    txn.set("idx", b"$a".to_vec(), b"1".to_vec());
    txn.set("idx", b"$b".to_vec(), b"2".to_vec());
    db.commit(&txn).unwrap();
    db.column("idx").unwrap().del(b"$b").unwrap();
    db.save(&path).unwrap();

    let loaded = construct_db::Database::load(&path, Default::default(), utils::COLUMNS).unwrap();
    let idx = loaded.column("idx").unwrap();
    assert_eq!(idx.get(b"$a").unwrap(), b"1");
    assert!(!idx.has(b"$b"));
    assert_eq!(loaded.sequence(), db.sequence());

    std::fs::remove_file(&path).unwrap();
}
