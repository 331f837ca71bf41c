use std::path::{Path, PathBuf};

use construct_matrix::{Event, RoomId};
use construct_server::{config::ServerConfig, Homeserver, InjectStats};
use pretty_assertions::assert_eq;

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("constructd-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(dir: &Path, db_path: Option<&Path>) -> ServerConfig {
    let db = match db_path {
        Some(path) => format!("db: {{ path: {:?} }},", path),
        None => String::new(),
    };

    json5::from_str(&format!(
        r#"{{
            "server-name": "test",
            {}
            ctx: {{ "pool-size": 2, concurrent: 4 }},
            log: {{ dir: {:?}, targets: [] }},
        }}"#,
        db, dir
    ))
    .unwrap()
}

fn message(n: u64) -> String {
    let prev = match n {
        1 => String::new(),
        n => format!("\"$e{}:test\"", n - 1),
    };
    format!(
        r#"{{"event_id":"$e{n}:test","room_id":"!room:test","sender":"@a:test","type":"m.room.message","depth":{n},"prev_events":[{prev}],"content":{{"body":"{n}"}}}}"#,
        n = n,
        prev = prev
    )
}

fn messages(range: std::ops::RangeInclusive<u64>) -> Vec<Event> {
    range.map(|n| Event::from_json(&message(n)).unwrap()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inject_writes_every_event_once() {
    let dir = scratch("inject");
    let server = Homeserver::open(config(&dir, None)).await.unwrap();
    assert_eq!(server.server_name(), "test");

    let stats = server.inject(messages(1..=8)).await.unwrap();
    assert_eq!(
        stats,
        InjectStats {
            committed: 8,
            existing: 0,
            rejected: 0
        }
    );

    let again = server.inject(messages(7..=9)).await.unwrap();
    assert_eq!((again.committed, again.existing), (1, 2));

    let room_id = RoomId::new("!room:test").unwrap();
    let room = server.room(&room_id);
    assert_eq!(room.depth(), Some(9));
    assert_eq!(room.sounding().count(), 0);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn import_skips_blank_and_malformed_lines() {
    let dir = scratch("import");
    let file = dir.join("events.jsonl");
    let lines = [message(1), String::new(), "{ not json".to_string(), message(2)];
    std::fs::write(&file, lines.join("\n")).unwrap();

    let server = Homeserver::open(config(&dir, None)).await.unwrap();
    let stats = server.import(&file).await.unwrap();
    assert_eq!((stats.committed, stats.rejected), (2, 1));
    assert_eq!(server.dbs().last_idx(), 2);

    assert!(server.import(dir.join("absent.jsonl")).await.is_err());
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn store_survives_restart() {
    let dir = scratch("restart");
    let db_path = dir.join("data").join("construct.db");

    let server = Homeserver::open(config(&dir, Some(&db_path))).await.unwrap();
    server.inject(messages(1..=3)).await.unwrap();
    server.shutdown().await.unwrap();
    assert!(db_path.exists());

    let server = Homeserver::open(config(&dir, Some(&db_path))).await.unwrap();
    assert_eq!(server.dbs().last_idx(), 3);

    let stats = server.inject(messages(3..=4)).await.unwrap();
    assert_eq!((stats.committed, stats.existing), (1, 1));
    assert_eq!(server.dbs().last_idx(), 4);
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inject_accounts_for_rejected_events() {
    let dir = scratch("rejected");
    let server = Homeserver::open(config(&dir, None)).await.unwrap();

    let events: Vec<Event> = (1..=40)
        .map(|n| {
            let mut event = Event::from_json(&message(n)).unwrap();
            if n % 5 == 0 {
                event.kind = String::new();
            }
            event
        })
        .collect();

    let stats = server.inject(events).await.unwrap();
    assert_eq!(
        stats,
        InjectStats {
            committed: 32,
            existing: 0,
            rejected: 8
        }
    );
    assert_eq!(stats.committed + stats.existing + stats.rejected, 40);
    assert_eq!(server.dbs().last_idx(), 32);

    server.shutdown().await.unwrap();
}
