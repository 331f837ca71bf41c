use std::path::PathBuf;

use construct_db::{Database, DbOpts, Descriptor, PrefixTransform};

fn has_nul(key: &[u8]) -> bool {
    key.contains(&0)
}

fn to_nul(key: &[u8]) -> &[u8] {
    PrefixTransform::split_at(key, 0)
}

pub const COLUMNS: &[Descriptor] = &[
    Descriptor::new("idx", "identifier to index"),
    Descriptor::new("json", "index to document"),
    Descriptor::new("by_type", "type and index").with_prefix(PrefixTransform {
        name: "by_type_nul",
        has: has_nul,
        get: to_nul,
    }),
];

pub fn open() -> Database {
    Database::open(DbOpts::default(), COLUMNS)
}

pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("construct-db-{}-{}.bin", name, std::process::id()))
}
