use serde::{Deserialize, Serialize};

/// On-disk form of a database: the visible rows of each column at one
/// sequence number.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SavedDatabase {
    pub seq: u64,
    pub columns: Vec<SavedColumn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SavedColumn {
    pub name: String,
    pub rows: Vec<(Vec<u8>, Vec<u8>)>,
}
