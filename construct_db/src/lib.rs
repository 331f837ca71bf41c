//! An ordered, multi-version column store.
//!
//! A [`Database`] holds a fixed set of named columns, each an ordered map of
//! byte keys to byte values. Writes are grouped into a [`Txn`] and become
//! visible all at once when committed. Readers see the latest committed
//! state, or the state captured by a [`Snapshot`].

mod error;
pub use error::*;

mod descriptor;
pub use descriptor::{Descriptor, PrefixTransform};

mod options;
pub use options::DbOpts;

mod txn;
pub use txn::{Delta, Op, Txn};

mod database;
pub use database::{Database, Stats};

mod column;
pub use column::Column;

mod cursor;
pub use cursor::Cursor;

mod snapshot;
pub use snapshot::Snapshot;

mod saved;
