//! The Matrix event graph: identifiers, the event model, the write pipeline
//! which indexes events into a [`construct_db::Database`], the persistent
//! state tree and the per-room queries built on them.

mod error;
pub use error::*;

pub mod id;
pub use id::{EventId, InvalidId, RoomId, UserId};

pub mod event;
pub use event::{Event, EventIdx, Property, Refs};

pub mod dbs;
pub use dbs::{Appendix, Dbs, DbsConfig, RefType, RefTypes, WriteOpts};

pub mod state;

pub mod room;
pub use room::Room;
