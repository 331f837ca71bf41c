//! Cooperative execution contexts and the synchronisation primitives built
//! on them.
//!
//! A [`Context`] is a logical thread of control that only ever gives up the
//! processor at well defined suspension points: waiting on a [`Dock`], a
//! [`Future`], a contended [`SharedMutex`], a full [`Concurrent`] or an
//! explicit [`yield_now`]. Every suspension point is also an interruption
//! point; an interrupted context observes [`Error::Interrupted`] there unless
//! it holds an [`Uninterruptible`] guard.

mod error;
pub use error::*;

mod context;
pub use context::{
    current, interruption_point, sleep, sleep_until, yield_now, Context, ContextId, ContextInfo,
    ContextState, Uninterruptible,
};

mod scheduler;
pub use scheduler::{ContextOpts, Scheduler, DEFAULT_STACK_SIZE};

mod dock;
pub use dock::Dock;

mod future;
pub use future::{Future, FutureStatus, Promise, ScopedFuture};

mod scope;

mod shared_mutex;
pub use shared_mutex::{SharedGuard, SharedMutex, UniqueGuard};

mod upgrade_lock;
pub use upgrade_lock::UpgradeLock;

mod pool;
pub use pool::{Pool, PoolOpts, PoolStats};

mod concurrent;
pub use concurrent::Concurrent;
