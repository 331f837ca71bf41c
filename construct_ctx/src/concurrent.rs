use std::{future::Future as StdFuture, sync::Arc};

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::{scope::block_on_scope_exit, Dock, Error, Pool, Result, Uninterruptible};

type Closure<A> = dyn Fn(A) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

#[derive(Debug)]
struct State {
    busy: Vec<bool>,
    /// Dispatched
    snd: usize,
    /// Started by a worker
    rcv: usize,
    /// Finished
    fin: usize,
    eptr: Option<Error>,
}

impl State {
    fn check(&self) {
        debug_assert!(self.snd >= self.rcv);
        debug_assert!(self.rcv >= self.fin);
        debug_assert!(self.snd - self.fin <= self.busy.len());
    }

    fn drained(&self) -> bool {
        self.fin == self.snd
    }

    fn free_slot(&self) -> Option<usize> {
        self.busy.iter().position(|b| !b)
    }
}

struct Shared<A> {
    state: Mutex<State>,
    dock: Dock,
    closure: Box<Closure<A>>,
}

impl<A> Shared<A> {
    fn received(&self) {
        let mut state = self.state.lock();
        state.rcv += 1;
        state.check();
    }

    fn finished(&self, slot: usize, result: anyhow::Result<()>) {
        {
            let mut state = self.state.lock();
            state.busy[slot] = false;
            state.fin += 1;
            state.check();

            if let Err(e) = result {
                if state.eptr.is_none() {
                    state.eptr = Some(match e.downcast::<Error>() {
                        Ok(e) => e,
                        Err(e) => Error::exception(e),
                    });
                }
            }
        }
        self.dock.notify_all();
    }

    async fn drain(&self) -> Result<()> {
        self.dock.wait(|| self.state.lock().drained()).await
    }

    fn take_exception(&self) -> Result<()> {
        match self.state.lock().eptr.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// One dispatched invocation. Its slot is finished however the invocation
/// ends, including being dropped before or while it runs.
struct Dispatch<A> {
    shared: Arc<Shared<A>>,
    slot: usize,
    received: bool,
    result: Option<anyhow::Result<()>>,
}

impl<A> Dispatch<A> {
    async fn run(mut self, arg: A) {
        self.shared.received();
        self.received = true;
        self.result = Some((self.shared.closure)(arg).await);
    }
}

impl<A> Drop for Dispatch<A> {
    fn drop(&mut self) {
        if !self.received {
            self.shared.received();
        }

        let result = self
            .result
            .take()
            .unwrap_or_else(|| Err(anyhow::anyhow!("fan-out invocation abandoned")));
        self.shared.finished(self.slot, result);
    }
}

/// Bounded fan-out of a closure over a worker [`Pool`].
///
/// At most `capacity` invocations are in flight at once. A failed invocation
/// is reported by the next [`call`](Self::call) or [`wait`](Self::wait),
/// after all in-flight work has drained.
///
/// Dropping the fan-out on a multi-thread runtime waits for the in-flight
/// work and discards any unreported failure. A current-thread runtime cannot
/// run that work while the dropping task blocks, so there the fan-out must
/// be drained with [`wait`](Self::wait) or [`join`](Self::join) before it
/// goes out of scope; dropping it with work in flight is a bug, asserted in
/// debug builds.
pub struct Concurrent<'a, A> {
    pool: &'a Pool,
    shared: Arc<Shared<A>>,
}

impl<'a, A: Send + 'static> Concurrent<'a, A> {
    /// Bind `closure` to `pool` with `capacity` slots. A pool with workers
    /// is grown to at least `capacity`; an empty pool runs every invocation
    /// inline in the caller.
    pub fn new<F, Fut>(pool: &'a Pool, capacity: usize, closure: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: StdFuture<Output = anyhow::Result<()>> + Send + 'static,
    {
        debug_assert!(capacity > 0, "fan-out needs at least one slot");
        if pool.size() > 0 {
            pool.min(capacity);
        }

        Self {
            pool,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    busy: vec![false; capacity.max(1)],
                    snd: 0,
                    rcv: 0,
                    fin: 0,
                    eptr: None,
                }),
                dock: Dock::new(),
                closure: Box::new(move |a| Box::pin(closure(a))),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.state.lock().busy.len()
    }

    /// Invocations dispatched and not yet finished
    pub fn in_flight(&self) -> usize {
        let state = self.shared.state.lock();
        state.snd - state.fin
    }

    pub fn dispatched(&self) -> usize {
        self.shared.state.lock().snd
    }

    pub fn finished(&self) -> usize {
        self.shared.state.lock().fin
    }

    /// Dispatch `arg` once a slot is free. Returns when the pool has
    /// accepted the work, not when it completes.
    pub async fn call(&mut self, arg: A) -> Result<()> {
        if self.shared.state.lock().eptr.is_some() {
            self.shared.drain().await?;
            self.shared.take_exception()?;
        }

        let shared = &self.shared;
        let mut slot = None;
        shared
            .dock
            .wait(|| {
                let mut state = shared.state.lock();
                if state.snd - state.fin >= state.busy.len() {
                    return false;
                }
                slot = state.free_slot();
                if let Some(i) = slot {
                    state.busy[i] = true;
                    state.snd += 1;
                    state.check();
                }
                slot.is_some()
            })
            .await?;

        let slot = match slot {
            Some(slot) => slot,
            None => return Err(Error::NoState),
        };

        let dispatch = Dispatch {
            shared: Arc::clone(shared),
            slot,
            received: false,
            result: None,
        };

        if self.pool.size() == 0 {
            dispatch.run(arg).await;
            return Ok(());
        }

        // a rejected job is dropped unstarted, which finishes its slot
        self.pool
            .call(async move {
                dispatch.run(arg).await;
                Ok(())
            })
            .await
    }

    /// Wait for all dispatched work, then report the first failure, if any.
    pub async fn wait(&mut self) -> Result<()> {
        self.shared.drain().await?;
        self.shared.take_exception()
    }

    /// Wait for all dispatched work without observing interruption,
    /// discarding any failure.
    pub async fn join(self) {
        let _ui = Uninterruptible::new();
        let _ = self.shared.drain().await;
    }
}

impl<A> Drop for Concurrent<'_, A> {
    fn drop(&mut self) {
        if !self.shared.state.lock().drained() {
            let shared = Arc::clone(&self.shared);
            let joined = block_on_scope_exit(async move {
                let _ = shared.drain().await;
            });

            debug_assert!(
                joined.is_some() || std::thread::panicking(),
                "fan-out dropped with work in flight on a current-thread runtime; it must be joined first"
            );
        }

        if let Some(e) = self.shared.state.lock().eptr.take() {
            tracing::debug!("Discarding fan-out failure: {}", e);
        }
    }
}
