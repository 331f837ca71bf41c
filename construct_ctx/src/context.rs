use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
    task::Poll,
    time::Duration,
};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::{sync::Notify, task::AbortHandle, time::Instant};

use crate::{Dock, Error, Result};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a context. Ids are issued in increasing order and never reused
/// within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ContextState {
    /// Spawned but not yet run
    Queued = 0,
    Running = 1,
    /// Suspended at a suspension point
    Waiting = 2,
    Terminated = 3,
}

impl ContextState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ContextState::Queued,
            1 => ContextState::Running,
            2 => ContextState::Waiting,
            _ => ContextState::Terminated,
        }
    }
}

/// A snapshot of a context's bookkeeping, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ContextInfo {
    pub id: ContextId,
    pub name: String,
    pub stack_size: usize,
    pub state: ContextState,
    pub interrupted: bool,
}

struct ContextInner {
    id: ContextId,
    name: String,
    stack_size: usize,
    state: AtomicU8,
    interrupted: AtomicBool,
    uninterruptible: AtomicUsize,
    interrupt: Notify,
    terminated: Dock,
    abort: Mutex<Option<AbortHandle>>,
}

/// Handle to a cooperatively scheduled context.
///
/// Handles are cheap to clone; the context itself is owned by the
/// [`Scheduler`](crate::Scheduler) that spawned it and lives until its entry
/// future returns or it is terminated.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

tokio::task_local! {
    static CURRENT: Context;
}

impl Context {
    pub(crate) fn new(name: impl Into<String>, stack_size: usize) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: ContextId::next(),
                name: name.into(),
                stack_size,
                state: AtomicU8::new(ContextState::Queued as u8),
                interrupted: AtomicBool::new(false),
                uninterruptible: AtomicUsize::new(0),
                interrupt: Notify::new(),
                terminated: Dock::new(),
                abort: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The stack size requested when this context was spawned.
    pub fn stack_size(&self) -> usize {
        self.inner.stack_size
    }

    pub fn state(&self) -> ContextState {
        ContextState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn finished(&self) -> bool {
        self.state() == ContextState::Terminated
    }

    pub fn info(&self) -> ContextInfo {
        ContextInfo {
            id: self.id(),
            name: self.name().to_owned(),
            stack_size: self.stack_size(),
            state: self.state(),
            interrupted: self.interrupted(),
        }
    }

    /// Mark this context as interrupted.
    ///
    /// The next interruption point the context reaches outside of an
    /// [`Uninterruptible`] section returns [`Error::Interrupted`]. If it is
    /// currently suspended it is woken to observe the interruption.
    pub fn interrupt(&self) {
        if self.finished() {
            return;
        }

        tracing::trace!("Interrupting context {} '{}'", self.id(), self.name());
        self.inner.interrupted.store(true, Ordering::Release);
        self.inner.interrupt.notify_waiters();
    }

    /// Whether an interruption is pending and not yet observed.
    pub fn interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::Acquire)
    }

    /// Abort the context at its current suspension point without giving it a
    /// chance to observe an interruption. Destructors of everything it owns
    /// still run.
    pub fn terminate(&self) {
        if let Some(handle) = self.inner.abort.lock().as_ref() {
            handle.abort();
        }
    }

    /// Wait for this context to terminate.
    pub async fn join(&self) -> Result<()> {
        let me = self.clone();
        self.inner.terminated.wait(|| me.finished()).await
    }

    pub(crate) fn set_state(&self, state: ContextState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn set_abort_handle(&self, handle: AbortHandle) {
        *self.inner.abort.lock() = Some(handle);
    }

    pub(crate) fn mark_terminated(&self) {
        self.set_state(ContextState::Terminated);
        self.inner.terminated.notify_all();
    }

    pub(crate) async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    fn is_uninterruptible(&self) -> bool {
        self.inner.uninterruptible.load(Ordering::Acquire) > 0
    }

    /// Consume a pending interruption, if there is one and it may be observed
    /// here.
    fn check_interrupt(&self) -> Result<()> {
        if self.is_uninterruptible() {
            return Ok(());
        }

        if self.inner.interrupted.swap(false, Ordering::AcqRel) {
            return Err(Error::Interrupted(self.id()));
        }

        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// The context executing the caller, if any.
pub fn current() -> Option<Context> {
    CURRENT.try_with(|c| c.clone()).ok()
}

/// Observe a pending interruption of the current context.
pub fn interruption_point() -> Result<()> {
    match current() {
        Some(ctx) => ctx.check_interrupt(),
        None => Ok(()),
    }
}

/// Give other ready contexts a chance to run.
pub async fn yield_now() -> Result<()> {
    interruption_point()?;
    tokio::task::yield_now().await;
    interruption_point()
}

pub async fn sleep(duration: Duration) -> Result<()> {
    interruptible(tokio::time::sleep(duration)).await
}

pub async fn sleep_until(deadline: Instant) -> Result<()> {
    interruptible(tokio::time::sleep_until(deadline)).await
}

/// Await `fut` as a suspension point of the current context.
///
/// Outside of any context this is a plain await.
pub(crate) async fn interruptible<F: Future>(fut: F) -> Result<F::Output> {
    let ctx = match current() {
        Some(ctx) => ctx,
        None => return Ok(fut.await),
    };

    tokio::pin!(fut);
    loop {
        let notified = ctx.inner.interrupt.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        ctx.check_interrupt()?;
        if ctx.is_uninterruptible() {
            return Ok(fut.as_mut().await);
        }

        tokio::select! {
            biased;
            out = fut.as_mut() => return Ok(out),
            _ = notified.as_mut() => continue,
        }
    }
}

/// Defers interruption of the current context for as long as it is held.
///
/// An interruption arriving while the guard is alive stays pending and is
/// observed at the first interruption point after the guard is dropped.
pub struct Uninterruptible {
    ctx: Option<Context>,
}

impl Uninterruptible {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let ctx = current();
        if let Some(ctx) = &ctx {
            ctx.inner.uninterruptible.fetch_add(1, Ordering::AcqRel);
        }
        Self { ctx }
    }
}

impl Drop for Uninterruptible {
    fn drop(&mut self) {
        if let Some(ctx) = &self.ctx {
            ctx.inner.uninterruptible.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Wraps a context's entry future to keep its state current.
pub(crate) struct Tracked<F> {
    ctx: Context,
    fut: Pin<Box<F>>,
}

impl<F> Tracked<F> {
    pub(crate) fn new(ctx: Context, fut: F) -> Self {
        Self {
            ctx,
            fut: Box::pin(fut),
        }
    }
}

impl<F: Future> Future for Tracked<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<F::Output> {
        let this = &mut *self;
        this.ctx.set_state(ContextState::Running);
        let poll = this.fut.as_mut().poll(cx);
        if poll.is_pending() {
            this.ctx.set_state(ContextState::Waiting);
        }
        poll
    }
}
