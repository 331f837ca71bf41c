use std::{
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    sync::Arc,
};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::{context::Tracked, Context, ContextId, ContextInfo, Dock, Error, Result};

/// Stack size recorded for contexts spawned without an explicit request.
pub const DEFAULT_STACK_SIZE: usize = 512 * 1024;

/// Options for [`Scheduler::spawn_with`]
#[derive(Debug, Clone)]
pub struct ContextOpts {
    pub name: String,
    pub stack_size: usize,
}

impl Default for ContextOpts {
    fn default() -> Self {
        Self {
            name: "ctx".to_string(),
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl ContextOpts {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

struct SchedulerInner {
    runtime: Handle,
    contexts: Mutex<HashMap<ContextId, Context>>,
    idle: Dock,
}

/// Owns the set of live contexts.
///
/// Contexts are multiplexed onto the runtime's worker threads; within a
/// context, code runs uninterrupted between suspension points.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

/// Deregisters a context however its task ends, including abort.
struct Finish {
    scheduler: Arc<SchedulerInner>,
    ctx: Context,
}

impl Drop for Finish {
    fn drop(&mut self) {
        self.ctx.mark_terminated();
        self.scheduler.contexts.lock().remove(&self.ctx.id());
        self.scheduler.idle.notify_all();
    }
}

impl Scheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                runtime,
                contexts: Mutex::new(HashMap::new()),
                idle: Dock::new(),
            }),
        }
    }

    /// Create a scheduler on the runtime the caller is running in.
    ///
    /// Panics if called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn spawn<F>(&self, name: impl Into<String>, entry: F) -> Context
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.spawn_with(ContextOpts::named(name), entry)
    }

    /// Spawn a new context running `entry`. The context is queued ready to
    /// run and starts at the runtime's convenience.
    pub fn spawn_with<F>(&self, opts: ContextOpts, entry: F) -> Context
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let ctx = Context::new(opts.name, opts.stack_size);
        self.inner.contexts.lock().insert(ctx.id(), ctx.clone());

        let finish = Finish {
            scheduler: Arc::clone(&self.inner),
            ctx: ctx.clone(),
        };

        let body = {
            let ctx = ctx.clone();
            async move {
                let _finish = finish;
                match AssertUnwindSafe(entry).catch_unwind().await {
                    Ok(Ok(())) => {
                        tracing::trace!("Context {} '{}' finished", ctx.id(), ctx.name());
                    }
                    Ok(Err(e)) if is_interrupted(&e) => {
                        tracing::debug!("Context {} '{}' interrupted", ctx.id(), ctx.name());
                    }
                    Ok(Err(e)) => {
                        tracing::error!("Context {} '{}' failed: {:#}", ctx.id(), ctx.name(), e);
                    }
                    Err(panic) => {
                        tracing::error!(
                            "Context {} '{}' panicked: {}",
                            ctx.id(),
                            ctx.name(),
                            panic_message(&panic)
                        );
                    }
                }
            }
        };

        let tracked = Tracked::new(ctx.clone(), ctx.clone().scope(body));
        let handle = self.inner.runtime.spawn(tracked);
        ctx.set_abort_handle(handle.abort_handle());

        tracing::trace!("Spawned context {} '{}'", ctx.id(), ctx.name());
        ctx
    }

    pub fn get(&self, id: ContextId) -> Option<Context> {
        self.inner.contexts.lock().get(&id).cloned()
    }

    /// Interrupt a context by id. Returns false if no such context is live.
    pub fn interrupt(&self, id: ContextId) -> bool {
        match self.get(id) {
            Some(ctx) => {
                ctx.interrupt();
                true
            }
            None => false,
        }
    }

    pub fn interrupt_all(&self) {
        let contexts: Vec<_> = self.inner.contexts.lock().values().cloned().collect();
        tracing::debug!("Interrupting {} contexts", contexts.len());
        for ctx in contexts {
            ctx.interrupt();
        }
    }

    /// Wait until every context spawned by this scheduler has terminated.
    ///
    /// Calling this from one of the scheduler's own contexts never returns
    /// until that context is interrupted.
    pub async fn join_all(&self) -> Result<()> {
        let inner = &self.inner;
        inner.idle.wait(|| inner.contexts.lock().is_empty()).await
    }

    pub fn contexts(&self) -> Vec<ContextInfo> {
        let mut ret: Vec<_> = self
            .inner
            .contexts
            .lock()
            .values()
            .map(Context::info)
            .collect();
        ret.sort_by_key(|info| info.id);
        ret
    }

    pub fn count(&self) -> usize {
        self.inner.contexts.lock().len()
    }

    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }
}

fn is_interrupted(e: &anyhow::Error) -> bool {
    e.downcast_ref::<Error>()
        .map(Error::is_interrupted)
        .unwrap_or(false)
}

pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
