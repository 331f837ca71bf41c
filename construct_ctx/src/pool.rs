use std::{
    collections::VecDeque,
    future::Future as StdFuture,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    scheduler::panic_message, Context, ContextOpts, Dock, Error, Future, Promise, Result,
    Scheduler, DEFAULT_STACK_SIZE,
};

type Job = Pin<Box<dyn StdFuture<Output = anyhow::Result<()>> + Send>>;

#[derive(Debug, Clone)]
pub struct PoolOpts {
    pub name: String,
    /// Number of workers spawned up front
    pub size: usize,
    pub stack_size: usize,
    /// Bound on queued jobs; [`Pool::call`] suspends while the queue is full
    pub queue_max: Option<usize>,
}

impl Default for PoolOpts {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            size: 0,
            stack_size: DEFAULT_STACK_SIZE,
            queue_max: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub size: usize,
    pub queued: usize,
    pub active: usize,
    pub jobs_done: u64,
    pub jobs_failed: u64,
}

struct PoolInner {
    name: String,
    stack_size: usize,
    queue_max: Option<usize>,
    scheduler: Scheduler,
    queue: Mutex<VecDeque<Job>>,
    workers: Mutex<Vec<Context>>,
    dock: Dock,
    size: AtomicUsize,
    active: AtomicUsize,
    retire: AtomicUsize,
    closed: AtomicBool,
    next_worker: AtomicUsize,
    jobs_done: AtomicU64,
    jobs_failed: AtomicU64,
}

enum Next {
    Job(Job),
    Retire,
    Exit,
}

impl PoolInner {
    /// Claim the next thing a worker should do, if anything is available.
    fn next(&self) -> Option<Next> {
        let retire = self.retire.load(Ordering::Acquire);
        if retire > 0
            && self
                .retire
                .compare_exchange(retire, retire - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            return Some(Next::Retire);
        }

        if let Some(job) = self.queue.lock().pop_front() {
            return Some(Next::Job(job));
        }

        if self.closed.load(Ordering::Acquire) {
            return Some(Next::Exit);
        }

        None
    }

    async fn work(self: Arc<Self>) -> anyhow::Result<()> {
        loop {
            let mut next = None;
            let waited = self
                .dock
                .wait(|| {
                    next = self.next();
                    next.is_some()
                })
                .await;

            if let Err(e) = waited {
                self.size.fetch_sub(1, Ordering::AcqRel);
                return Err(e.into());
            }

            let job = match next {
                Some(Next::Job(job)) => job,
                Some(Next::Exit) => {
                    self.size.fetch_sub(1, Ordering::AcqRel);
                    return Ok(());
                }
                Some(Next::Retire) | None => return Ok(()),
            };

            // a queue slot has opened up
            self.active.fetch_add(1, Ordering::AcqRel);
            self.dock.notify_all();

            match AssertUnwindSafe(job).catch_unwind().await {
                Ok(Ok(())) => {
                    self.jobs_done.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    self.jobs_failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("Pool '{}' job failed: {:#}", self.name, e);
                }
                Err(panic) => {
                    self.jobs_failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        "Pool '{}' job panicked: {}",
                        self.name,
                        panic_message(&panic)
                    );
                }
            }

            self.active.fetch_sub(1, Ordering::AcqRel);
            self.dock.notify_all();
        }
    }
}

/// A named set of worker contexts executing queued jobs.
///
/// Jobs run in submission order as workers become free. Dropping the pool
/// lets the workers finish whatever is queued and then exit; [`join`]
/// additionally waits for them.
///
/// [`join`]: Pool::join
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    pub fn new(scheduler: &Scheduler, opts: PoolOpts) -> Self {
        let ret = Self {
            inner: Arc::new(PoolInner {
                name: opts.name,
                stack_size: opts.stack_size,
                queue_max: opts.queue_max,
                scheduler: scheduler.clone(),
                queue: Mutex::new(VecDeque::new()),
                workers: Mutex::new(Vec::new()),
                dock: Dock::new(),
                size: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                retire: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                next_worker: AtomicUsize::new(0),
                jobs_done: AtomicU64::new(0),
                jobs_failed: AtomicU64::new(0),
            }),
        };
        ret.add(opts.size);
        ret
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.inner.size.load(Ordering::Acquire)
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Jobs currently executing
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Workers not executing a job
    pub fn avail(&self) -> usize {
        self.size().saturating_sub(self.active())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.inner.name.clone(),
            size: self.size(),
            queued: self.queued(),
            active: self.active(),
            jobs_done: self.inner.jobs_done.load(Ordering::Relaxed),
            jobs_failed: self.inner.jobs_failed.load(Ordering::Relaxed),
        }
    }

    /// Spawn `n` more workers.
    pub fn add(&self, n: usize) {
        let mut workers = self.inner.workers.lock();
        workers.retain(|w| !w.finished());

        for _ in 0..n {
            let num = self.inner.next_worker.fetch_add(1, Ordering::Relaxed);
            let opts = ContextOpts {
                name: format!("{} {}", self.inner.name, num),
                stack_size: self.inner.stack_size,
            };
            self.inner.size.fetch_add(1, Ordering::AcqRel);
            workers.push(
                self.inner
                    .scheduler
                    .spawn_with(opts, Arc::clone(&self.inner).work()),
            );
        }

        if n > 0 {
            tracing::debug!("Pool '{}' grew to {} workers", self.inner.name, self.size());
        }
    }

    /// Retire `n` workers once they are between jobs.
    pub fn del(&self, n: usize) {
        let mut retired = 0;
        let _ = self
            .inner
            .size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |size| {
                retired = n.min(size);
                Some(size - retired)
            });

        self.inner.retire.fetch_add(retired, Ordering::AcqRel);
        self.inner.dock.notify_all();

        if retired > 0 {
            tracing::debug!("Pool '{}' shrank to {} workers", self.inner.name, self.size());
        }
    }

    /// Ensure at least `n` workers.
    pub fn min(&self, n: usize) {
        let size = self.size();
        if size < n {
            self.add(n - size);
        }
    }

    /// Queue `job` for execution, suspending while the queue is full.
    ///
    /// Failures of the job are logged; use [`run`](Self::run) to observe
    /// them.
    pub async fn call<F>(&self, job: F) -> Result<()>
    where
        F: StdFuture<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::exception(anyhow::anyhow!(
                "pool '{}' is shut down",
                self.inner.name
            )));
        }

        // check and push under one guard so racing callers can't overfill
        let max = self.inner.queue_max.unwrap_or(usize::MAX);
        let inner = &self.inner;
        let mut job = Some(Box::pin(job) as Job);
        inner
            .dock
            .wait(|| {
                let mut queue = inner.queue.lock();
                if queue.len() >= max {
                    return false;
                }
                queue.extend(job.take());
                true
            })
            .await?;

        inner.dock.notify_all();
        Ok(())
    }

    /// Queue `job`, returning a future for its result.
    pub async fn run<T, F>(&self, job: F) -> Result<Future<T>>
    where
        T: Send + 'static,
        F: StdFuture<Output = anyhow::Result<T>> + Send + 'static,
    {
        let promise = Promise::new();
        let future = promise.future();
        self.call(async move {
            match job.await {
                Ok(v) => promise.set_value(v),
                Err(e) => promise.set_exception(e),
            }
            Ok(())
        })
        .await?;
        Ok(future)
    }

    /// Stop accepting work, let the queue drain and wait for every worker
    /// to exit.
    pub async fn join(&self) -> Result<()> {
        tracing::debug!("Joining pool '{}'", self.inner.name);
        self.inner.closed.store(true, Ordering::Release);
        self.inner.dock.notify_all();

        let workers: Vec<_> = self.inner.workers.lock().drain(..).collect();
        for worker in workers {
            worker.join().await?;
        }
        Ok(())
    }

    /// Interrupt every worker.
    pub fn interrupt(&self) {
        for worker in self.inner.workers.lock().iter() {
            worker.interrupt();
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.dock.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_result() {
        let sched = Scheduler::current();
        let pool = Pool::new(
            &sched,
            PoolOpts {
                name: "test".into(),
                size: 2,
                ..Default::default()
            },
        );

        let f = pool.run(async { Ok(6 * 7) }).await.unwrap();
        assert_eq!(f.get().await.unwrap(), 42);

        let f = pool
            .run(async { Err::<u32, _>(anyhow::anyhow!("nope")) })
            .await
            .unwrap();
        assert!(matches!(f.get().await, Err(Error::Exception(_))));

        pool.join().await.unwrap();
        assert_eq!(pool.size(), 0);
        assert_eq!(sched.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_callers_respect_queue_max() {
        let sched = Scheduler::current();
        let pool = Arc::new(Pool::new(
            &sched,
            PoolOpts {
                size: 0,
                queue_max: Some(2),
                ..Default::default()
            },
        ));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.call(async { Ok(()) }).await })
            })
            .collect();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(pool.queued(), 2);

        pool.add(2);
        for caller in callers {
            caller.await.unwrap().unwrap();
        }
        pool.join().await.unwrap();
        assert_eq!(pool.stats().jobs_done, 8);
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn resize() {
        let sched = Scheduler::current();
        let pool = Pool::new(&sched, PoolOpts::default());
        assert_eq!(pool.size(), 0);

        pool.min(3);
        assert_eq!(pool.size(), 3);
        pool.min(2);
        assert_eq!(pool.size(), 3);
        pool.del(5);
        assert_eq!(pool.size(), 0);

        pool.join().await.unwrap();
        assert_eq!(sched.count(), 0);
    }

    #[tokio::test]
    async fn panicking_job_breaks_promise() {
        let sched = Scheduler::current();
        let pool = Pool::new(
            &sched,
            PoolOpts {
                size: 1,
                ..Default::default()
            },
        );

        let f = pool
            .run(async {
                if true {
                    panic!("job panic");
                }
                Ok(1u8)
            })
            .await
            .unwrap();
        assert!(matches!(f.get().await, Err(Error::BrokenPromise)));
        pool.join().await.unwrap();
        assert_eq!(pool.stats().jobs_failed, 1);
    }
}
