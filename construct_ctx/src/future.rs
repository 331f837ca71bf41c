use std::{ops::Deref, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{scope::block_on_scope_exit, Dock, Error, Result};

/// Outcome of a timed wait on a [`Future`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    Ready,
    Timeout,
    /// The future has no shared state and will never become ready
    Deferred,
}

struct Shared<T> {
    outcome: Mutex<Option<Result<T>>>,
    dock: Dock,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            dock: Dock::new(),
        }
    }

    fn is_ready(&self) -> bool {
        self.outcome.lock().is_some()
    }

    fn set(&self, outcome: Result<T>) {
        let mut slot = self.outcome.lock();
        debug_assert!(slot.is_none(), "promise satisfied twice");
        if slot.is_none() {
            *slot = Some(outcome);
        }
        drop(slot);
        self.dock.notify_all();
    }
}

/// The producing side of a one-shot value.
///
/// Setting the promise consumes it, so it can be satisfied at most once.
/// Dropping an unsatisfied promise resolves its futures with
/// [`Error::BrokenPromise`].
pub struct Promise<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            shared: Some(Arc::new(Shared::new())),
        }
    }

    /// A future observing this promise. Any number may be taken.
    pub fn future(&self) -> Future<T> {
        Future {
            shared: self.shared.clone(),
        }
    }

    pub fn set_value(self, value: T) {
        self.set_result(Ok(value))
    }

    pub fn set_exception(self, e: impl Into<anyhow::Error>) {
        self.set_result(Err(Error::exception(e)))
    }

    pub fn set_result(mut self, outcome: Result<T>) {
        if let Some(shared) = self.shared.take() {
            shared.set(outcome);
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            if !shared.is_ready() {
                shared.set(Err(Error::BrokenPromise));
            }
        }
    }
}

/// The consuming side of a one-shot value.
///
/// Clones observe the same outcome, and reading a resolved future any number
/// of times yields the same value or error.
pub struct Future<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Default for Future<T> {
    fn default() -> Self {
        Self { shared: None }
    }
}

impl<T> Future<T> {
    /// A future which is already resolved with `value`.
    pub fn ready(value: T) -> Self {
        let shared = Shared::new();
        *shared.outcome.lock() = Some(Ok(value));
        Self {
            shared: Some(Arc::new(shared)),
        }
    }

    /// Whether this future is bound to a promise.
    pub fn valid(&self) -> bool {
        self.shared.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.as_ref().map(|s| s.is_ready()).unwrap_or(false)
    }

    /// Suspend until the future resolves, without reading the outcome.
    pub async fn wait(&self) -> Result<()> {
        let shared = self.shared.as_ref().ok_or(Error::NoState)?;
        shared.dock.wait(|| shared.is_ready()).await
    }

    pub async fn wait_for(&self, duration: Duration) -> Result<FutureStatus> {
        self.wait_until(Instant::now() + duration).await
    }

    /// Wait until `deadline` at most. Timing out leaves the promise
    /// untouched; it may still resolve later.
    pub async fn wait_until(&self, deadline: Instant) -> Result<FutureStatus> {
        let shared = match &self.shared {
            Some(shared) => shared,
            None => return Ok(FutureStatus::Deferred),
        };

        if shared.dock.wait_until(deadline, || shared.is_ready()).await? {
            Ok(FutureStatus::Ready)
        } else {
            Ok(FutureStatus::Timeout)
        }
    }
}

impl<T: Clone> Future<T> {
    /// Suspend until resolved, then return the value or the captured error.
    pub async fn get(&self) -> Result<T> {
        self.wait().await?;
        self.try_get().ok_or(Error::NoState)?
    }

    /// The outcome, if already resolved.
    pub fn try_get(&self) -> Option<Result<T>> {
        self.shared.as_ref()?.outcome.lock().clone()
    }
}

/// A [`Future`] which joins on scope exit.
///
/// Dropping an unresolved `ScopedFuture` blocks until it resolves, unless
/// the thread is already unwinding from a panic.
pub struct ScopedFuture<T> {
    future: Future<T>,
}

impl<T> ScopedFuture<T> {
    pub fn new(future: Future<T>) -> Self {
        Self { future }
    }
}

impl<T> From<Future<T>> for ScopedFuture<T> {
    fn from(future: Future<T>) -> Self {
        Self::new(future)
    }
}

impl<T> Deref for ScopedFuture<T> {
    type Target = Future<T>;

    fn deref(&self) -> &Future<T> {
        &self.future
    }
}

impl<T> Drop for ScopedFuture<T> {
    fn drop(&mut self) {
        if std::thread::panicking() || !self.future.valid() || self.future.is_ready() {
            return;
        }

        let _ = block_on_scope_exit(self.future.wait());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_future() {
        let f = Future::ready(7);
        assert!(f.valid());
        assert!(f.is_ready());
        assert_eq!(f.get().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn default_future_is_deferred() {
        let f = Future::<u32>::default();
        assert!(!f.valid());
        assert_eq!(
            f.wait_for(Duration::from_millis(1)).await.unwrap(),
            FutureStatus::Deferred
        );
        assert!(matches!(f.get().await, Err(Error::NoState)));
    }

    #[tokio::test]
    async fn exception_is_captured() {
        let p = Promise::<u32>::new();
        let f = p.future();
        p.set_exception(anyhow::anyhow!("no luck"));

        let err = f.get().await.unwrap_err();
        assert!(matches!(err, Error::Exception(_)));
        assert_eq!(err.to_string(), "no luck");
    }
}
