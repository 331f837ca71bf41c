use std::time::Duration;

use tokio::{sync::Notify, time::Instant};

use crate::{context::interruptible, Result};

/// Condition-variable style wait/notify point.
///
/// Waiters supply a predicate which is re-evaluated each time they are
/// notified; a notification issued between the predicate check and the
/// suspension is never lost.
#[derive(Debug, Default)]
pub struct Dock {
    notify: Notify,
}

impl Dock {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
        }
    }

    /// Suspend until `pred` holds.
    pub async fn wait(&self, mut pred: impl FnMut() -> bool) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if pred() {
                return Ok(());
            }

            interruptible(notified).await?;
        }
    }

    /// As [`wait`](Self::wait), giving up after `duration`. Returns whether
    /// the predicate was satisfied.
    pub async fn wait_for(&self, duration: Duration, pred: impl FnMut() -> bool) -> Result<bool> {
        self.wait_until(Instant::now() + duration, pred).await
    }

    pub async fn wait_until(
        &self,
        deadline: Instant,
        mut pred: impl FnMut() -> bool,
    ) -> Result<bool> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if pred() {
                return Ok(true);
            }

            if interruptible(tokio::time::timeout_at(deadline, notified))
                .await?
                .is_err()
            {
                return Ok(pred());
            }
        }
    }

    pub fn notify_one(&self) {
        self.notify.notify_one();
    }

    pub fn notify_all(&self) {
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn wait_returns_once_predicate_holds() {
        let dock = Arc::new(Dock::new());
        let flag = Arc::new(AtomicBool::new(false));

        let waiter = {
            let dock = dock.clone();
            let flag = flag.clone();
            tokio::spawn(async move { dock.wait(|| flag.load(Ordering::Acquire)).await })
        };

        tokio::task::yield_now().await;
        flag.store(true, Ordering::Release);
        dock.notify_all();

        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let dock = Dock::new();
        let satisfied = dock
            .wait_for(Duration::from_millis(10), || false)
            .await
            .unwrap();
        assert!(!satisfied);
    }
}
