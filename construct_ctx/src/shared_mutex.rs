use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{Dock, Result};

#[derive(Debug, Default)]
struct LockState {
    exclusive: bool,
    upgrade: bool,
    shared: usize,
    /// Waiters for exclusive access; new shared holders are held back while
    /// this is non-zero.
    pending: usize,
}

/// A reader/writer mutex for contexts with a single upgrade slot.
///
/// Acquisition suspends the calling context. Any number of shared holders
/// may coexist with one upgrade holder; exclusive access excludes everyone.
/// Once a context waits for exclusive access, new shared acquisitions queue
/// behind it so the existing readers drain.
#[derive(Debug, Default)]
pub struct SharedMutex {
    state: Mutex<LockState>,
    dock: Dock,
}

struct PendingGuard<'a> {
    mutex: &'a SharedMutex,
}

impl<'a> PendingGuard<'a> {
    fn new(mutex: &'a SharedMutex) -> Self {
        mutex.state.lock().pending += 1;
        Self { mutex }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.mutex.state.lock().pending -= 1;
        self.mutex.dock.notify_all();
    }
}

impl SharedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire_shared(&self) -> bool {
        let mut state = self.state.lock();
        if state.exclusive || state.pending > 0 {
            return false;
        }
        state.shared += 1;
        true
    }

    fn acquire_upgrade(&self) -> bool {
        let mut state = self.state.lock();
        if state.exclusive || state.upgrade {
            return false;
        }
        state.upgrade = true;
        true
    }

    fn acquire_exclusive(&self) -> bool {
        let mut state = self.state.lock();
        if state.exclusive || state.upgrade || state.shared > 0 {
            return false;
        }
        state.exclusive = true;
        true
    }

    fn acquire_upgrade_to_exclusive(&self) -> bool {
        let mut state = self.state.lock();
        debug_assert!(state.upgrade, "upgrade slot not held");
        if state.exclusive || state.shared > 0 {
            return false;
        }
        state.upgrade = false;
        state.exclusive = true;
        true
    }

    // shared

    pub async fn lock_shared(&self) -> Result<()> {
        self.dock.wait(|| self.acquire_shared()).await
    }

    pub fn try_lock_shared(&self) -> bool {
        self.acquire_shared()
    }

    pub async fn try_lock_shared_for(&self, duration: Duration) -> Result<bool> {
        self.try_lock_shared_until(Instant::now() + duration).await
    }

    pub async fn try_lock_shared_until(&self, deadline: Instant) -> Result<bool> {
        self.dock.wait_until(deadline, || self.acquire_shared()).await
    }

    pub fn unlock_shared(&self) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.shared > 0, "shared lock not held");
            state.shared -= 1;
        }
        self.dock.notify_all();
    }

    // upgrade

    pub async fn lock_upgrade(&self) -> Result<()> {
        self.dock.wait(|| self.acquire_upgrade()).await
    }

    pub fn try_lock_upgrade(&self) -> bool {
        self.acquire_upgrade()
    }

    pub async fn try_lock_upgrade_for(&self, duration: Duration) -> Result<bool> {
        self.try_lock_upgrade_until(Instant::now() + duration).await
    }

    pub async fn try_lock_upgrade_until(&self, deadline: Instant) -> Result<bool> {
        self.dock.wait_until(deadline, || self.acquire_upgrade()).await
    }

    pub fn unlock_upgrade(&self) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.upgrade, "upgrade lock not held");
            state.upgrade = false;
        }
        self.dock.notify_all();
    }

    // exclusive

    pub async fn lock(&self) -> Result<()> {
        let _pending = PendingGuard::new(self);
        self.dock.wait(|| self.acquire_exclusive()).await
    }

    pub fn try_lock(&self) -> bool {
        self.acquire_exclusive()
    }

    pub async fn try_lock_for(&self, duration: Duration) -> Result<bool> {
        self.try_lock_until(Instant::now() + duration).await
    }

    pub async fn try_lock_until(&self, deadline: Instant) -> Result<bool> {
        let _pending = PendingGuard::new(self);
        self.dock
            .wait_until(deadline, || self.acquire_exclusive())
            .await
    }

    pub fn unlock(&self) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.exclusive, "exclusive lock not held");
            state.exclusive = false;
        }
        self.dock.notify_all();
    }

    // transitions

    /// Trade the held upgrade slot for exclusive access, waiting for shared
    /// holders to drain.
    pub async fn unlock_upgrade_and_lock(&self) -> Result<()> {
        let _pending = PendingGuard::new(self);
        self.dock
            .wait(|| self.acquire_upgrade_to_exclusive())
            .await
    }

    pub fn try_unlock_upgrade_and_lock(&self) -> bool {
        self.acquire_upgrade_to_exclusive()
    }

    pub async fn try_unlock_upgrade_and_lock_for(&self, duration: Duration) -> Result<bool> {
        self.try_unlock_upgrade_and_lock_until(Instant::now() + duration)
            .await
    }

    pub async fn try_unlock_upgrade_and_lock_until(&self, deadline: Instant) -> Result<bool> {
        let _pending = PendingGuard::new(self);
        self.dock
            .wait_until(deadline, || self.acquire_upgrade_to_exclusive())
            .await
    }

    /// Give up exclusive access, keeping the upgrade slot.
    pub fn unlock_and_lock_upgrade(&self) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.exclusive, "exclusive lock not held");
            state.exclusive = false;
            state.upgrade = true;
        }
        self.dock.notify_all();
    }

    pub fn unlock_upgrade_and_lock_shared(&self) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.upgrade, "upgrade lock not held");
            state.upgrade = false;
            state.shared += 1;
        }
        self.dock.notify_all();
    }

    // guards

    pub async fn read(&self) -> Result<SharedGuard<'_>> {
        self.lock_shared().await?;
        Ok(SharedGuard { mutex: self })
    }

    pub fn try_read(&self) -> Option<SharedGuard<'_>> {
        self.try_lock_shared().then_some(SharedGuard { mutex: self })
    }

    pub async fn write(&self) -> Result<UniqueGuard<'_>> {
        self.lock().await?;
        Ok(UniqueGuard { mutex: self })
    }

    pub fn try_write(&self) -> Option<UniqueGuard<'_>> {
        self.try_lock().then_some(UniqueGuard { mutex: self })
    }

    pub fn shared_count(&self) -> usize {
        self.state.lock().shared
    }

    pub fn is_upgraded(&self) -> bool {
        self.state.lock().upgrade
    }

    pub fn is_exclusive(&self) -> bool {
        self.state.lock().exclusive
    }
}

/// Holds shared access until dropped
pub struct SharedGuard<'a> {
    mutex: &'a SharedMutex,
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock_shared();
    }
}

/// Holds exclusive access until dropped
pub struct UniqueGuard<'a> {
    mutex: &'a SharedMutex,
}

impl Drop for UniqueGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readers_coexist_with_upgrade() {
        let m = SharedMutex::new();
        let _a = m.read().await.unwrap();
        let _b = m.read().await.unwrap();
        assert!(m.try_lock_upgrade());
        assert!(!m.try_lock_upgrade());
        assert_eq!(m.shared_count(), 2);
        assert!(m.try_read().is_some());
        m.unlock_upgrade();
    }

    #[tokio::test]
    async fn exclusive_excludes_everyone() {
        let m = SharedMutex::new();
        let w = m.write().await.unwrap();
        assert!(m.try_read().is_none());
        assert!(!m.try_lock_upgrade());
        assert!(!m.try_lock_shared_for(Duration::from_millis(5)).await.unwrap());
        drop(w);
        assert!(m.try_read().is_some());
    }

    #[tokio::test]
    async fn upgrade_waits_for_readers_to_drain() {
        let m = SharedMutex::new();
        let r = m.read().await.unwrap();
        m.lock_upgrade().await.unwrap();

        assert!(!m
            .try_unlock_upgrade_and_lock_for(Duration::from_millis(5))
            .await
            .unwrap());
        assert!(m.is_upgraded());

        drop(r);
        m.unlock_upgrade_and_lock().await.unwrap();
        assert!(m.is_exclusive());

        m.unlock_and_lock_upgrade();
        assert!(m.is_upgraded());
        m.unlock_upgrade();
    }
}
