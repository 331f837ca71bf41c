use std::time::Duration;

use tokio::time::Instant;

use crate::{Result, SharedMutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unlocked,
    Upgrade,
    Exclusive,
}

/// Two-phase access to a [`SharedMutex`].
///
/// [`lock`](Self::lock) takes the single upgrade slot, which readers ignore.
/// [`lock_exclusive`](Self::lock_exclusive) then holds back new readers and
/// waits for the existing ones to drain. Whatever is held is released on
/// drop.
pub struct UpgradeLock<'a> {
    mutex: &'a SharedMutex,
    phase: Phase,
}

impl<'a> UpgradeLock<'a> {
    /// An unlocked handle; nothing is acquired until [`lock`](Self::lock).
    pub fn deferred(mutex: &'a SharedMutex) -> Self {
        Self {
            mutex,
            phase: Phase::Unlocked,
        }
    }

    /// Acquire the upgrade phase, suspending while another holder has it.
    pub async fn new(mutex: &'a SharedMutex) -> Result<UpgradeLock<'a>> {
        let mut ret = Self::deferred(mutex);
        ret.lock().await?;
        Ok(ret)
    }

    pub async fn lock(&mut self) -> Result<()> {
        debug_assert_eq!(self.phase, Phase::Unlocked);
        self.mutex.lock_upgrade().await?;
        self.phase = Phase::Upgrade;
        Ok(())
    }

    pub fn try_lock(&mut self) -> bool {
        debug_assert_eq!(self.phase, Phase::Unlocked);
        if self.mutex.try_lock_upgrade() {
            self.phase = Phase::Upgrade;
        }
        self.owns_lock()
    }

    pub async fn try_lock_for(&mut self, duration: Duration) -> Result<bool> {
        self.try_lock_until(Instant::now() + duration).await
    }

    pub async fn try_lock_until(&mut self, deadline: Instant) -> Result<bool> {
        debug_assert_eq!(self.phase, Phase::Unlocked);
        if self.mutex.try_lock_upgrade_until(deadline).await? {
            self.phase = Phase::Upgrade;
        }
        Ok(self.owns_lock())
    }

    /// Move from the upgrade phase to exclusive access.
    pub async fn lock_exclusive(&mut self) -> Result<()> {
        debug_assert_eq!(self.phase, Phase::Upgrade);
        self.mutex.unlock_upgrade_and_lock().await?;
        self.phase = Phase::Exclusive;
        Ok(())
    }

    pub fn try_lock_exclusive(&mut self) -> bool {
        debug_assert_eq!(self.phase, Phase::Upgrade);
        if self.mutex.try_unlock_upgrade_and_lock() {
            self.phase = Phase::Exclusive;
        }
        self.is_exclusive()
    }

    pub async fn try_lock_exclusive_for(&mut self, duration: Duration) -> Result<bool> {
        self.try_lock_exclusive_until(Instant::now() + duration)
            .await
    }

    pub async fn try_lock_exclusive_until(&mut self, deadline: Instant) -> Result<bool> {
        debug_assert_eq!(self.phase, Phase::Upgrade);
        if self
            .mutex
            .try_unlock_upgrade_and_lock_until(deadline)
            .await?
        {
            self.phase = Phase::Exclusive;
        }
        Ok(self.is_exclusive())
    }

    /// Return from exclusive access to the upgrade phase.
    pub fn unlock_exclusive(&mut self) {
        debug_assert_eq!(self.phase, Phase::Exclusive);
        self.mutex.unlock_and_lock_upgrade();
        self.phase = Phase::Upgrade;
    }

    pub fn unlock(&mut self) {
        match self.phase {
            Phase::Unlocked => (),
            Phase::Upgrade => self.mutex.unlock_upgrade(),
            Phase::Exclusive => self.mutex.unlock(),
        }
        self.phase = Phase::Unlocked;
    }

    /// Whether the upgrade phase or exclusive access is held
    pub fn owns_lock(&self) -> bool {
        self.phase != Phase::Unlocked
    }

    pub fn is_exclusive(&self) -> bool {
        self.phase == Phase::Exclusive
    }

    pub fn mutex(&self) -> &'a SharedMutex {
        self.mutex
    }
}

impl Drop for UpgradeLock<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}
