//! Cross-level recovery lock (§5, §9): a single condvar-guarded mutex
//! serialising `recover()`'s directory scan across every DirCompactor in
//! a process. A waiter records its level; release always grants the
//! lock to the lowest-level waiter, so a deep level's long recovery can
//! never starve the level-0 worker that feeds fresh ingestion traffic.
//! A fair (FIFO) mutex would allow exactly that starvation.

use std::sync::{Condvar, Mutex};

struct Inner {
    held: bool,
    waiters: Vec<u32>,
}

/// The priority-inverting recovery lock.
pub struct RecoveryLock {
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl Default for RecoveryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryLock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                held: false,
                waiters: Vec::new(),
            }),
            cv: Condvar::new(),
        }
    }

    /// Blocks until the lock is granted to `level`, then returns a guard
    /// that releases it on drop. Among concurrent waiters, the one with
    /// the lowest `level` is always granted next.
    pub fn acquire(&self, level: u32) -> RecoveryLockGuard<'_> {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.waiters.push(level);
        loop {
            let min_level = *guard.waiters.iter().min().expect("we just pushed one");
            if !guard.held && level == min_level {
                break;
            }
            guard = self.cv.wait(guard).unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        if let Some(pos) = guard.waiters.iter().position(|&l| l == level) {
            guard.waiters.remove(pos);
        }
        guard.held = true;
        RecoveryLockGuard { lock: self }
    }

    fn release(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.held = false;
        drop(guard);
        self.cv.notify_all();
    }
}

/// RAII guard for a held [`RecoveryLock`], released on drop.
pub struct RecoveryLockGuard<'a> {
    lock: &'a RecoveryLock,
}

impl Drop for RecoveryLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
