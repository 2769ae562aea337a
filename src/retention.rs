//! Retention policy: decides which level-`L` input files may be deleted
//! once a merge that supersedes them has been indexed.
//!
//! Consulted only after a rotation's committed file is already visible in
//! the index (§4.4 step 9); deletion itself is best-effort and logged,
//! never treated as fatal — a reader racing a retention scan is expected
//! to retry its lookup on `ENOENT`.

use std::sync::Arc;

/// Pure decision function: given the commit number just assigned and the
/// level the *output* segment landed at, may the inputs that produced it
/// be deleted?
pub trait Retention: Send + Sync {
    fn remove(&self, commit: u64, level: u32) -> bool;
}

/// Keeps full history; inputs are never deleted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverRemove;

impl Retention for NeverRemove {
    fn remove(&self, _commit: u64, _level: u32) -> bool {
        false
    }
}

/// Aggressive compaction: every superseded input is deleted.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysRemove;

impl Retention for AlwaysRemove {
    fn remove(&self, _commit: u64, _level: u32) -> bool {
        true
    }
}

/// Removes inputs that produced an output at or below `max_level`.
#[derive(Debug, Clone, Copy)]
pub struct LevelThreshold {
    pub max_level: u32,
}

impl LevelThreshold {
    #[must_use]
    pub const fn new(max_level: u32) -> Self {
        Self { max_level }
    }
}

impl Retention for LevelThreshold {
    fn remove(&self, _commit: u64, level: u32) -> bool {
        level <= self.max_level
    }
}

/// Retains the `keep` most recent commits overall; anything older may be
/// removed regardless of level.
pub struct HeadWindow {
    current: Box<dyn Fn() -> u64 + Send + Sync>,
    keep: u64,
}

impl HeadWindow {
    pub fn new(current: impl Fn() -> u64 + Send + Sync + 'static, keep: u64) -> Self {
        Self {
            current: Box::new(current),
            keep,
        }
    }
}

impl Retention for HeadWindow {
    fn remove(&self, _commit: u64, _level: u32) -> bool {
        (self.current)() > self.keep
    }
}

/// Conjunction of [`HeadWindow`] and [`LevelThreshold`].
pub struct HeadWindowLevel {
    current: Box<dyn Fn() -> u64 + Send + Sync>,
    keep: u64,
    max_level: u32,
}

impl HeadWindowLevel {
    pub fn new(
        current: impl Fn() -> u64 + Send + Sync + 'static,
        keep: u64,
        max_level: u32,
    ) -> Self {
        Self {
            current: Box::new(current),
            keep,
            max_level,
        }
    }
}

impl Retention for HeadWindowLevel {
    fn remove(&self, _commit: u64, level: u32) -> bool {
        (self.current)() > self.keep && level <= self.max_level
    }
}

/// Convenience: wrap any [`Retention`] impl in an `Arc<dyn Retention>` for
/// `Config`.
#[must_use]
pub fn arc(retention: impl Retention + 'static) -> Arc<dyn Retention> {
    Arc::new(retention)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn never_remove_is_always_false() {
        let r = NeverRemove;
        assert!(!r.remove(100, 0));
        assert!(!r.remove(100, 5));
    }

    #[test]
    fn always_remove_is_always_true() {
        let r = AlwaysRemove;
        assert!(r.remove(1, 0));
    }

    #[test]
    fn level_threshold_gates_on_level_only() {
        let r = LevelThreshold::new(1);
        assert!(r.remove(10, 0));
        assert!(r.remove(10, 1));
        assert!(!r.remove(10, 2));
    }

    #[test]
    fn head_window_returns_true_exactly_when_cur_exceeds_keep() {
        let cur = Arc::new(AtomicU64::new(0));
        let cur2 = Arc::clone(&cur);
        let r = HeadWindow::new(move || cur2.load(Ordering::SeqCst), 2);

        cur.store(2, Ordering::SeqCst);
        assert!(!r.remove(0, 0));
        cur.store(3, Ordering::SeqCst);
        assert!(r.remove(0, 0));
    }

    #[test]
    fn head_window_level_is_conjunction() {
        let r = HeadWindowLevel::new(|| 10, 2, 1);
        assert!(r.remove(0, 1));
        assert!(!r.remove(0, 2));
    }
}
