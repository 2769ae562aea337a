//! In-memory ordered index of committed segments (§4.3).
//!
//! Keyed by `(VP, level)`, since disjointness and ordering are only
//! guaranteed within one level. Pending segments never appear here.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{CompactionError, StructuralError};
use crate::path::Vp;
use crate::segment::LogSegment;

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
struct Key {
    vp: Vp,
    level: u32,
}

/// Ordered index: `(VP, level) -> sorted committed segments`, behind a
/// single `RwLock` held by callers across `add`/`lookup_range`.
#[derive(Default)]
pub struct SegmentIndex {
    inner: RwLock<HashMap<Key, Vec<LogSegment>>>,
}

impl SegmentIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a committed segment, maintaining ascending
    /// `start_commit` order and disjointness of commit ranges.
    ///
    /// # Errors
    /// Returns a structural error if `seg` is pending, or if its commit
    /// range overlaps an existing segment at the same `(vp, level)`.
    pub fn add(&self, seg: LogSegment, level: u32) -> Result<(), CompactionError> {
        if seg.is_pending() {
            return Err(CompactionError::internal(
                "cannot index a pending segment".to_string(),
            ));
        }
        let key = Key {
            vp: seg.vp.clone(),
            level,
        };
        let mut guard = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let list = guard.entry(key).or_default();

        let pos = list.partition_point(|existing| existing.start_commit < seg.start_commit);
        if let Some(prev) = pos.checked_sub(1).and_then(|i| list.get(i)) {
            if prev.end_commit >= seg.start_commit {
                return Err(StructuralError::AssertionViolated {
                    vp: seg.vp.clone(),
                    level,
                    reason: format!(
                        "commit range [{}, {}] overlaps existing [{}, {}]",
                        seg.start_commit, seg.end_commit, prev.start_commit, prev.end_commit
                    ),
                }
                .into());
            }
        }
        if let Some(next) = list.get(pos) {
            if seg.end_commit >= next.start_commit {
                return Err(StructuralError::AssertionViolated {
                    vp: seg.vp.clone(),
                    level,
                    reason: format!(
                        "commit range [{}, {}] overlaps existing [{}, {}]",
                        seg.start_commit, seg.end_commit, next.start_commit, next.end_commit
                    ),
                }
                .into());
            }
        }
        list.insert(pos, seg);
        Ok(())
    }

    /// Returns every segment at `(vp, level)` whose commit range
    /// intersects `[min_commit, max_commit]`, in ascending order.
    #[must_use]
    pub fn lookup_range(&self, vp: &Vp, level: u32, min_commit: u64, max_commit: u64) -> Vec<LogSegment> {
        let key = Key {
            vp: vp.clone(),
            level,
        };
        let guard = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .get(&key)
            .map(|list| {
                list.iter()
                    .filter(|seg| seg.start_commit <= max_commit && seg.end_commit >= min_commit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All committed segments for `(vp, level)`, in ascending order.
    #[must_use]
    pub fn all(&self, vp: &Vp, level: u32) -> Vec<LogSegment> {
        let key = Key {
            vp: vp.clone(),
            level,
        };
        let guard = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get(&key).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(vp: &Vp, start_commit: u64, end_commit: u64) -> LogSegment {
        LogSegment {
            vp: vp.clone(),
            start_tx: start_commit,
            end_tx: end_commit,
            start_commit,
            end_commit,
        }
    }

    #[test]
    fn add_maintains_ascending_order() {
        let index = SegmentIndex::new();
        let vp = Vp::new("/a");
        index.add(seg(&vp, 5, 6), 0).unwrap();
        index.add(seg(&vp, 1, 2), 0).unwrap();
        index.add(seg(&vp, 3, 4), 0).unwrap();

        let all = index.all(&vp, 0);
        let starts: Vec<u64> = all.iter().map(|s| s.start_commit).collect();
        assert_eq!(starts, vec![1, 3, 5]);
    }

    #[test]
    fn add_rejects_overlapping_ranges() {
        let index = SegmentIndex::new();
        let vp = Vp::new("/a");
        index.add(seg(&vp, 1, 4), 0).unwrap();
        let result = index.add(seg(&vp, 3, 6), 0);
        assert!(result.is_err());
    }

    #[test]
    fn add_rejects_pending_segments() {
        let index = SegmentIndex::new();
        let pending = LogSegment {
            vp: Vp::new("/a"),
            start_tx: 1,
            end_tx: 1,
            start_commit: 0,
            end_commit: 0,
        };
        assert!(index.add(pending, 0).is_err());
    }

    #[test]
    fn lookup_range_filters_by_intersection() {
        let index = SegmentIndex::new();
        let vp = Vp::new("/a");
        index.add(seg(&vp, 1, 2), 0).unwrap();
        index.add(seg(&vp, 3, 4), 0).unwrap();
        index.add(seg(&vp, 5, 6), 0).unwrap();

        let found = index.lookup_range(&vp, 0, 3, 5);
        let starts: Vec<u64> = found.iter().map(|s| s.start_commit).collect();
        assert_eq!(starts, vec![3, 5]);
    }

    #[test]
    fn different_vps_and_levels_are_independent() {
        let index = SegmentIndex::new();
        let a = Vp::new("/a");
        let b = Vp::new("/b");
        index.add(seg(&a, 1, 2), 0).unwrap();
        index.add(seg(&a, 1, 2), 1).unwrap();
        index.add(seg(&b, 1, 2), 0).unwrap();

        assert_eq!(index.all(&a, 0).len(), 1);
        assert_eq!(index.all(&a, 1).len(), 1);
        assert_eq!(index.all(&b, 0).len(), 1);
        assert!(index.all(&b, 1).is_empty());
    }
}
