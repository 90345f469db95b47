//! Invalidatable per-column statistics cache.

use std::sync::atomic::{AtomicUsize, Ordering};

const UNKNOWN: usize = usize::MAX;

/// Cached statistics of a column.
///
/// Values are computed lazily on first request and dropped by [`Stats::reset`]
/// whenever the column's values change.
#[derive(Debug)]
pub struct Stats {
    na_count: AtomicUsize,
}

impl Stats {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            na_count: AtomicUsize::new(UNKNOWN),
        }
    }

    /// Returns the cached NA count, computing it with `compute` if absent.
    pub fn na_count_with<F: FnOnce() -> usize>(&self, compute: F) -> usize {
        match self.na_count.load(Ordering::Acquire) {
            UNKNOWN => {
                let n = compute();
                self.na_count.store(n, Ordering::Release);
                n
            }
            n => n,
        }
    }

    /// Returns true if any statistic is currently cached.
    pub fn is_computed(&self) -> bool {
        self.na_count.load(Ordering::Acquire) != UNKNOWN
    }

    /// Invalidates every cached statistic.
    pub fn reset(&self) {
        self.na_count.store(UNKNOWN, Ordering::Release);
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_na_count_is_cached_until_reset() {
        let stats = Stats::new();
        assert!(!stats.is_computed());
        assert_eq!(stats.na_count_with(|| 3), 3);
        assert_eq!(stats.na_count_with(|| unreachable!()), 3);
        stats.reset();
        assert!(!stats.is_computed());
        assert_eq!(stats.na_count_with(|| 5), 5);
    }
}
