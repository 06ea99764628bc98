//! The pool's guarded state: the idle and active lists, the running
//! counters, and the fingerprint new borrows are compared against on
//! return.

use std::collections::VecDeque;

use crate::pool::config::PoolConfig;
use crate::pool::stats::Counters;
use crate::pooled::PooledRecord;

/// State behind the pool's single mutex.
pub(crate) struct PoolState {
    /// Unassigned connections, oldest-first.
    pub(crate) idle: VecDeque<PooledRecord>,
    /// Checked-out connections; `active[0]` is always the oldest
    /// borrower and the overdue-reclaim target.
    pub(crate) active: VecDeque<PooledRecord>,
    pub(crate) counters: Counters,
}

impl PoolState {
    pub(crate) fn new() -> Self {
        Self {
            idle: VecDeque::new(),
            active: VecDeque::new(),
            counters: Counters::default(),
        }
    }

    /// Debug-only invariant check: never violated at any point a
    /// caller of this module can observe the guard released.
    pub(crate) fn debug_check_invariants(&self, config: &PoolConfig) {
        debug_assert!(self.active.len() as u32 <= config.max_active);
        debug_assert!(self.idle.len() as u32 <= config.max_idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let state = PoolState::new();
        assert!(state.idle.is_empty());
        assert!(state.active.is_empty());
        assert_eq!(state.counters.request_count, 0);
    }
}
