//! Per-run idempotence guard
//!
//! Remembers which blocks have already had their sensing result applied and
//! which have already been animated in the current run. The executor writes
//! the sense phase while the script runs; the replay scheduler writes the
//! animate phase afterwards. Both hold a clone of the same handle.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::action_log::ActionId;

/// Which consequence of a block has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Sensing result computed during execution
    Sense,
    /// Visual step applied during replay
    Animate,
}

#[derive(Debug, Default)]
struct GuardState {
    handled: HashSet<(Phase, ActionId)>,
    clears: u64,
}

/// Shared set of handled `(phase, block)` pairs
#[derive(Debug, Clone, Default)]
pub struct IdempotenceGuard {
    inner: Arc<Mutex<GuardState>>,
}

impl IdempotenceGuard {
    /// Create an empty guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` was already handled in `phase`
    pub fn seen(&self, phase: Phase, id: &ActionId) -> bool {
        self.inner.lock().handled.contains(&(phase, id.clone()))
    }

    /// Mark `id` as handled in `phase`. Returns true if it was not yet marked.
    pub fn mark(&self, phase: Phase, id: ActionId) -> bool {
        self.inner.lock().handled.insert((phase, id))
    }

    /// Forget everything handled so far
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.handled.clear();
        state.clears += 1;
    }

    /// Number of handled pairs
    pub fn len(&self) -> usize {
        self.inner.lock().handled.len()
    }

    /// Whether nothing has been handled
    pub fn is_empty(&self) -> bool {
        self.inner.lock().handled.is_empty()
    }

    /// Number of handled blocks in one phase
    pub fn count(&self, phase: Phase) -> usize {
        self.inner
            .lock()
            .handled
            .iter()
            .filter(|(p, _)| *p == phase)
            .count()
    }

    /// How many times the guard has been cleared
    pub fn clear_count(&self) -> u64 {
        self.inner.lock().clears
    }
}
