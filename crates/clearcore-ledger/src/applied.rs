//! Applied-event log — the ledger's idempotency boundary.
//!
//! Every consumer of trade executions keeps its own durable record of
//! applied event ids; the ledger's record also stores the outcome so a
//! redelivered trade returns the original result instead of settling
//! twice. The log is bounded with insertion-order eviction so memory
//! stays predictable in long-running processes.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Bounded map of applied event id → recorded outcome.
pub struct AppliedLog<K, V> {
    entries: HashMap<K, V>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<K>,
    max_size: usize,
}

impl<K: Copy + Eq + Hash, V> AppliedLog<K, V> {
    /// Create a new log with the given maximum size.
    ///
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "AppliedLog max_size must be > 0");
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    /// The recorded outcome for an already-applied event, if any.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Whether the event has already been applied.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Record an applied event's outcome, evicting the oldest entry at
    /// capacity. The caller checks [`Self::get`] first; recording an
    /// existing key replaces its outcome without a second order slot.
    pub fn record(&mut self, key: K, outcome: V) {
        if !self.entries.contains_key(&key) {
            if self.entries.len() >= self.max_size {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
            self.order.push_back(key);
        }
        self.entries.insert(key, outcome);
    }

    /// Number of events currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
