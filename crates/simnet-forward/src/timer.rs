//! Virtual-time timer queue with idempotent cancellation.
//!
//! Every wait in the engine (route-entry expiry, fragment-record timeout)
//! is a scheduled future event on the host's virtual clock, never a
//! suspended thread. The queue hands out [`TimerToken`]s by value;
//! cancelling a token that already fired, was already cancelled, or was
//! never issued is always a no-op.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Cancellation token for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct TimerToken(u64);

struct Scheduled<K> {
    due: f64,
    token: u64,
    key: K,
}

impl<K> PartialEq for Scheduled<K> {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl<K> Eq for Scheduled<K> {}

impl<K> Ord for Scheduled<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest due
        // time on top. Ties break on token order (earlier scheduled first).
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.token.cmp(&self.token))
    }
}

impl<K> PartialOrd for Scheduled<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of `(due time, key)` pairs over virtual time.
///
/// Cancellation is lazy: cancelled tokens stay in the heap and are
/// skipped when they surface in [`TimerQueue::poll`] or
/// [`TimerQueue::next_deadline`].
pub struct TimerQueue<K> {
    heap: BinaryHeap<Scheduled<K>>,
    cancelled: HashSet<u64>,
    next_token: u64,
}

impl<K> TimerQueue<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_token: 0,
        }
    }

    /// Schedule `key` to fire at virtual time `due`.
    pub fn schedule(&mut self, due: f64, key: K) -> TimerToken {
        let token = self.next_token;
        self.next_token += 1;
        self.heap.push(Scheduled { due, token, key });
        TimerToken(token)
    }

    /// Cancel a scheduled timer. Idempotent: unknown, fired and
    /// already-cancelled tokens are ignored.
    pub fn cancel(&mut self, token: TimerToken) {
        if token.0 < self.next_token {
            self.cancelled.insert(token.0);
        }
    }

    /// Pop every uncancelled timer due at or before `now`.
    pub fn poll(&mut self, now: f64) -> Vec<(TimerToken, K)> {
        let mut fired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.due > now {
                break;
            }
            let Some(entry) = self.heap.pop() else {
                break;
            };
            if self.cancelled.remove(&entry.token) {
                continue;
            }
            fired.push((TimerToken(entry.token), entry.key));
        }
        fired
    }

    /// Due time of the earliest pending (uncancelled) timer.
    #[must_use]
    pub fn next_deadline(&mut self) -> Option<f64> {
        while let Some(top) = self.heap.peek() {
            if !self.cancelled.contains(&top.token) {
                return Some(top.due);
            }
            if let Some(entry) = self.heap.pop() {
                self.cancelled.remove(&entry.token);
            }
        }
        None
    }

    /// Number of pending (uncancelled) timers.
    ///
    /// A token cancelled after it already fired stays in the cancelled
    /// set until it is swept, so this is an upper bound trimmed to zero.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len().saturating_sub(self.cancelled.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
