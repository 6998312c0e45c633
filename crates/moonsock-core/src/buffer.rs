//! Bounded FIFO buffer for outbound payloads.
//!
//! While the socket is down, `send` calls land here instead of failing.
//! On reconnection the connection manager drains the whole buffer onto the
//! fresh socket in one atomic step, so buffered traffic is flushed in its
//! original order ahead of anything sent afterwards.
//!
//! The buffer is fixed-capacity.  What happens when it is full is governed
//! by an [`OverflowPolicy`]; the default ring-buffer behaviour drops the
//! oldest resident item to admit the newest.  Either way `enqueue` never
//! blocks and never errors — the displaced item is reported back to the
//! caller for diagnostics.

use std::collections::VecDeque;

/// What to do when a full buffer receives another item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest resident item to admit the newest (ring-buffer
    /// semantics).  Favors recent traffic.
    #[default]
    EvictOldest,
    /// Refuse the new item and keep the residents.  Favors old traffic.
    RejectNewest,
}

/// Outcome of an [`BoundedQueue::enqueue`] call.
///
/// Overflow is an expected, observable side effect — not an error.  The
/// displaced payload is handed back so the caller can log or count it.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome<T> {
    /// The item was admitted without displacing anything.
    Stored,
    /// The item was admitted; the returned oldest item was evicted.
    Evicted(T),
    /// The buffer was full and the policy refused the new item.
    Rejected(T),
}

/// A fixed-capacity FIFO queue with a configurable overflow policy.
///
/// Invariants:
/// - `len() <= capacity()` at all times.
/// - Insertion order is preserved for all resident items.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> BoundedQueue<T> {
    /// Creates an evict-oldest queue holding at most `capacity` items.
    ///
    /// A zero capacity is clamped to 1 so the queue can always make
    /// progress.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, OverflowPolicy::EvictOldest)
    }

    /// Creates a queue with an explicit overflow policy.
    pub fn with_policy(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Adds an item to the tail of the queue.
    ///
    /// Never blocks and never fails; on overflow the policy decides which
    /// item is displaced, and that item is returned in the outcome.
    pub fn enqueue(&mut self, item: T) -> EnqueueOutcome<T> {
        if self.items.len() < self.capacity {
            self.items.push_back(item);
            return EnqueueOutcome::Stored;
        }

        match self.policy {
            OverflowPolicy::EvictOldest => {
                // len == capacity >= 1, so the front always exists.
                let evicted = self
                    .items
                    .pop_front()
                    .unwrap_or_else(|| unreachable!("full queue has a front"));
                self.items.push_back(item);
                EnqueueOutcome::Evicted(evicted)
            }
            OverflowPolicy::RejectNewest => EnqueueOutcome::Rejected(item),
        }
    }

    /// Removes and returns every resident item in FIFO order, leaving the
    /// queue empty.
    ///
    /// The drain is all-or-nothing: there is no partial dequeue, so a
    /// reconnection flush is atomic with respect to concurrent `enqueue`
    /// calls serialised by the caller's lock.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    /// Current occupancy.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The configured overflow policy.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}
