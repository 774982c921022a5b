//! FIFO buffer with a hard cap, shared by the execution history, the audit
//! log, the policy change log and the session message queue.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedLog<T> {
    /// A zero capacity is raised to one so the latest entry is always kept.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full. Returns true on eviction.
    pub fn push(&mut self, item: T) -> bool {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front();
            true
        } else {
            false
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove and return up to `limit` of the oldest entries.
    pub fn drain_oldest(&mut self, limit: usize) -> Vec<T> {
        let n = limit.min(self.items.len());
        self.items.drain(..n).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> BoundedLog<T> {
    /// The most recent `limit` entries, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(limit);
        self.items.iter().skip(skip).cloned().collect()
    }
}
