//! Fixed-capacity FIFO with drop-oldest overflow
//!
//! Used by the client exporter (pending spans) and by the span writer
//! (spans waiting for a database connection). When full, a push evicts the
//! oldest element; retained elements keep their insertion order.

use std::collections::VecDeque;

/// Bounded FIFO queue that evicts the oldest element on overflow
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue holding at most `capacity` elements
    ///
    /// A capacity of zero is raised to one so the queue can always hold the
    /// most recent element.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Fraction of capacity in use, in `[0.0, 1.0]`
    pub fn usage(&self) -> f64 {
        self.items.len() as f64 / self.capacity as f64
    }

    /// Append one element, evicting the oldest if the queue is full
    ///
    /// Returns the evicted element, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Append every element in order, returning how many were evicted
    pub fn extend<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        items
            .into_iter()
            .filter_map(|item| self.push(item))
            .count()
    }

    /// Put `items` in front of the current contents (they become the oldest)
    ///
    /// If the combined length exceeds capacity, the oldest elements are
    /// evicted, which means elements of `items` go first. Returns the count
    /// of evicted elements.
    pub fn prepend(&mut self, items: Vec<T>) -> usize {
        let mut dropped = 0;
        for item in items.into_iter().rev() {
            if self.is_full() {
                // New element would be older than everything retained.
                dropped += 1;
                continue;
            }
            self.items.push_front(item);
        }
        dropped
    }

    /// Remove up to `max` elements from the front, oldest first
    pub fn drain_front(&mut self, max: usize) -> Vec<T> {
        let n = max.min(self.items.len());
        self.items.drain(..n).collect()
    }
}
