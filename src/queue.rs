//! A fixed-capacity, append-only history that drops its oldest entry on overflow.
//!
//! `OverflowQueue` keeps items in arrival order. Appending to a full queue evicts
//! the item at the head, so the queue always holds the most recent `capacity` items.
//!
//! Both `append` and `items` take the same lock, so a snapshot never observes a
//! half-applied append or eviction. The queue knows nothing about what it stores.
//!
//! ## Example
//! ```rust
//! use vertex_rater::OverflowQueue;
//!
//! let q = OverflowQueue::new(2);
//! q.append(1);
//! q.append(2);
//! q.append(3);
//! assert_eq!(q.items(), vec![2, 3]);
//! ```

use std::collections::VecDeque;

use parking_lot::Mutex;

#[derive(Debug)]
pub struct OverflowQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> OverflowQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        OverflowQueue {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Appends `item` to the tail, evicting the oldest item when full.
    #[inline]
    pub fn append(&self, item: T) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        while inner.len() >= self.capacity {
            inner.pop_front();
        }
        inner.push_back(item);
    }

    /// Returns an ordered copy of the current contents, oldest first.
    #[inline]
    pub fn items(&self) -> Vec<T> {
        self.inner.lock().iter().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
