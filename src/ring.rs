//! `FrameRing<T>`: bounded FIFO with drop-oldest overflow semantics.
//!
//! Built for a single-writer, latest-read contract: capture and
//! inference workers are each the sole producer into their ring, and
//! consumers only ever want "what's newest," never a full backlog replay.
//! A broadcast channel fits multi-consumer fan-out but doesn't give the
//! non-blocking peek-latest / drain-to-latest operations this ring needs,
//! so those are implemented directly over a `VecDeque` guarded by a
//! `parking_lot::Mutex` for short critical sections.

use std::collections::VecDeque;

use parking_lot::Mutex;

pub struct FrameRing<T> {
    capacity: usize,
    inner: Mutex<VecDeque<T>>,
}

impl<T: Clone> FrameRing<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "ring capacity must be at least 1");
        FrameRing {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Push an item; drops the oldest item if the ring is already at
    /// capacity. Never blocks.
    pub fn push_drop_oldest(&self, item: T) {
        let mut q = self.inner.lock();
        if q.len() == self.capacity {
            q.pop_front();
        }
        q.push_back(item);
    }

    /// Pop the oldest item, if any. Never blocks.
    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Return the most recently pushed item without removing it, or `None`
    /// if the ring is empty.
    pub fn peek_latest(&self) -> Option<T> {
        self.inner.lock().back().cloned()
    }

    /// Remove all elements except the newest, returning it. The ring is
    /// left containing exactly `{x}` afterward. Returns `None` if the ring
    /// was empty (the ring is unchanged).
    pub fn drain_to_latest(&self) -> Option<T> {
        let mut q = self.inner.lock();
        let last = q.pop_back()?;
        q.clear();
        q.push_back(last.clone());
        Some(last)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove everything. Used on worker stop/restart and when a camera's
    /// config update requires the backlog to be discarded.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Snapshot of current contents, oldest first. For tests and the
    /// `Status()` buffer-usage calculation.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_bound_never_exceeds_capacity() {
        let ring = FrameRing::new(4);
        for i in 0..20 {
            ring.push_drop_oldest(i);
            assert!(ring.len() <= 4);
        }
    }

    #[test]
    fn drop_oldest_keeps_last_n_in_push_order() {
        let ring = FrameRing::new(3);
        for i in 0..7 {
            ring.push_drop_oldest(i);
        }
        assert_eq!(ring.snapshot(), vec![4, 5, 6]);
    }

    #[test]
    fn drain_to_latest_leaves_singleton() {
        let ring = FrameRing::new(5);
        for i in 0..5 {
            ring.push_drop_oldest(i);
        }
        let x = ring.drain_to_latest().unwrap();
        assert_eq!(x, 4);
        assert_eq!(ring.snapshot(), vec![4]);
    }

    #[test]
    fn drain_to_latest_on_empty_ring_is_noop() {
        let ring: FrameRing<i32> = FrameRing::new(3);
        assert_eq!(ring.drain_to_latest(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn peek_latest_does_not_remove() {
        let ring = FrameRing::new(3);
        ring.push_drop_oldest(1);
        ring.push_drop_oldest(2);
        assert_eq!(ring.peek_latest(), Some(2));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn pop_removes_oldest_first() {
        let ring = FrameRing::new(3);
        ring.push_drop_oldest(1);
        ring.push_drop_oldest(2);
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), None);
    }
}
