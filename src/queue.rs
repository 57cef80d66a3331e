//! Bounded, closable producer/consumer queue with blocking and timed variants.
//!
//! Mirrors the reference implementation's `BlockingQueue<T>` behavior:
//! two condition variables (not-empty, not-full) so producers and
//! consumers only wake when their own predicate can hold, FIFO ordering
//! per producer, and a `stop()` that unblocks everyone without discarding
//! what's already queued.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    queue: VecDeque<T>,
    stopped: bool,
}

pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    max_size: usize,
}

impl<T> BlockingQueue<T> {
    /// `max_size == 0` means unbounded.
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                stopped: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            max_size,
        }
    }

    fn has_room(&self, inner: &Inner<T>) -> bool {
        self.max_size == 0 || inner.queue.len() < self.max_size
    }

    /// Blocks until space is available or the queue is stopped.
    /// Returns whether the item was accepted.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        loop {
            if inner.stopped {
                return false;
            }
            if self.has_room(&inner) {
                break;
            }
            self.not_full.wait(&mut inner);
        }
        inner.queue.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Blocks at most `timeout`; returns whether accepted.
    pub fn push_timeout(&self, item: T, timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if inner.stopped {
                return false;
            }
            if self.has_room(&inner) {
                break;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let wait_result = self.not_full.wait_for(&mut inner, deadline - now);
            if wait_result.timed_out() && !self.has_room(&inner) && !inner.stopped {
                return false;
            }
        }
        inner.queue.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Non-blocking; returns whether accepted.
    pub fn try_push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.stopped || !self.has_room(&inner) {
            return false;
        }
        inner.queue.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Blocks until an item is available or the queue is stopped and empty.
    /// A closed-but-nonempty queue still yields its pending items.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.stopped || !inner.queue.is_empty() {
                break;
            }
            self.not_empty.wait(&mut inner);
        }
        if inner.queue.is_empty() {
            return None;
        }
        let item = inner.queue.pop_front();
        self.not_full.notify_one();
        item
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut inner = self.inner.lock();
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if !inner.queue.is_empty() {
                break;
            }
            if inner.stopped {
                return None;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return None;
            }
            self.not_empty.wait_for(&mut inner, deadline - now);
            if inner.queue.is_empty() && std::time::Instant::now() >= deadline {
                return None;
            }
        }
        let item = inner.queue.pop_front();
        self.not_full.notify_one();
        item
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.queue.is_empty() {
            return None;
        }
        let item = inner.queue.pop_front();
        self.not_full.notify_one();
        item
    }

    /// Idempotent; wakes all blocked producers and consumers. New pushes
    /// are rejected immediately; pending items remain poppable.
    pub fn stop(&self) {
        {
            let mut inner = self.inner.lock();
            inner.stopped = true;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        self.not_full.notify_all();
    }

    /// Drops all pending items, invoking `cleanup` on each (e.g. to free
    /// owned raw pointers).
    pub fn clear_with(&self, mut cleanup: impl FnMut(T)) {
        let mut inner = self.inner.lock();
        while let Some(item) = inner.queue.pop_front() {
            cleanup(item);
        }
        self.not_full.notify_all();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock();
        self.max_size > 0 && inner.queue.len() >= self.max_size
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Re-opens a stopped queue and drops its contents. Not thread-safe:
    /// the caller must ensure no concurrent access during the reset.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.stopped = false;
    }
}

impl<T> Drop for BlockingQueue<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_single_producer() {
        let q = BlockingQueue::new(0);
        for i in 0..5 {
            assert!(q.push(i));
        }
        for i in 0..5 {
            assert_eq!(q.pop(), Some(i));
        }
    }

    #[test]
    fn bounded_push_blocks_until_pop() {
        let q = Arc::new(BlockingQueue::new(1));
        assert!(q.push(1));
        assert!(q.is_full());

        let q2 = q.clone();
        let handle = thread::spawn(move || {
            assert!(q2.push(2));
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.pop(), Some(1));
        handle.join().unwrap();
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn stop_rejects_new_pushes_but_drains_pending() {
        let q = BlockingQueue::new(0);
        assert!(q.push(1));
        assert!(q.push(2));
        q.stop();
        assert!(!q.push(3));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn try_push_and_try_pop_are_non_blocking() {
        let q = BlockingQueue::new(1);
        assert!(q.try_push(1));
        assert!(!q.try_push(2));
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn push_timeout_expires_when_full() {
        let q = BlockingQueue::new(1);
        assert!(q.push(1));
        let accepted = q.push_timeout(2, Duration::from_millis(20));
        assert!(!accepted);
    }

    #[test]
    fn pop_timeout_expires_when_empty() {
        let q: BlockingQueue<i32> = BlockingQueue::new(0);
        assert_eq!(q.pop_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn reset_reopens_and_drops_contents() {
        let q = BlockingQueue::new(0);
        q.push(1);
        q.stop();
        q.reset();
        assert!(!q.is_stopped());
        assert!(q.is_empty());
        assert!(q.push(2));
    }

    #[test]
    fn clear_with_invokes_cleanup_per_item() {
        let q = BlockingQueue::new(0);
        q.push(1);
        q.push(2);
        let mut cleaned = Vec::new();
        q.clear_with(|item| cleaned.push(item));
        assert_eq!(cleaned, vec![1, 2]);
        assert!(q.is_empty());
    }
}
