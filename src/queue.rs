//! Bounded blocking queue of sample blocks between producer and engine.
//! A single mutex plus two condvars; shutdown is signalled by releasing
//! the queue, which wakes every waiter.

use std::collections::VecDeque;

use log::debug;
use ndarray::Array2;
use parking_lot::{Condvar, Mutex};

use crate::error::EngineError;

/// Default slot capacity of the block queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

struct QueueInner {
    blocks: VecDeque<Array2<f64>>,
    /// Channel count established by the first pushed block.
    channels: Option<usize>,
    released: bool,
}

/// Fixed-capacity FIFO of `channels x cols` sample blocks.
///
/// `push` blocks the producer while the queue is full (backpressure);
/// `pop` blocks the consumer while it is empty. `release` wakes every
/// waiter and turns subsequent pops into the shutdown sentinel (`None`).
/// Storage is reserved lazily on the first push, which also establishes
/// the channel count that later blocks must match.
pub struct BlockQueue {
    inner: Mutex<QueueInner>,
    /// Signalled when a slot frees up.
    space: Condvar,
    /// Signalled when a block arrives.
    items: Condvar,
    capacity: usize,
}

impl BlockQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                blocks: VecDeque::new(),
                channels: None,
                released: false,
            }),
            space: Condvar::new(),
            items: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Queue one block, blocking while the queue is full.
    ///
    /// The first pushed block sizes the queue and establishes the channel
    /// count; a later block with a different row count is rejected with
    /// [`EngineError::ShapeMismatch`]. Pushing to a released queue drops
    /// the block (shutdown path).
    pub fn push(&self, block: Array2<f64>) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();

        match inner.channels {
            None => {
                inner.blocks.reserve(self.capacity);
                inner.channels = Some(block.nrows());
            }
            Some(expected) if expected != block.nrows() => {
                return Err(EngineError::ShapeMismatch {
                    expected,
                    got: block.nrows(),
                });
            }
            Some(_) => {}
        }

        while inner.blocks.len() >= self.capacity && !inner.released {
            self.space.wait(&mut inner);
        }
        if inner.released {
            debug!("push on released queue, dropping block");
            return Ok(());
        }

        inner.blocks.push_back(block);
        drop(inner);
        self.items.notify_one();
        Ok(())
    }

    /// Dequeue the oldest block, blocking while the queue is empty.
    /// Returns `None` once the queue has been released.
    pub fn pop(&self) -> Option<Array2<f64>> {
        let mut inner = self.inner.lock();
        loop {
            if inner.released {
                return None;
            }
            if let Some(block) = inner.blocks.pop_front() {
                drop(inner);
                self.space.notify_one();
                return Some(block);
            }
            self.items.wait(&mut inner);
        }
    }

    /// Wake all waiters; subsequent pops return the shutdown sentinel
    /// until the queue is reopened.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        inner.released = true;
        drop(inner);
        self.items.notify_all();
        self.space.notify_all();
    }

    /// Re-arm a released queue so a restarted engine can pop again.
    /// Pending blocks survive a release/reopen cycle.
    pub fn reopen(&self) {
        self.inner.lock().released = false;
    }

    /// Drop all pending blocks.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.blocks.clear();
        drop(inner);
        self.space.notify_all();
    }

    /// Number of blocks currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BlockQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn block(rows: usize, cols: usize, fill: f64) -> Array2<f64> {
        Array2::from_elem((rows, cols), fill)
    }

    #[test]
    fn test_fifo_order() {
        let q = BlockQueue::new();
        q.push(block(2, 4, 1.0)).unwrap();
        q.push(block(2, 4, 2.0)).unwrap();
        assert_eq!(q.pop().unwrap()[[0, 0]], 1.0);
        assert_eq!(q.pop().unwrap()[[0, 0]], 2.0);
    }

    #[test]
    fn test_shape_established_by_first_push() {
        let q = BlockQueue::new();
        q.push(block(4, 10, 0.0)).unwrap();
        // varying column counts are fine, varying row counts are not
        q.push(block(4, 7, 0.0)).unwrap();
        match q.push(block(3, 10, 0.0)) {
            Err(EngineError::ShapeMismatch { expected, got }) => {
                assert_eq!(expected, 4);
                assert_eq!(got, 3);
            }
            other => panic!("expected shape mismatch, got {:?}", other),
        }
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_release_unblocks_pop() {
        let q = Arc::new(BlockQueue::new());
        let q2 = q.clone();
        let waiter = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(50));
        q.release();
        assert!(waiter.join().unwrap().is_none());
    }

    #[test]
    fn test_full_queue_applies_backpressure() {
        let q = Arc::new(BlockQueue::with_capacity(2));
        q.push(block(1, 1, 0.0)).unwrap();
        q.push(block(1, 1, 0.0)).unwrap();

        let q2 = q.clone();
        let producer = thread::spawn(move || {
            q2.push(block(1, 1, 3.0)).unwrap();
        });
        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.len(), 2); // third push still parked
        q.pop().unwrap();
        producer.join().unwrap();
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_pop_after_release_is_sentinel_even_with_items() {
        let q = BlockQueue::new();
        q.push(block(1, 1, 0.0)).unwrap();
        q.release();
        assert!(q.pop().is_none());
        // reopening makes the buffered block reachable again
        q.reopen();
        assert!(q.pop().is_some());
    }

    #[test]
    fn test_clear_drops_pending() {
        let q = BlockQueue::new();
        q.push(block(1, 1, 0.0)).unwrap();
        q.push(block(1, 1, 0.0)).unwrap();
        q.clear();
        assert!(q.is_empty());
    }
}
