use crate::metrics::Metrics;
use crate::record::LogRecord;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// FIFO holding area for records waiting to be delivered.
///
/// Producers only append and the delivery engine only drains from the
/// front. When the buffer is at capacity the oldest record is evicted and
/// counted as dropped, so `enqueue` never blocks and never fails.
#[derive(Debug)]
pub struct BoundedBuffer {
    queue: Mutex<VecDeque<Arc<LogRecord>>>,
    capacity: usize,
    metrics: Arc<Metrics>,
}

impl BoundedBuffer {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        let capacity = capacity.max(1);
        BoundedBuffer {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            metrics,
        }
    }

    /// Append a record, evicting the head first if the buffer is full.
    ///
    /// Returns the buffer length after the append.
    pub fn enqueue(&self, record: Arc<LogRecord>) -> usize {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.metrics.add_dropped(1);
        }
        queue.push_back(record);
        queue.len()
    }

    /// Remove and return up to `n` records in insertion order.
    pub fn drain_up_to(&self, n: usize) -> Vec<Arc<LogRecord>> {
        let mut queue = self.lock();
        let take = n.min(queue.len());
        queue.drain(..take).collect()
    }

    pub fn drain_all(&self) -> Vec<Arc<LogRecord>> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<LogRecord>>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
