use std::collections::VecDeque;

use parking_lot::Mutex;

/// Slots reserved up front. The queue grows toward `capacity` as items arrive.
const INITIAL_SLOTS: usize = 1024;

/// Fixed-capacity, overwrite-oldest buffer shared between one capture
/// thread and any number of readers.
///
/// All synchronization lives inside: share it as `Arc<RingBuffer<T>>` and
/// call through `&self`. The lock is held only to push, pop, or clone the
/// queue, never across I/O, so a snapshot costs the writer at most one
/// copy of the queue.
///
/// Items are cloned on snapshot. `VideoFrame` and `AudioChunk` keep their
/// payloads behind `Arc`, so that clone is a refcount bump per item.
#[derive(Debug)]
pub struct RingBuffer<T> {
    inner: Mutex<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    capacity: usize,
    total_appended: u64,
    total_evicted: u64,
}

impl<T: Clone> RingBuffer<T> {
    /// A capacity of zero is clamped to one; `StreamConfig::validate`
    /// rejects zero before a buffer is ever built.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(INITIAL_SLOTS)),
                capacity,
                total_appended: 0,
                total_evicted: 0,
            }),
        }
    }

    /// Append at the tail, evicting the oldest item if full.
    pub fn append(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.items.len() == inner.capacity {
            inner.items.pop_front();
            inner.total_evicted += 1;
        }
        inner.items.push_back(item);
        inner.total_appended += 1;
    }

    /// Independent copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        let inner = self.inner.lock();
        inner.items.iter().cloned().collect()
    }

    /// Change capacity, keeping the most recent `min(len, new_capacity)` items.
    pub fn resize(&self, new_capacity: usize) {
        let new_capacity = new_capacity.max(1);
        let mut inner = self.inner.lock();
        let excess = inner.items.len().saturating_sub(new_capacity);
        if excess > 0 {
            inner.items.drain(..excess);
            inner.total_evicted += excess as u64;
        }
        inner.capacity = new_capacity;
        if new_capacity < inner.items.capacity() {
            inner.items.shrink_to(new_capacity);
        }
    }

    /// Drop everything. Counters keep running.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.items.len() as u64;
        inner.items.clear();
        inner.total_evicted += dropped;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Items ever appended. Monotonic, unlike `len`, which saturates at capacity.
    pub fn total_appended(&self) -> u64 {
        self.inner.lock().total_appended
    }

    pub fn total_evicted(&self) -> u64 {
        self.inner.lock().total_evicted
    }
}
