use crate::error::{Error, Result};
use crate::search::binary_search;
use crate::worker::Worker;
use std::sync::Arc;

/// Fixed-capacity circular buffer of idle workers, oldest at `head`.
///
/// Logical index `i` maps to physical slot `(head + i) % size`, so a bulk
/// expiry may have to extract two contiguous physical ranges when the
/// expired prefix wraps past the end of the buffer.
pub(crate) struct FifoQueue<W> {
    items: Vec<Option<Arc<W>>>,
    head: usize,
    tail: usize,
    size: usize,
    is_full: bool,
}

impl<W: Worker> FifoQueue<W> {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            items: (0..size).map(|_| None).collect(),
            head: 0,
            tail: 0,
            size,
            is_full: false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        if self.size == 0 || self.is_empty() {
            return 0;
        }
        if self.head == self.tail && self.is_full {
            return self.size;
        }
        if self.tail > self.head {
            self.tail - self.head
        } else {
            self.size - self.head + self.tail
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head == self.tail && !self.is_full
    }

    pub(crate) fn insert(&mut self, worker: Arc<W>) -> Result<()> {
        if self.size == 0 {
            return Ok(());
        }
        if self.is_full {
            return Err(Error::QueueIsFull);
        }
        self.items[self.tail] = Some(worker);
        self.tail = (self.tail + 1) % self.size;
        if self.tail == self.head {
            self.is_full = true;
        }
        Ok(())
    }

    pub(crate) fn detach(&mut self) -> Option<Arc<W>> {
        if self.is_empty() {
            return None;
        }
        let worker = self.items[self.head].take();
        self.head = (self.head + 1) % self.size;
        self.is_full = false;
        worker
    }

    /// Extracts the expired prefix in logical order.
    ///
    /// The queue is sorted by last-use time with the oldest worker at
    /// `head`, so the expired workers form a contiguous logical segment
    /// `[0, k)`; `k` is found by binary search. Physically the segment is
    /// either one range `[head, head + k)` or, when it wraps, the
    /// concatenation of `[head, size)` and `[0, (head + k) % size)`.
    pub(crate) fn refresh(&mut self, expire_before: u64) -> Vec<Arc<W>> {
        let Some(expired_len) = self.expired_prefix_len(expire_before) else {
            return Vec::new();
        };

        let mut expired = Vec::with_capacity(expired_len);
        let end = self.head + expired_len;
        if end <= self.size {
            for slot in &mut self.items[self.head..end] {
                expired.extend(slot.take());
            }
        } else {
            for slot in &mut self.items[self.head..] {
                expired.extend(slot.take());
            }
            for slot in &mut self.items[..end % self.size] {
                expired.extend(slot.take());
            }
        }
        self.head = end % self.size;
        if !expired.is_empty() {
            self.is_full = false;
        }
        expired
    }

    /// Length of the expired logical prefix, or `None` when the oldest
    /// worker is still live (which short-circuits the binary search).
    fn expired_prefix_len(&self, expire_before: u64) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let oldest = self.items[self.head].as_ref()?;
        if expire_before < oldest.last_used() {
            return None;
        }

        let len = self.len();
        let first_live = binary_search(0, len - 1, |i| {
            let physical = (self.head + i) % self.size;
            // Every logical index maps to an occupied slot.
            self.items[physical]
                .as_ref()
                .is_some_and(|w| expire_before < w.last_used())
        });

        if first_live == 0 {
            None
        } else {
            Some(first_live)
        }
    }

    pub(crate) fn reset(&mut self) {
        while let Some(worker) = self.detach() {
            worker.finish();
        }
        self.head = 0;
        self.tail = 0;
    }
}
