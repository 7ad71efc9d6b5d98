use crate::error::Result;
use crate::search::binary_search;
use crate::worker::Worker;
use std::sync::Arc;

/// Growable stack of idle workers.
///
/// Reverted workers push onto the tail, and because every revert stamps a
/// fresh last-use time, the stack stays sorted with the oldest worker at
/// index 0. Expiry therefore drains a prefix, exactly as in the FIFO ring
/// but without the wrap-around arithmetic.
pub(crate) struct LifoQueue<W> {
    items: Vec<Arc<W>>,
}

impl<W: Worker> LifoQueue<W> {
    pub(crate) fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn insert(&mut self, worker: Arc<W>) -> Result<()> {
        self.items.push(worker);
        Ok(())
    }

    pub(crate) fn detach(&mut self) -> Option<Arc<W>> {
        self.items.pop()
    }

    pub(crate) fn refresh(&mut self, expire_before: u64) -> Vec<Arc<W>> {
        let len = self.items.len();
        if len == 0 {
            return Vec::new();
        }

        let first_live = binary_search(0, len - 1, |i| expire_before < self.items[i].last_used());
        self.items.drain(..first_live).collect()
    }

    pub(crate) fn reset(&mut self) {
        for worker in self.items.drain(..) {
            worker.finish();
        }
    }
}
