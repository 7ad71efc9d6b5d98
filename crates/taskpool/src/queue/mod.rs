mod fifo;
mod lifo;


pub(crate) use fifo::FifoQueue;
pub(crate) use lifo::LifoQueue;

use crate::error::Result;
use crate::worker::Worker;
use std::sync::Arc;

/// Container of idle workers, ordered by last-use time ascending (oldest
/// first).
///
/// The two disciplines are a tagged variant rather than a trait object: the
/// discipline is fixed at construction and the hot paths are a handful of
/// instructions, so a match compiles tighter than virtual dispatch.
///
/// All operations are called under the pool lock.
pub(crate) enum WorkerQueue<W> {
    /// Fixed-capacity circular buffer; used in pre-allocation mode.
    Fifo(FifoQueue<W>),
    /// Growable stack; newly reverted workers are also the next detached.
    Lifo(LifoQueue<W>),
}

impl<W: Worker> WorkerQueue<W> {
    pub(crate) fn fifo(size: usize) -> Self {
        Self::Fifo(FifoQueue::new(size))
    }

    pub(crate) fn lifo() -> Self {
        Self::Lifo(LifoQueue::new())
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Fifo(q) => q.len(),
            Self::Lifo(q) => q.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Self::Fifo(q) => q.is_empty(),
            Self::Lifo(q) => q.is_empty(),
        }
    }

    /// Appends a worker at the tail. Fails with
    /// [`Error::QueueIsFull`](crate::Error::QueueIsFull) only in the FIFO
    /// discipline.
    pub(crate) fn insert(&mut self, worker: Arc<W>) -> Result<()> {
        match self {
            Self::Fifo(q) => q.insert(worker),
            Self::Lifo(q) => q.insert(worker),
        }
    }

    /// Removes and returns the next worker to hand out, or `None` if empty.
    pub(crate) fn detach(&mut self) -> Option<Arc<W>> {
        match self {
            Self::Fifo(q) => q.detach(),
            Self::Lifo(q) => q.detach(),
        }
    }

    /// Extracts every worker whose last-use time is at or before
    /// `expire_before`, oldest first. The survivors keep their order; the
    /// caller terminates the extracted workers.
    pub(crate) fn refresh(&mut self, expire_before: u64) -> Vec<Arc<W>> {
        match self {
            Self::Fifo(q) => q.refresh(expire_before),
            Self::Lifo(q) => q.refresh(expire_before),
        }
    }

    /// Drains the queue, delivering the exit sentinel to each worker in
    /// logical order.
    pub(crate) fn reset(&mut self) {
        match self {
            Self::Fifo(q) => q.reset(),
            Self::Lifo(q) => q.reset(),
        }
    }
}
