//! Per-thread deferred-work queues
//!
//! The activity callback runs on a runtime worker thread, but the sink
//! writers are not reentrant across threads: device spans must be emitted by
//! the thread that issued the originating host call. The worker therefore
//! packages each emission as a closure and appends it to the queue of the
//! origin thread; the origin thread drains its own queue at every host-call
//! boundary, and shutdown performs one final global drain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A deferred emission, executed on the origin thread
pub type DeferredTask = Box<dyn FnOnce() + Send>;

/// Registry of per-thread FIFO task queues
///
/// The outer mutex guards only the map of queues; each queue has its own
/// mutex, held just long enough to append or to move the pending tasks out.
/// Tasks always run outside any lock.
#[derive(Default)]
pub struct ActivityQueues {
    queues: Mutex<HashMap<i64, Arc<Mutex<Vec<DeferredTask>>>>>,
}

impl ActivityQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_for(&self, tid: i64) -> Arc<Mutex<Vec<DeferredTask>>> {
        let mut queues = match self.queues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queues.entry(tid).or_default().clone()
    }

    /// Append a task to `tid`'s queue
    pub fn defer(&self, tid: i64, task: DeferredTask) {
        let queue = self.queue_for(tid);
        let mut pending = match queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pending.push(task);
    }

    /// Drain `tid`'s queue: move everything out under the lock, then run
    /// each task in FIFO order outside it. Returns how many tasks ran.
    pub fn drain(&self, tid: i64) -> usize {
        let queue = self.queue_for(tid);
        let tasks = {
            let mut pending = match queue.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *pending)
        };
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    /// Drain every queue; the shutdown path for completions whose origin
    /// thread will never call into the runtime again
    pub fn drain_all(&self) -> usize {
        let tids: Vec<i64> = self
            .queues
            .lock()
            .map(|queues| queues.keys().copied().collect())
            .unwrap_or_default();
        tids.into_iter().map(|tid| self.drain(tid)).sum()
    }

    /// Number of tasks waiting for `tid`
    pub fn pending(&self, tid: i64) -> usize {
        self.queue_for(tid)
            .lock()
            .map(|pending| pending.len())
            .unwrap_or(0)
    }
}
