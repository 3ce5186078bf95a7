//! Posting work back onto the dispatch thread.
//!
//! Buffer releases and render completions fire on whatever thread drops the
//! last reference to a [`crate::CommittedBuffer`]. They never touch
//! protocol state there; they hand a closure to an [`Executor`] whose owner
//! runs it on the dispatch thread.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

pub type Task = Box<dyn FnOnce() + Send>;

pub trait Executor: Send + Sync {
    /// Queues `task` to run later on the thread that owns this executor.
    fn spawn(&self, task: Task);
}

/// An executor backed by a plain queue, drained explicitly by its owner.
#[derive(Default)]
pub struct QueueExecutor {
    queue: Mutex<VecDeque<Task>>,
}

impl QueueExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Runs queued tasks until the queue is empty, including tasks spawned
    /// by the tasks themselves. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // The lock is released before running so tasks may spawn more work.
            let next = self.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Executor for QueueExecutor {
    fn spawn(&self, task: Task) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
    }
}
