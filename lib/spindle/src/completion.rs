use crate::session::{IoOp, SessionId};
use crate::sync;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// One dequeued unit of work for a worker thread.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Completion {
    /// Readiness completed for one direction of one session. Carries the slot
    /// and the identity the request descriptor held when the event was
    /// observed; the worker re-checks both against the current occupant.
    Io { slot: u16, id: SessionId, op: IoOp },
    /// Posted once per worker during shutdown to unblock the wait.
    Shutdown,
}

/// The queue worker threads block on. The readiness thread posts one
/// completion per observed event; `wait` parks until something arrives.
pub struct CompletionPort {
    queue: Mutex<VecDeque<Completion>>,
    ready: Condvar,
}

impl CompletionPort {
    pub fn new() -> CompletionPort {
        CompletionPort {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    pub fn post(&self, completion: Completion) {
        sync::lock(&self.queue).push_back(completion);
        self.ready.notify_one();
    }

    /// Blocks until a completion is available and returns it in FIFO order.
    pub fn wait(&self) -> Completion {
        let mut queue = sync::lock(&self.queue);
        loop {
            if let Some(completion) = queue.pop_front() {
                return completion;
            }
            queue = match self.ready.wait(queue) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}
