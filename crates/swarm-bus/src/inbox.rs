use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use swarm_common::Message;

/// Receipt-ordered queue shared between a bus (producer) and one node loop
/// (consumer). The lock is held only for a single push or drain.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    queue: Arc<Mutex<VecDeque<Message>>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: Message) {
        self.lock().push_back(message);
    }

    /// Takes every queued message, oldest first.
    pub fn drain(&self) -> Vec<Message> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True if both handles point at the same queue.
    pub fn same_queue(&self, other: &Inbox) -> bool {
        Arc::ptr_eq(&self.queue, &other.queue)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        // A panicked producer cannot leave a VecDeque half-written
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
