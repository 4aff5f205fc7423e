use std::sync::{Mutex, MutexGuard, PoisonError};

use swarm_common::{Message, NodeId, Result};
use tracing::debug;

use crate::{Bus, Inbox};

struct Member {
    id: NodeId,
    inbox: Inbox,
}

/// In-memory broadcast medium.
///
/// Membership is an arena of `(id, inbox)` pairs behind one lock. The lock
/// covers registration and the whole fan-out of a broadcast, so deliveries
/// from concurrent senders never interleave within one message.
#[derive(Default)]
pub struct VirtualBus {
    members: Mutex<Vec<Member>>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Member>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Bus for VirtualBus {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn register(&self, id: NodeId) -> Result<Inbox> {
        let mut members = self.lock();
        if let Some(existing) = members.iter().find(|m| m.id == id) {
            return Ok(existing.inbox.clone());
        }

        let inbox = Inbox::new();
        members.push(Member {
            id,
            inbox: inbox.clone(),
        });
        debug!("Virtual bus: registered node {} ({} members)", id, members.len());
        Ok(inbox)
    }

    fn broadcast(&self, message: &Message, sender: NodeId) -> Result<usize> {
        let members = self.lock();
        let mut delivered = 0;
        for member in members.iter().filter(|m| m.id != sender) {
            member.inbox.push(message.clone());
            delivered += 1;
        }
        Ok(delivered)
    }

    fn members(&self) -> Vec<NodeId> {
        self.lock().iter().map(|m| m.id).collect()
    }
}
