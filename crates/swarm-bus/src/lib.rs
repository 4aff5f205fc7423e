//! Broadcast media shared by the swarm.
//!
//! A [`Bus`] fans a message out to every registered participant except its
//! sender. Nodes only ever see the trait, so the in-memory [`VirtualBus`] and
//! the loopback [`UdpBus`] are interchangeable at startup.

pub mod inbox;
pub mod udp;
pub mod virtual_bus;

#[cfg(test)]
mod tests;

pub use inbox::Inbox;
pub use udp::UdpBus;
pub use virtual_bus::VirtualBus;

use swarm_common::{Message, NodeId, Result};

pub trait Bus: Send + Sync {
    /// Short human-readable name of the medium ("virtual", "udp").
    fn name(&self) -> &'static str;

    /// Adds `id` to the membership set and returns its inbox.
    /// Registering the same id twice returns the existing inbox.
    fn register(&self, id: NodeId) -> Result<Inbox>;

    /// Delivers `message` to every registered node other than `sender`.
    /// Returns the number of recipients; zero recipients is not an error.
    fn broadcast(&self, message: &Message, sender: NodeId) -> Result<usize>;

    /// Registered ids in registration order.
    fn members(&self) -> Vec<NodeId>;

    /// Releases transport resources. No-op for in-memory media.
    fn shutdown(&self) {}
}
