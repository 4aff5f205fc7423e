pub mod error;
pub mod message;

// Re-export commonly used types
pub use error::{Result, SwarmError};
pub use message::{Message, MessageKind, Signal, PAYLOAD_LEN};

/// Stable node identity. Carried in a single payload byte.
pub type NodeId = u8;

/// Election epoch.
pub type Term = u32;

/// Largest swarm whose ids all fit in one payload byte.
pub const MAX_NODES: usize = NodeId::MAX as usize + 1;
