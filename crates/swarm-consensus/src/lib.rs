pub mod election;
pub mod node;
pub mod timer;


pub use election::Election;
pub use node::{Node, NodeHandle, NodeStatus};

use serde::Serialize;
use std::time::Duration;

/// The node loop wakes up this often.
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// The Heartbeat interval (Leader pings followers every 100ms)
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Min/Max Election Timeout (Randomized 150ms - 300ms)
pub const ELECTION_TIMEOUT_MIN: Duration = Duration::from_millis(150);
pub const ELECTION_TIMEOUT_MAX: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "FOLLOWER"),
            Role::Candidate => write!(f, "CANDIDATE"),
            Role::Leader => write!(f, "LEADER"),
        }
    }
}

/// Timer settings shared by every node of a swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub tick: Duration,
    pub heartbeat_interval: Duration,
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            tick: TICK_INTERVAL,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            election_timeout_min: ELECTION_TIMEOUT_MIN,
            election_timeout_max: ELECTION_TIMEOUT_MAX,
        }
    }
}
