use std::fmt;
use std::time::Duration;

use serde::Serialize;
use swarm_common::NodeId;
use swarm_consensus::{NodeStatus, Role};

/// Status of every node at one sampling instant.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub elapsed: Duration,
    pub nodes: Vec<NodeStatus>,
}

impl Snapshot {
    /// Live nodes that currently believe they lead.
    pub fn leaders(&self) -> impl Iterator<Item = &NodeStatus> {
        self.nodes
            .iter()
            .filter(|s| s.alive && s.role == Role::Leader)
    }

    /// The live leader with the highest term. A leader that has not yet
    /// heard of a newer term may linger for a tick; it never wins here.
    pub fn leader(&self) -> Option<NodeId> {
        self.leaders()
            .max_by_key(|s| (s.term, std::cmp::Reverse(s.id)))
            .map(|s| s.id)
    }
}

/// One-line role summary as shown in the status stream.
pub fn describe(status: &NodeStatus) -> String {
    if !status.alive {
        return "OFFLINE".to_string();
    }
    match (status.role, status.leader_id) {
        (Role::Leader, _) => format!("LEADER (term {})", status.term),
        (Role::Follower, Some(leader)) => format!("follower -> {}", leader),
        (role, _) => role.to_string(),
    }
}

/// Aggregate outcome of a swarm run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub bus: String,
    pub nodes: usize,
    pub elapsed: Duration,
    pub interrupted: bool,
    pub total_sent: u64,
    pub total_received: u64,
    pub total_send_failures: u64,
    /// `None` when no live node was leading at the end.
    pub final_leader: Option<NodeId>,
    pub faulted: Option<NodeId>,
    pub final_statuses: Vec<NodeStatus>,
    pub snapshots: Vec<Snapshot>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Nodes: {} on {} bus", self.nodes, self.bus)?;
        writeln!(f, "  Elapsed: {:.1}s", self.elapsed.as_secs_f64())?;
        if self.interrupted {
            writeln!(f, "  Run interrupted before the configured duration")?;
        }
        if let Some(id) = self.faulted {
            writeln!(f, "  Faulted: Node {}", id)?;
        }
        writeln!(f, "  Total messages sent: {}", self.total_sent)?;
        writeln!(f, "  Total messages received: {}", self.total_received)?;
        if self.total_send_failures > 0 {
            writeln!(f, "  Send failures: {}", self.total_send_failures)?;
        }
        match self.final_leader {
            Some(id) => write!(f, "  Final leader: Node {}", id),
            None => write!(f, "  No leader (system partitioned or all failed)"),
        }
    }
}
