use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use swarm_common::{Result, SwarmError, MAX_NODES};
use swarm_consensus::Timing;

/// Which medium the nodes talk over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// In-process broadcast.
    #[default]
    Virtual,
    /// One loopback UDP socket per node.
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Virtual => write!(f, "virtual"),
            Transport::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Transport {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "virtual" => Ok(Transport::Virtual),
            "udp" => Ok(Transport::Udp),
            other => Err(SwarmError::Config(format!(
                "unknown transport '{}' (expected virtual or udp)",
                other
            ))),
        }
    }
}

/// Stop the leader once `after` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaultPlan {
    pub after: Duration,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            after: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwarmConfig {
    pub nodes: usize,
    pub duration: Duration,
    pub fault: Option<FaultPlan>,
    pub transport: Transport,
    pub timing: Timing,
    pub sample_interval: Duration,
    /// How long shutdown waits for each node loop.
    pub join_timeout: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            nodes: 5,
            duration: Duration::from_secs(30),
            fault: None,
            transport: Transport::Virtual,
            timing: Timing::default(),
            sample_interval: Duration::from_secs(1),
            join_timeout: Duration::from_secs(1),
        }
    }
}

impl SwarmConfig {
    pub fn new(nodes: usize) -> Self {
        Self {
            nodes,
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_fault_after(mut self, after: Duration) -> Self {
        self.fault = Some(FaultPlan { after });
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Rejects settings the swarm cannot run with. Called before any node
    /// is created.
    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            return Err(SwarmError::Config("node count must be positive".into()));
        }
        if self.nodes > MAX_NODES {
            return Err(SwarmError::Config(format!(
                "at most {} nodes are supported, got {}",
                MAX_NODES, self.nodes
            )));
        }

        let t = &self.timing;
        if t.tick.is_zero() {
            return Err(SwarmError::Config("tick interval must be positive".into()));
        }
        if t.heartbeat_interval.is_zero() {
            return Err(SwarmError::Config("heartbeat interval must be positive".into()));
        }
        if t.election_timeout_min.is_zero() || t.election_timeout_min > t.election_timeout_max {
            return Err(SwarmError::Config(format!(
                "invalid election timeout range {:?}..={:?}",
                t.election_timeout_min, t.election_timeout_max
            )));
        }
        if self.sample_interval.is_zero() {
            return Err(SwarmError::Config("sample interval must be positive".into()));
        }
        Ok(())
    }
}
