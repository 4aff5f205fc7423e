use std::future::{self, Future};
use std::sync::Arc;

use swarm_bus::{Bus, UdpBus, VirtualBus};
use swarm_common::{NodeId, Result};
use swarm_consensus::{Node, NodeHandle, NodeStatus};
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::{Report, Snapshot, SwarmConfig, Transport};

/// A running swarm: one bus, `N` node loops and the bookkeeping needed to
/// sample, fault and stop them.
pub struct Swarm {
    config: SwarmConfig,
    bus: Arc<dyn Bus>,
    nodes: Vec<NodeHandle>,
    started: Instant,
    faulted: Option<NodeId>,
}

impl Swarm {
    /// Validates `config`, opens the configured bus and starts every node.
    /// Must be called from within a tokio runtime.
    ///
    /// If the UDP transport cannot be set up the swarm falls back to the
    /// virtual bus.
    pub fn launch(config: SwarmConfig) -> Result<Self> {
        config.validate()?;

        match config.transport {
            Transport::Virtual => Self::launch_on(config, Arc::new(VirtualBus::new())),
            Transport::Udp => Self::launch_or_fallback(config, Arc::new(UdpBus::new())),
        }
    }

    /// Starts the swarm on `bus`, or on a fresh virtual bus if any node
    /// cannot register there.
    pub fn launch_or_fallback(config: SwarmConfig, bus: Arc<dyn Bus>) -> Result<Self> {
        let name = bus.name();
        match Self::launch_on(config.clone(), bus) {
            Ok(swarm) => Ok(swarm),
            Err(e) => {
                warn!("Cannot open {} bus: {}. Falling back to virtual bus", name, e);
                Self::launch_on(config, Arc::new(VirtualBus::new()))
            }
        }
    }

    /// Starts the swarm on a caller-provided bus.
    pub fn launch_on(config: SwarmConfig, bus: Arc<dyn Bus>) -> Result<Self> {
        config.validate()?;

        // Register the whole roster before any loop runs
        let nodes = (0..config.nodes)
            .map(|i| Node::new(i as NodeId, config.nodes, config.timing, bus.clone()))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Swarm: starting {} nodes on {} bus for {:?}",
            config.nodes,
            bus.name(),
            config.duration
        );
        let nodes = nodes.into_iter().map(Node::spawn).collect();

        Ok(Self {
            config,
            bus,
            nodes,
            started: Instant::now(),
            faulted: None,
        })
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn bus_name(&self) -> &'static str {
        self.bus.name()
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn faulted(&self) -> Option<NodeId> {
        self.faulted
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            elapsed: self.started.elapsed(),
            nodes: self.nodes.iter().map(NodeHandle::status).collect(),
        }
    }

    /// Current live leader, if any.
    pub fn leader(&self) -> Option<NodeId> {
        self.snapshot().leader()
    }

    /// Stops one node. The node stays on the roster for reporting.
    pub fn kill(&mut self, id: NodeId) -> bool {
        match self.nodes.iter().find(|n| n.id() == id && n.is_alive()) {
            Some(node) => {
                node.stop();
                warn!("*** FAULT: Node {} failed! ***", id);
                true
            }
            None => {
                warn!("Fault injection: no live node {} found", id);
                false
            }
        }
    }

    /// Stops the current leader. Returns the faulted id, or `None` if no
    /// live node is leading right now.
    pub fn inject_fault(&mut self) -> Option<NodeId> {
        let Some(leader) = self.leader() else {
            info!("Fault injection: no leader to fault yet");
            return None;
        };
        if !self.kill(leader) {
            return None;
        }
        self.faulted = Some(leader);
        Some(leader)
    }

    /// Runs for the configured duration, then shuts down.
    pub async fn run<F>(self, observer: F) -> Report
    where
        F: FnMut(&Snapshot),
    {
        self.run_until(future::pending::<()>(), observer).await
    }

    /// Runs until the configured duration elapses or `stop` resolves,
    /// handing every periodic [`Snapshot`] to `observer`.
    pub async fn run_until<S, F>(mut self, stop: S, mut observer: F) -> Report
    where
        S: Future<Output = ()>,
        F: FnMut(&Snapshot),
    {
        let deadline = self.started + self.config.duration;
        let mut snapshots = Vec::new();
        let mut interrupted = false;
        tokio::pin!(stop);

        while Instant::now() < deadline {
            let wake = (Instant::now() + self.config.sample_interval).min(deadline);
            tokio::select! {
                _ = sleep_until(wake) => {}
                _ = &mut stop => {
                    warn!("Swarm: interrupted");
                    interrupted = true;
                    break;
                }
            }

            let snapshot = self.snapshot();
            observer(&snapshot);
            snapshots.push(snapshot);

            self.maybe_inject_fault();
        }

        self.shutdown(snapshots, interrupted).await
    }

    fn maybe_inject_fault(&mut self) {
        let Some(plan) = self.config.fault else {
            return;
        };
        if self.faulted.is_none() && self.started.elapsed() >= plan.after {
            self.inject_fault();
        }
    }

    /// Stops every node, waits for their loops and aggregates the totals.
    pub async fn shutdown(mut self, snapshots: Vec<Snapshot>, interrupted: bool) -> Report {
        // Leadership is judged on the live swarm, before anyone is stopped
        let final_leader = self.leader();
        let elapsed = self.started.elapsed();
        info!("Swarm: shutting down after {:.1}s", elapsed.as_secs_f64());

        for node in &self.nodes {
            node.stop();
        }

        let mut final_statuses: Vec<NodeStatus> = Vec::with_capacity(self.nodes.len());
        for node in std::mem::take(&mut self.nodes) {
            let status = node.subscribe();
            node.join(self.config.join_timeout).await;
            let mut last = status.borrow().clone();
            last.alive = false;
            final_statuses.push(last);
        }
        self.bus.shutdown();

        Report {
            bus: self.bus.name().to_string(),
            nodes: self.config.nodes,
            elapsed,
            interrupted,
            total_sent: final_statuses.iter().map(|s| s.sent).sum(),
            total_received: final_statuses.iter().map(|s| s.received).sum(),
            total_send_failures: final_statuses.iter().map(|s| s.send_failures).sum(),
            final_leader,
            faulted: self.faulted,
            final_statuses,
            snapshots,
        }
    }
}
