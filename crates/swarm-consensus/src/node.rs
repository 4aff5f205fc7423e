use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use swarm_bus::{Bus, Inbox};
use swarm_common::{NodeId, Result, Signal, Term};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::{Election, Role, Timing};

/// Point-in-time view of a node, published after every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub alive: bool,
    pub role: Role,
    pub term: Term,
    pub voted_for: Option<NodeId>,
    pub leader_id: Option<NodeId>,
    pub votes_received: usize,
    pub sent: u64,
    pub received: u64,
    pub send_failures: u64,
    pub heartbeats_sent: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    sent: u64,
    received: u64,
    send_failures: u64,
    heartbeats_sent: u64,
}

/// A swarm participant: the election state machine bound to a bus.
///
/// The node owns its state exclusively. The only things it shares are its
/// inbox (with the bus), its `alive` flag (with whoever may stop it) and a
/// watch channel carrying its latest [`NodeStatus`].
pub struct Node {
    election: Election,
    bus: Arc<dyn Bus>,
    inbox: Inbox,
    alive: Arc<AtomicBool>,
    status: watch::Sender<NodeStatus>,
    counters: Counters,
    outbox: Vec<Signal>,
}

impl Node {
    pub fn new(id: NodeId, cluster_size: usize, timing: Timing, bus: Arc<dyn Bus>) -> Result<Self> {
        Self::from_election(Election::new(id, cluster_size, timing), bus)
    }

    /// Registers the node on `bus` and wraps an existing state machine.
    pub fn from_election(election: Election, bus: Arc<dyn Bus>) -> Result<Self> {
        let inbox = bus.register(election.id())?;
        let (status, _) = watch::channel(Self::status_of(&election, Counters::default(), true));
        Ok(Self {
            election,
            bus,
            inbox,
            alive: Arc::new(AtomicBool::new(true)),
            status,
            counters: Counters::default(),
            outbox: Vec::new(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.election.id()
    }

    pub fn election(&self) -> &Election {
        &self.election
    }

    pub fn status(&self) -> NodeStatus {
        Self::status_of(&self.election, self.counters, self.alive.load(Ordering::Acquire))
    }

    /// Starts the node loop on the current tokio runtime.
    pub fn spawn(self) -> NodeHandle {
        let id = self.id();
        let alive = self.alive.clone();
        let status = self.status.subscribe();
        let task = tokio::spawn(self.run());
        NodeHandle {
            id,
            alive,
            status,
            task,
        }
    }

    /// Main node loop. Returns once `alive` is cleared; anything still
    /// queued in the inbox at that point is left unprocessed.
    pub async fn run(mut self) {
        let id = self.id();
        info!("Node {}: Started", id);

        let mut ticker = interval(self.election.timing().tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.alive.load(Ordering::Acquire) {
                break;
            }
            self.tick(Instant::now());
        }

        self.publish();
        info!(
            "Node {}: Stopped (term {}, {})",
            id,
            self.election.current_term(),
            self.election.role()
        );
    }

    /// One loop iteration: drain the inbox in receipt order, then run the
    /// timers, broadcasting whatever the state machine produced.
    pub fn tick(&mut self, now: Instant) {
        for message in self.inbox.drain() {
            self.counters.received += 1;
            self.election.step(message.decode(), now, &mut self.outbox);
            self.flush(now);
        }

        self.election.poll(now, &mut self.outbox);
        self.flush(now);
        self.publish();
    }

    fn flush(&mut self, now: Instant) {
        for signal in std::mem::take(&mut self.outbox) {
            self.send(signal, now);
        }
    }

    fn send(&mut self, signal: Signal, now: Instant) {
        let message = signal.encode(now);
        match self.bus.broadcast(&message, self.id()) {
            Ok(_) => {
                self.counters.sent += 1;
                if matches!(signal, Signal::Heartbeat { .. }) {
                    self.counters.heartbeats_sent += 1;
                }
            }
            Err(e) => {
                self.counters.send_failures += 1;
                warn!("Node {}: {} send error: {}", self.id(), self.bus.name(), e);
            }
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.status());
    }

    fn status_of(election: &Election, counters: Counters, alive: bool) -> NodeStatus {
        NodeStatus {
            id: election.id(),
            alive,
            role: election.role(),
            term: election.current_term(),
            voted_for: election.voted_for(),
            leader_id: election.leader_id(),
            votes_received: election.votes_received(),
            sent: counters.sent,
            received: counters.received,
            send_failures: counters.send_failures,
            heartbeats_sent: counters.heartbeats_sent,
        }
    }
}

/// Control side of a spawned [`Node`].
pub struct NodeHandle {
    id: NodeId,
    alive: Arc<AtomicBool>,
    status: watch::Receiver<NodeStatus>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Latest published status. `alive` reflects the flag, not the last tick.
    pub fn status(&self) -> NodeStatus {
        let mut status = self.status.borrow().clone();
        status.alive = self.is_alive();
        status
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.clone()
    }

    /// Clears the `alive` flag. The loop notices at its next tick.
    /// Returns false if the node was already stopped.
    pub fn stop(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Stops the node and waits up to `timeout` for its loop to exit.
    /// A loop that does not exit in time is aborted.
    pub async fn join(mut self, timeout: Duration) -> bool {
        self.stop();
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Node {}: loop ended abnormally: {}", self.id, e);
                false
            }
            Err(_) => {
                warn!("Node {}: did not stop within {:?}, aborting", self.id, timeout);
                self.task.abort();
                false
            }
        }
    }
}
