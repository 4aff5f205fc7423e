use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use swarm_common::{NodeId, Signal, Term};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::timer::random_timeout;
use crate::{Role, Timing};

/// Election and heartbeat state of a single node.
///
/// Pure state machine: every entry point takes the current time and pushes
/// the signals it wants broadcast onto `out`. Nothing here touches the bus,
/// the clock or a runtime, so transitions are driven deterministically in
/// tests and by [`crate::Node`] in production.
///
/// Invariants:
/// - `current_term` never decreases.
/// - `voted_for` is set at most once per term. A vote is only granted to a
///   request whose term is strictly above `current_term`, and granting
///   adopts that term, so a second request for the same term fails the check.
/// - A signal with a term below `current_term` never causes a transition.
pub struct Election {
    id: NodeId,
    cluster_size: usize,
    timing: Timing,
    rng: StdRng,

    role: Role,
    current_term: Term,
    voted_for: Option<NodeId>,
    leader_id: Option<NodeId>,
    votes_received: usize,

    // Timer state
    last_heartbeat_at: Instant,
    election_deadline: Duration,
    last_heartbeat_sent: Option<Instant>,
}

impl Election {
    pub fn new(id: NodeId, cluster_size: usize, timing: Timing) -> Self {
        Self::with_rng(id, cluster_size, timing, StdRng::from_entropy(), Instant::now())
    }

    /// Builds a node with an explicit random source and start time.
    pub fn with_rng(
        id: NodeId,
        cluster_size: usize,
        timing: Timing,
        mut rng: StdRng,
        now: Instant,
    ) -> Self {
        let election_deadline =
            random_timeout(&mut rng, timing.election_timeout_min, timing.election_timeout_max);
        Self {
            id,
            cluster_size,
            timing,
            rng,
            role: Role::Follower, // Everyone starts as a Follower
            current_term: 0,
            voted_for: None,
            leader_id: None,
            votes_received: 0,
            last_heartbeat_at: now,
            election_deadline,
            last_heartbeat_sent: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.leader_id
    }

    pub fn votes_received(&self) -> usize {
        self.votes_received
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn election_deadline(&self) -> Duration {
        self.election_deadline
    }

    pub fn last_heartbeat_at(&self) -> Instant {
        self.last_heartbeat_at
    }

    /// Strict majority: more than half of the whole cluster.
    pub fn has_quorum(&self, votes: usize) -> bool {
        votes > self.cluster_size / 2
    }

    /// Feeds one received signal through the transition table.
    pub fn step(&mut self, signal: Signal, now: Instant, out: &mut Vec<Signal>) {
        if let Some(term) = signal.term() {
            if term < self.current_term {
                debug!(
                    "Node {}: ignoring stale {:?} (term {} < {})",
                    self.id,
                    signal.kind(),
                    term,
                    self.current_term
                );
                return;
            }
        }

        match signal {
            Signal::Heartbeat {
                sender,
                term,
                leader,
            } => {
                if !leader {
                    return;
                }
                self.accept_leader(sender, term, now);
            }

            Signal::VoteRequest { candidate, term } => {
                if term <= self.current_term {
                    debug!(
                        "Node {}: not voting for {} in term {} (already at term {})",
                        self.id, candidate, term, self.current_term
                    );
                    return;
                }
                self.advance_term(term);
                self.become_follower();
                self.voted_for = Some(candidate);
                self.leader_id = None;
                // Give the candidate a full deadline to win
                self.last_heartbeat_at = now;
                debug!("Node {}: voted for {} in term {}", self.id, candidate, term);
                out.push(Signal::VoteResponse {
                    voter: self.id,
                    candidate,
                    term,
                    granted: true,
                });
            }

            Signal::VoteResponse {
                voter,
                candidate,
                term,
                granted,
            } => {
                if self.role != Role::Candidate
                    || term != self.current_term
                    || candidate != self.id
                    || !granted
                {
                    return;
                }
                self.votes_received += 1;
                debug!(
                    "Node {}: vote from {} ({}/{})",
                    self.id, voter, self.votes_received, self.cluster_size
                );
                self.check_election_result(out);
            }

            Signal::LeaderAnnounce { leader, term } => {
                self.accept_leader(leader, term, now);
            }

            Signal::Other { .. } => {}
        }
    }

    /// The timer half of a tick: leader heartbeats and election deadlines.
    pub fn poll(&mut self, now: Instant, out: &mut Vec<Signal>) {
        match self.role {
            Role::Leader => {
                let due = self
                    .last_heartbeat_sent
                    .map_or(true, |sent| now.duration_since(sent) >= self.timing.heartbeat_interval);
                if due {
                    out.push(Signal::Heartbeat {
                        sender: self.id,
                        term: self.current_term,
                        leader: true,
                    });
                    self.last_heartbeat_sent = Some(now);
                }
            }
            Role::Follower | Role::Candidate => {
                if now.duration_since(self.last_heartbeat_at) >= self.election_deadline {
                    self.start_election(now, out);
                }
            }
        }
    }

    /// Transition: Follower/Candidate -> Candidate
    pub fn start_election(&mut self, now: Instant, out: &mut Vec<Signal>) {
        self.role = Role::Candidate;
        self.current_term = self.current_term.saturating_add(1);
        self.voted_for = Some(self.id); // Vote for self
        self.votes_received = 1;
        self.leader_id = None;
        self.last_heartbeat_at = now;
        self.reroll_deadline();

        info!(
            "Node {}: Starting election (term {})",
            self.id, self.current_term
        );

        out.push(Signal::VoteRequest {
            candidate: self.id,
            term: self.current_term,
        });
        self.check_election_result(out);
    }

    /// Transition: Candidate -> Leader once a strict majority is reached
    fn check_election_result(&mut self, out: &mut Vec<Signal>) {
        if self.role != Role::Candidate || !self.has_quorum(self.votes_received) {
            return;
        }

        self.role = Role::Leader;
        self.leader_id = Some(self.id);
        self.last_heartbeat_sent = None;
        info!(
            "Node {}: Became LEADER (term {}, {}/{} votes)",
            self.id, self.current_term, self.votes_received, self.cluster_size
        );

        out.push(Signal::LeaderAnnounce {
            leader: self.id,
            term: self.current_term,
        });
    }

    /// Heartbeat or announcement from a leader whose term is not stale.
    fn accept_leader(&mut self, leader: NodeId, term: Term, now: Instant) {
        self.advance_term(term);
        self.become_follower();
        if self.leader_id != Some(leader) {
            info!("Node {}: Following leader {} (term {})", self.id, leader, term);
        }
        self.leader_id = Some(leader);
        self.last_heartbeat_at = now;
    }

    fn advance_term(&mut self, term: Term) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
        }
    }

    fn become_follower(&mut self) {
        if self.role == Role::Follower {
            return;
        }
        debug!("Node {}: stepping down from {}", self.id, self.role);
        self.role = Role::Follower;
        self.votes_received = 0;
        self.last_heartbeat_sent = None;
        self.reroll_deadline();
    }

    fn reroll_deadline(&mut self) {
        self.election_deadline = random_timeout(
            &mut self.rng,
            self.timing.election_timeout_min,
            self.timing.election_timeout_max,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId, cluster_size: usize, now: Instant) -> Election {
        Election::with_rng(
            id,
            cluster_size,
            Timing::default(),
            StdRng::seed_from_u64(id as u64),
            now,
        )
    }

    #[test]
    fn test_election_timeout_trigger() {
        // 1. Create a Follower Node
        let start = Instant::now();
        let mut node = node(1, 5, start);
        let mut out = Vec::new();
        assert_eq!(node.role(), Role::Follower);
        assert_eq!(node.current_term(), 0);

        // 2. Before the deadline nothing happens
        node.poll(start + Duration::from_millis(100), &mut out);
        assert_eq!(node.role(), Role::Follower);
        assert!(out.is_empty());

        // 3. Past the max timeout the node becomes a candidate
        node.poll(start + Duration::from_millis(301), &mut out);

        assert_eq!(node.role(), Role::Candidate);
        assert_eq!(node.current_term(), 1);
        assert_eq!(node.voted_for(), Some(1));
        assert_eq!(node.votes_received(), 1);
        assert_eq!(out, vec![Signal::VoteRequest { candidate: 1, term: 1 }]);
    }

    #[test]
    fn test_candidate_restarts_after_fresh_deadline() {
        let start = Instant::now();
        let mut node = node(2, 5, start);
        let mut out = Vec::new();

        let first = start + Duration::from_millis(300);
        node.start_election(first, &mut out);
        assert_eq!(node.current_term(), 1);

        // One tick later the new deadline has not elapsed
        node.poll(first + Duration::from_millis(10), &mut out);
        assert_eq!(node.current_term(), 1);

        node.poll(first + Duration::from_millis(301), &mut out);
        assert_eq!(node.role(), Role::Candidate);
        assert_eq!(node.current_term(), 2);
    }

    #[test]
    fn test_single_node_elects_itself() {
        let start = Instant::now();
        let mut node = node(0, 1, start);
        let mut out = Vec::new();

        node.start_election(start, &mut out);

        assert_eq!(node.role(), Role::Leader);
        assert_eq!(node.leader_id(), Some(0));
        assert_eq!(
            out,
            vec![
                Signal::VoteRequest { candidate: 0, term: 1 },
                Signal::LeaderAnnounce { leader: 0, term: 1 },
            ]
        );
    }

    #[test]
    fn test_leader_heartbeat_cadence() {
        let start = Instant::now();
        let mut node = node(0, 1, start);
        let mut out = Vec::new();
        node.start_election(start, &mut out);
        out.clear();

        // First poll as leader sends right away, then every 100ms
        for ms in (0..=300).step_by(10) {
            node.poll(start + Duration::from_millis(ms), &mut out);
        }
        let beats = out
            .iter()
            .filter(|s| matches!(s, Signal::Heartbeat { leader: true, .. }))
            .count();
        assert_eq!(beats, 4);
    }
}
