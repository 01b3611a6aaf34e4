//! # node
//!
//! why: tie the clock and the three protocols into one per-process state machine
//! relations: uses clock.rs, total_order.rs, token.rs, election.rs; wrapped by ring-node
//! what: RingNode handlers that return the envelopes to send instead of sending them

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::clock::LamportClock;
use crate::election::{CoordinatorStep, ElectionStep, RingElection};
use crate::error::RingError;
use crate::message::{Envelope, EnvelopeKind, MessageId, NodeId, Route, Timestamp};
use crate::ring::{AckRouting, RingConfig};
use crate::token::{EntryRequest, TokenRing, TokenState};
use crate::total_order::{AckOutcome, TotalOrderQueue};

/// Delivered messages kept for inspection; older ones are dropped
pub const DELIVERED_HISTORY: usize = 1024;

/// An envelope the caller must send to `to` on `route`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: NodeId,
    pub route: Route,
    pub envelope: Envelope,
}

impl Outbound {
    pub fn new(to: NodeId, route: Route, envelope: Envelope) -> Self {
        Self { to, route, envelope }
    }
}

/// Result of putting a MESSAGE through the receive path
#[derive(Debug, Clone, Default)]
pub struct Receipt {
    /// False when the message was already pending
    pub enqueued: bool,
    pub delivered: Vec<Envelope>,
    pub outbound: Vec<Outbound>,
}

/// Result of originating a multicast
#[derive(Debug, Clone)]
pub struct Multicast {
    pub envelope: Envelope,
    pub delivered: Vec<Envelope>,
    pub outbound: Vec<Outbound>,
}

#[derive(Debug, Clone)]
pub struct AckReceipt {
    pub acked: MessageId,
    pub outcome: AckOutcome,
    pub delivered: Vec<Envelope>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenArrival {
    /// Token taken; the critical section was entered at `entered_at`
    Accepted { entered_at: Option<Timestamp> },
    /// A token was already held; this one is dropped
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionEntry {
    pub outcome: EntryRequest,
    pub entered_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct CriticalSectionExit {
    pub exited_at: Timestamp,
    /// Token forward to the successor; `None` when this process is its own successor
    pub forward: Option<Outbound>,
}

#[derive(Debug, Clone)]
pub struct ElectionHop {
    pub step: ElectionStep,
    /// The forwarded probe, or the coordinator announcement once completed
    pub outbound: Outbound,
}

#[derive(Debug, Clone)]
pub struct CoordinatorHop {
    pub step: CoordinatorStep,
    pub relay: Option<Outbound>,
}

/// Point-in-time view of a process, as served on the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub successor_id: NodeId,
    pub ring_size: u64,
    pub clock: Timestamp,
    pub token: TokenState,
    pub has_token: bool,
    pub forwarding_token: bool,
    pub in_critical_section: bool,
    pub entry_requested: bool,
    pub leader_id: NodeId,
    pub election_in_progress: bool,
    pub pending: usize,
    /// Messages delivered since startup
    pub delivered: u64,
}

/// All protocol state of one ring member.
///
/// Handlers never do I/O. Whatever must reach another process comes back as
/// `Outbound` values for the caller to send once it has let go of the node.
#[derive(Debug, Clone)]
pub struct RingNode {
    pub config: RingConfig,
    pub clock: LamportClock,
    pub total_order: TotalOrderQueue,
    pub token: TokenRing,
    pub election: RingElection,
    /// The last `DELIVERED_HISTORY` messages released, in delivery order
    pub delivered: VecDeque<Envelope>,
    pub delivered_total: u64,
}

impl RingNode {
    /// Fresh process state: clock 0, token on process 1, leader 1
    pub fn new(config: RingConfig) -> Result<Self, RingError> {
        config.validate()?;
        Ok(Self {
            clock: LamportClock::new(),
            total_order: TotalOrderQueue::new(config.quorum),
            token: TokenRing::new(config.node_id == 1),
            election: RingElection::new(config.node_id),
            delivered: VecDeque::new(),
            delivered_total: 0,
            config,
        })
    }

    pub fn id(&self) -> NodeId {
        self.config.node_id
    }

    pub fn successor(&self) -> NodeId {
        self.config.successor()
    }

    // -- total-order multicast --

    /// Originate a multicast: stamp it, queue it locally, and address it to
    /// every other member.
    pub fn multicast(&mut self, content: impl Into<String>) -> Multicast {
        let timestamp = self.clock.tick();
        let envelope = Envelope::message(content, timestamp, self.id());

        let receipt = self.enqueue_message(envelope.clone());
        let mut outbound: Vec<Outbound> = self
            .config
            .peers()
            .map(|peer| Outbound::new(peer, Route::Receive, envelope.clone()))
            .collect();
        // messages go out ahead of our own acks for them
        outbound.extend(receipt.outbound);

        Multicast {
            envelope,
            delivered: receipt.delivered,
            outbound,
        }
    }

    /// Receive path for a MESSAGE from a peer
    pub fn receive_message(&mut self, envelope: Envelope) -> Result<Receipt, RingError> {
        expect_kind(&envelope, EnvelopeKind::Message)?;
        Ok(self.enqueue_message(envelope))
    }

    fn enqueue_message(&mut self, envelope: Envelope) -> Receipt {
        self.clock.observe(envelope.timestamp);
        let acked = envelope.id();
        let enqueued = self.total_order.enqueue(envelope);
        let delivered = self.deliver();

        // a redelivered duplicate was already acked once
        let mut outbound = Vec::new();
        if enqueued {
            let ack = Envelope::ack(self.clock.tick(), self.id(), acked);
            outbound = self
                .ack_targets(acked.sender_id)
                .into_iter()
                .map(|peer| Outbound::new(peer, Route::Ack, ack.clone()))
                .collect();
        }

        Receipt {
            enqueued,
            delivered,
            outbound,
        }
    }

    fn ack_targets(&self, original_sender: NodeId) -> Vec<NodeId> {
        match self.config.ack_routing {
            AckRouting::Broadcast => self.config.peers().collect(),
            AckRouting::Originator if original_sender != self.id() => vec![original_sender],
            AckRouting::Originator => Vec::new(),
        }
    }

    pub fn receive_ack(&mut self, envelope: Envelope) -> Result<AckReceipt, RingError> {
        expect_kind(&envelope, EnvelopeKind::Ack)?;
        self.clock.observe(envelope.timestamp);

        // peers that leave origin_id unset only ever ack to the originator
        let sender = match envelope.origin_id {
            0 => self.id(),
            origin => origin,
        };
        let acked = MessageId::new(envelope.carried_max_id, sender);
        let outcome = self.total_order.acknowledge(acked);

        Ok(AckReceipt {
            acked,
            outcome,
            delivered: self.deliver(),
        })
    }

    fn deliver(&mut self) -> Vec<Envelope> {
        let delivered = self.total_order.deliverable();
        for envelope in &delivered {
            if self.delivered.len() == DELIVERED_HISTORY {
                self.delivered.pop_front();
            }
            self.delivered.push_back(envelope.clone());
        }
        self.delivered_total += delivered.len() as u64;
        delivered
    }

    // -- token ring --

    /// Take an arriving token and enter the critical section straight away
    pub fn receive_token(&mut self, envelope: Envelope) -> Result<TokenArrival, RingError> {
        expect_kind(&envelope, EnvelopeKind::Token)?;
        self.clock.observe(envelope.timestamp);

        if !self.token.accept() {
            return Ok(TokenArrival::Duplicate);
        }
        let entered_at = self.token.try_enter().then(|| self.clock.tick());
        Ok(TokenArrival::Accepted { entered_at })
    }

    pub fn request_critical_section(&mut self) -> SectionEntry {
        let outcome = self.token.request();
        let entered_at = (outcome == EntryRequest::Entered).then(|| self.clock.tick());
        SectionEntry {
            outcome,
            entered_at,
        }
    }

    /// Leave the critical section and address the token to the successor.
    /// `None` when not inside.
    ///
    /// Until `token_forwarded` or `token_forward_failed` is called the
    /// token counts as in transit and the section cannot be re-entered.
    pub fn finish_critical_section(&mut self) -> Option<CriticalSectionExit> {
        if !self.token.exit() {
            return None;
        }
        let exited_at = self.clock.tick();

        let successor = self.successor();
        let forward = if successor != self.id() && self.token.begin_forward() {
            let token = Envelope::token(self.clock.tick(), self.id());
            Some(Outbound::new(successor, Route::Token, token))
        } else {
            None
        };

        Some(CriticalSectionExit { exited_at, forward })
    }

    /// The successor accepted the token
    pub fn token_forwarded(&mut self) {
        self.token.release();
    }

    /// The token never left. A request made meanwhile is served now,
    /// returning the entry timestamp.
    pub fn token_forward_failed(&mut self) -> Option<Timestamp> {
        self.token.forward_failed();
        if !self.token.entry_requested() || !self.token.try_enter() {
            return None;
        }
        Some(self.clock.tick())
    }

    // -- ring election --

    /// `None` if an election started here is still running
    pub fn start_election(&mut self) -> Option<Outbound> {
        if !self.election.begin() {
            return None;
        }
        let probe = Envelope::election(self.clock.tick(), self.id());
        Some(Outbound::new(self.successor(), Route::Election, probe))
    }

    pub fn receive_election(&mut self, envelope: Envelope) -> Result<ElectionHop, RingError> {
        expect_kind(&envelope, EnvelopeKind::Election)?;
        self.clock.observe(envelope.timestamp);

        let step = self
            .election
            .on_probe(envelope.origin_id, envelope.carried_max_id);
        let outbound = match step {
            ElectionStep::Completed { leader } => self.announce_coordinator(leader),
            ElectionStep::Forward { carried_max } => {
                let probe = Envelope {
                    timestamp: self.clock.tick(),
                    sender_id: self.id(),
                    carried_max_id: carried_max,
                    ..envelope
                };
                Outbound::new(self.successor(), Route::Election, probe)
            }
        };
        Ok(ElectionHop { step, outbound })
    }

    /// Start one trip of the announcement of `leader` around the ring
    pub fn announce_coordinator(&mut self, leader: NodeId) -> Outbound {
        let announcement = Envelope::coordinator(self.clock.tick(), leader, self.id());
        Outbound::new(self.successor(), Route::Coordinator, announcement)
    }

    pub fn receive_coordinator(&mut self, envelope: Envelope) -> Result<CoordinatorHop, RingError> {
        expect_kind(&envelope, EnvelopeKind::Coordinator)?;
        self.clock.observe(envelope.timestamp);

        let step = self
            .election
            .on_coordinator(envelope.sender_id, envelope.origin_id);
        let relay = match step {
            CoordinatorStep::Applied { relay: true } => {
                let announcement = Envelope {
                    timestamp: self.clock.tick(),
                    ..envelope
                };
                Some(Outbound::new(self.successor(), Route::Coordinator, announcement))
            }
            _ => None,
        };
        Ok(CoordinatorHop { step, relay })
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            node_id: self.id(),
            successor_id: self.successor(),
            ring_size: self.config.ring_size,
            clock: self.clock.value(),
            token: self.token.state(),
            has_token: self.token.has_token(),
            forwarding_token: self.token.forwarding(),
            in_critical_section: self.token.in_critical_section(),
            entry_requested: self.token.entry_requested(),
            leader_id: self.election.leader(),
            election_in_progress: self.election.in_progress(),
            pending: self.total_order.len(),
            delivered: self.delivered_total,
        }
    }
}

fn expect_kind(envelope: &Envelope, expected: EnvelopeKind) -> Result<(), RingError> {
    if envelope.kind != expected {
        return Err(RingError::UnexpectedKind {
            expected,
            found: envelope.kind,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId) -> RingNode {
        RingNode::new(RingConfig::new(id, 3)).unwrap()
    }

    #[test]
    fn startup_state() {
        let first = node(1);
        assert_eq!(first.clock.value(), 0);
        assert!(first.token.has_token());
        assert_eq!(first.election.leader(), 1);
        assert!(!first.election.in_progress());

        assert!(!node(2).token.has_token());
    }

    #[test]
    fn wrong_kind_is_rejected_without_touching_state() {
        let mut n = node(2);
        let err = n.receive_ack(Envelope::token(9, 1)).unwrap_err();
        assert_eq!(
            err,
            RingError::UnexpectedKind {
                expected: EnvelopeKind::Ack,
                found: EnvelopeKind::Token,
            }
        );
        assert_eq!(n.clock.value(), 0);
    }

    #[test]
    fn forwarded_token_cannot_be_reused() {
        let mut n = node(1);
        n.request_critical_section();
        let exit = n.finish_critical_section().unwrap();
        assert!(exit.forward.is_some());
        assert!(n.token.forwarding());

        assert_eq!(n.request_critical_section().outcome, EntryRequest::Pending);
        n.token_forwarded();

        let status = n.status();
        assert!(!status.has_token);
        assert!(!status.in_critical_section);
        assert!(status.entry_requested);
        assert!(n.finish_critical_section().is_none());
    }

    #[test]
    fn failed_forward_serves_waiting_request() {
        let mut n = node(1);
        n.request_critical_section();
        n.finish_critical_section();
        n.request_critical_section();
        let before = n.clock.value();

        assert_eq!(n.token_forward_failed(), Some(before + 1));
        assert_eq!(n.token.state(), TokenState::HoldingInCriticalSection);
        assert!(!n.token.forwarding());
    }

    #[test]
    fn delivered_history_is_bounded() {
        let mut n = RingNode::new(RingConfig::new(1, 3).with_quorum(1)).unwrap();
        for i in 0..DELIVERED_HISTORY + 5 {
            n.multicast(format!("m{i}"));
        }
        assert_eq!(n.delivered.len(), DELIVERED_HISTORY);
        assert_eq!(n.status().delivered, DELIVERED_HISTORY as u64 + 5);
        assert_eq!(n.delivered.front().unwrap().content, "m5");
    }

    #[test]
    fn legacy_ack_is_keyed_by_receiver() {
        let mut n = node(1);
        let sent = n.multicast("hello");
        let mut ack = Envelope::ack(5, 2, sent.envelope.id());
        ack.origin_id = 0;

        let receipt = n.receive_ack(ack).unwrap();
        assert_eq!(receipt.acked, MessageId::new(1, 1));
        assert_eq!(receipt.delivered.len(), 1);
    }
}
