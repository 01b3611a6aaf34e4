//! # node
//!
//! why: run a RingNode inside an async process with real sends and real waiting
//! relations: wraps ring-core's RingNode, sends through a ring-transport Messenger, served by api.rs
//! what: Node with one lock over all protocol state, fire-and-forget dispatch, critical-section hold

use std::sync::Arc;
use std::time::Duration;

use ring_core::{
    AckOutcome, AckReceipt, CoordinatorStep, ElectionStep, EntryRequest, Envelope, NodeId, NodeStatus,
    Outbound, Receipt, RingError, RingNode, Route, SectionEntry, Timestamp, TokenArrival,
};
use ring_transport::Messenger;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What an inbound peer envelope did, reported back to the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    MessageReceived,
    AckReceived,
    TokenAccepted,
    TokenIgnored,
    ElectionFinished,
    ElectionForwarded,
    CoordinatorApplied,
    CoordinatorIgnored,
}

impl Inbound {
    pub fn status(&self) -> &'static str {
        match self {
            Self::MessageReceived => "message_received",
            Self::AckReceived => "ack_received",
            Self::TokenAccepted => "token_accepted",
            Self::TokenIgnored => "token_ignored",
            Self::ElectionFinished => "election_finished",
            Self::ElectionForwarded => "election_forwarded",
            Self::CoordinatorApplied => "coordinator_applied",
            Self::CoordinatorIgnored => "coordinator_ignored",
        }
    }
}

/// One ring member at runtime.
///
/// All protocol state sits behind a single mutex. It is never held across
/// a send or a sleep: handlers collect the `Outbound`s under the lock and
/// hand them to `dispatch` after it is released.
pub struct Node<M> {
    id: NodeId,
    state: Mutex<RingNode>,
    messenger: Arc<M>,
    hold: Duration,
}

impl<M: Messenger> Node<M> {
    /// `hold` is how long each visit to the critical section lasts
    pub fn new(ring: RingNode, messenger: Arc<M>, hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: ring.id(),
            state: Mutex::new(ring),
            messenger,
            hold,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn messenger(&self) -> &Arc<M> {
        &self.messenger
    }

    pub async fn status(&self) -> NodeStatus {
        self.state.lock().await.status()
    }

    pub async fn delivered(&self) -> Vec<Envelope> {
        self.state.lock().await.delivered.iter().cloned().collect()
    }

    /// Send each envelope from its own task; nobody waits for the result
    fn dispatch(&self, outbound: impl IntoIterator<Item = Outbound>) {
        for Outbound { to, route, envelope } in outbound {
            let messenger = Arc::clone(&self.messenger);
            let node = self.id;
            tokio::spawn(async move {
                match messenger.send(to, route, &envelope).await {
                    Ok(()) => debug!(node, peer = to, %route, timestamp = envelope.timestamp, "sent"),
                    Err(e) => warn!(node, peer = to, %route, error = %e, "send failed"),
                }
            });
        }
    }

    fn log_delivered(&self, delivered: &[Envelope]) {
        for envelope in delivered {
            info!(
                node = self.id,
                timestamp = envelope.timestamp,
                sender = envelope.sender_id,
                content = %envelope.content,
                "delivered"
            );
        }
    }

    /// Route an inbound peer envelope to its handler
    pub async fn handle(self: &Arc<Self>, route: Route, envelope: Envelope) -> Result<Inbound, RingError> {
        match route {
            Route::Receive => self.receive_message(envelope).await.map(|_| Inbound::MessageReceived),
            Route::Ack => self.receive_ack(envelope).await.map(|_| Inbound::AckReceived),
            Route::Token => match self.receive_token(envelope).await? {
                TokenArrival::Accepted { .. } => Ok(Inbound::TokenAccepted),
                TokenArrival::Duplicate => Ok(Inbound::TokenIgnored),
            },
            Route::Election => match self.receive_election(envelope).await? {
                ElectionStep::Completed { .. } => Ok(Inbound::ElectionFinished),
                ElectionStep::Forward { .. } => Ok(Inbound::ElectionForwarded),
            },
            Route::Coordinator => match self.receive_coordinator(envelope).await? {
                CoordinatorStep::Applied { .. } => Ok(Inbound::CoordinatorApplied),
                CoordinatorStep::Ignored => Ok(Inbound::CoordinatorIgnored),
            },
        }
    }

    // -- total-order multicast --

    /// Originate a multicast and return it without waiting for delivery
    pub async fn multicast(&self, content: impl Into<String>) -> Envelope {
        let sent = self.state.lock().await.multicast(content);
        info!(
            node = self.id,
            timestamp = sent.envelope.timestamp,
            content = %sent.envelope.content,
            "multicast"
        );
        self.log_delivered(&sent.delivered);
        self.dispatch(sent.outbound);
        sent.envelope
    }

    pub async fn receive_message(&self, envelope: Envelope) -> Result<Receipt, RingError> {
        let id = envelope.id();
        let receipt = self.state.lock().await.receive_message(envelope)?;
        debug!(node = self.id, message = %id, enqueued = receipt.enqueued, "message received");
        self.log_delivered(&receipt.delivered);
        self.dispatch(receipt.outbound.iter().cloned());
        Ok(receipt)
    }

    pub async fn receive_ack(&self, envelope: Envelope) -> Result<AckReceipt, RingError> {
        let acker = envelope.sender_id;
        let receipt = self.state.lock().await.receive_ack(envelope)?;
        match receipt.outcome {
            AckOutcome::Counted(count) => {
                debug!(node = self.id, message = %receipt.acked, acker, count, "ack counted")
            }
            AckOutcome::Early(held) => {
                debug!(node = self.id, message = %receipt.acked, acker, held, "ack ahead of its message")
            }
            AckOutcome::Ignored => {
                debug!(node = self.id, message = %receipt.acked, acker, "ack ignored")
            }
        }
        self.log_delivered(&receipt.delivered);
        Ok(receipt)
    }

    // -- token ring --

    pub async fn receive_token(self: &Arc<Self>, envelope: Envelope) -> Result<TokenArrival, RingError> {
        let from = envelope.sender_id;
        let arrival = self.state.lock().await.receive_token(envelope)?;
        match arrival {
            TokenArrival::Duplicate => {
                warn!(node = self.id, from, "already holding a token, dropping the extra one");
            }
            TokenArrival::Accepted { entered_at } => {
                info!(node = self.id, from, "token received");
                if let Some(entered_at) = entered_at {
                    self.spawn_critical_section(entered_at);
                }
            }
        }
        Ok(arrival)
    }

    /// Enter now if holding the idle token, else wait for it.
    /// Also reports whether the token is held.
    pub async fn request_critical_section(self: &Arc<Self>) -> (SectionEntry, bool) {
        let (entry, has_token) = {
            let mut state = self.state.lock().await;
            let entry = state.request_critical_section();
            (entry, state.token.has_token())
        };
        match entry.outcome {
            EntryRequest::Entered => {
                if let Some(entered_at) = entry.entered_at {
                    self.spawn_critical_section(entered_at);
                }
            }
            EntryRequest::AlreadyInside => debug!(node = self.id, "already in the critical section"),
            EntryRequest::Pending => info!(node = self.id, "no token, entry waits for its arrival"),
        }
        (entry, has_token)
    }

    fn spawn_critical_section(self: &Arc<Self>, entered_at: Timestamp) {
        let node = Arc::clone(self);
        tokio::spawn(async move { node.run_critical_section(entered_at).await });
    }

    /// Hold the section (outside the lock), leave it, then pass the token on.
    async fn run_critical_section(&self, mut entered_at: Timestamp) {
        loop {
            info!(node = self.id, timestamp = entered_at, "entering critical section");
            tokio::time::sleep(self.hold).await;

            let Some(exit) = self.state.lock().await.finish_critical_section() else {
                return;
            };
            info!(node = self.id, timestamp = exit.exited_at, "leaving critical section");

            let Some(forward) = exit.forward else {
                debug!(node = self.id, "sole ring member keeps the token");
                return;
            };
            match self.forward_token(forward).await {
                Some(reentered_at) => entered_at = reentered_at,
                None => return,
            }
        }
    }

    /// The token only leaves once the successor has accepted it. Entry is
    /// refused while the send is outstanding. A failed send keeps the token
    /// here and the ring stalls; a request made meanwhile is then served,
    /// returning its entry timestamp.
    async fn forward_token(&self, forward: Outbound) -> Option<Timestamp> {
        let Outbound { to, route, envelope } = forward;
        match self.messenger.send(to, route, &envelope).await {
            Ok(()) => {
                self.state.lock().await.token_forwarded();
                info!(node = self.id, peer = to, "token handed over");
                None
            }
            Err(e) => {
                warn!(node = self.id, peer = to, error = %e, "token forward failed, keeping token");
                self.state.lock().await.token_forward_failed()
            }
        }
    }

    // -- ring election --

    /// False if an election started here is still running
    pub async fn start_election(&self) -> bool {
        let Some(probe) = self.state.lock().await.start_election() else {
            debug!(node = self.id, "election already in progress");
            return false;
        };
        info!(node = self.id, "starting election");
        self.dispatch([probe]);
        true
    }

    pub async fn receive_election(&self, envelope: Envelope) -> Result<ElectionStep, RingError> {
        let origin = envelope.origin_id;
        let hop = self.state.lock().await.receive_election(envelope)?;
        match hop.step {
            ElectionStep::Completed { leader } => {
                info!(node = self.id, leader, "election finished, announcing coordinator");
            }
            ElectionStep::Forward { carried_max } => {
                debug!(node = self.id, origin, carried_max, "forwarding election");
            }
        }
        self.dispatch([hop.outbound]);
        Ok(hop.step)
    }

    pub async fn receive_coordinator(&self, envelope: Envelope) -> Result<CoordinatorStep, RingError> {
        let leader = envelope.sender_id;
        let hop = self.state.lock().await.receive_coordinator(envelope)?;
        match hop.step {
            CoordinatorStep::Ignored => debug!(node = self.id, leader, "leader already known"),
            CoordinatorStep::Applied { relay } => {
                info!(node = self.id, leader, relay, "new leader");
            }
        }
        self.dispatch(hop.relay);
        Ok(hop.step)
    }
}
