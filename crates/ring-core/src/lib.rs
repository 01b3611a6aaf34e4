//! # ring-core
//!
//! why: implement the ring coordination protocols in pure, portable rust
//! relations: driven by ring-node at runtime, envelopes carried by ring-transport
//! what: lamport clock, total-order multicast, token ring, ring election

pub mod clock;
pub mod election;
pub mod error;
pub mod message;
pub mod node;
pub mod ring;
pub mod token;
pub mod total_order;

pub use clock::LamportClock;
pub use election::{CoordinatorStep, ElectionStep, RingElection};
pub use error::RingError;
pub use message::{Envelope, EnvelopeKind, MessageId, NodeId, Route, Timestamp};
pub use node::{
    AckReceipt, CoordinatorHop, CriticalSectionExit, ElectionHop, Multicast, NodeStatus, Outbound,
    Receipt, RingNode, SectionEntry, TokenArrival, DELIVERED_HISTORY,
};
pub use ring::{AckRouting, RingConfig};
pub use token::{EntryRequest, TokenRing, TokenState};
pub use total_order::{AckOutcome, TotalOrderQueue, DEFAULT_QUORUM, EARLY_ACK_LIMIT};
