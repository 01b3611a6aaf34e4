//! # message
//!
//! why: define the single envelope shape that crosses the wire between ring members
//! relations: built and consumed by node.rs, serialized by ring-transport
//! what: Envelope, EnvelopeKind, MessageId ordering key, Route paths

use std::fmt;

use serde::{Deserialize, Serialize};

/// Process identity inside the ring (1-based)
pub type NodeId = u64;

/// Lamport timestamp
pub type Timestamp = u64;

/// What an envelope is for; decides how its fields are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeKind {
    /// Application payload for total-order multicast
    Message,
    /// Acknowledgment of a multicast message
    Ack,
    /// The mutual exclusion token
    Token,
    /// Election probe carrying the highest id seen so far
    Election,
    /// Announcement of the elected leader
    Coordinator,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Message => "MESSAGE",
            Self::Ack => "ACK",
            Self::Token => "TOKEN",
            Self::Election => "ELECTION",
            Self::Coordinator => "COORDINATOR",
        };
        f.write_str(name)
    }
}

/// The only message type exchanged between peers.
///
/// Fields are reused per kind:
/// - MESSAGE: `content`, `timestamp`, `sender_id`
/// - ACK: `sender_id` is the acker, `carried_max_id`/`origin_id` are the
///   timestamp and sender of the acknowledged message
/// - TOKEN: `sender_id` is the holder that forwarded it
/// - ELECTION: `carried_max_id` is the highest id seen, `origin_id` the initiator,
///   `sender_id` the last forwarder (0 on the first hop)
/// - COORDINATOR: `sender_id` is the leader, `origin_id` the announcer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub sender_id: NodeId,
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub carried_max_id: NodeId,
    #[serde(default)]
    pub origin_id: NodeId,
}

impl Envelope {
    fn bare(kind: EnvelopeKind, timestamp: Timestamp, sender_id: NodeId) -> Self {
        Self {
            content: String::new(),
            timestamp,
            sender_id,
            kind,
            carried_max_id: 0,
            origin_id: 0,
        }
    }

    /// Application message stamped by its sender
    pub fn message(content: impl Into<String>, timestamp: Timestamp, sender_id: NodeId) -> Self {
        Self {
            content: content.into(),
            ..Self::bare(EnvelopeKind::Message, timestamp, sender_id)
        }
    }

    /// Ack from `acker` for the message identified by `acked`
    pub fn ack(timestamp: Timestamp, acker: NodeId, acked: MessageId) -> Self {
        Self {
            content: "ACK".to_string(),
            carried_max_id: acked.timestamp,
            origin_id: acked.sender_id,
            ..Self::bare(EnvelopeKind::Ack, timestamp, acker)
        }
    }

    pub fn token(timestamp: Timestamp, holder: NodeId) -> Self {
        Self {
            content: "TOKEN".to_string(),
            ..Self::bare(EnvelopeKind::Token, timestamp, holder)
        }
    }

    /// First hop of an election started by `origin`
    pub fn election(timestamp: Timestamp, origin: NodeId) -> Self {
        Self {
            content: "ELECTION".to_string(),
            carried_max_id: origin,
            origin_id: origin,
            ..Self::bare(EnvelopeKind::Election, timestamp, 0)
        }
    }

    pub fn coordinator(timestamp: Timestamp, leader: NodeId, announcer: NodeId) -> Self {
        Self {
            content: "COORDINATOR".to_string(),
            origin_id: announcer,
            ..Self::bare(EnvelopeKind::Coordinator, timestamp, leader)
        }
    }

    /// Total-order key of a MESSAGE envelope
    pub fn id(&self) -> MessageId {
        MessageId::new(self.timestamp, self.sender_id)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// `(timestamp, sender)` pair that uniquely and totally orders messages.
///
/// Field order matters: the derived `Ord` compares timestamp first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub timestamp: Timestamp,
    pub sender_id: NodeId,
}

impl MessageId {
    pub fn new(timestamp: Timestamp, sender_id: NodeId) -> Self {
        Self { timestamp, sender_id }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.timestamp, self.sender_id)
    }
}

/// Peer endpoint an envelope is delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    Receive,
    Ack,
    Token,
    Election,
    Coordinator,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Route::Receive,
        Route::Ack,
        Route::Token,
        Route::Election,
        Route::Coordinator,
    ];

    /// HTTP path of the endpoint
    pub fn path(&self) -> &'static str {
        match self {
            Self::Receive => "/receive",
            Self::Ack => "/ack",
            Self::Token => "/token",
            Self::Election => "/election",
            Self::Coordinator => "/coordinator",
        }
    }

    /// Envelope kind the endpoint accepts
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::Receive => EnvelopeKind::Message,
            Self::Ack => EnvelopeKind::Ack,
            Self::Token => EnvelopeKind::Token,
            Self::Election => EnvelopeKind::Election,
            Self::Coordinator => EnvelopeKind::Coordinator,
        }
    }

    pub fn for_kind(kind: EnvelopeKind) -> Self {
        match kind {
            EnvelopeKind::Message => Self::Receive,
            EnvelopeKind::Ack => Self::Ack,
            EnvelopeKind::Token => Self::Token,
            EnvelopeKind::Election => Self::Election,
            EnvelopeKind::Coordinator => Self::Coordinator,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_order_by_timestamp_then_sender() {
        assert!(MessageId::new(5, 2) < MessageId::new(5, 3));
        assert!(MessageId::new(4, 9) < MessageId::new(5, 1));
    }

    #[test]
    fn kind_serializes_in_upper_case() {
        let json = serde_json::to_string(&EnvelopeKind::Coordinator).unwrap();
        assert_eq!(json, "\"COORDINATOR\"");
    }

    #[test]
    fn ack_carries_the_acknowledged_key() {
        let ack = Envelope::ack(7, 3, MessageId::new(1, 1));
        assert_eq!(ack.kind, EnvelopeKind::Ack);
        assert_eq!(ack.sender_id, 3);
        assert_eq!(ack.carried_max_id, 1);
        assert_eq!(ack.origin_id, 1);
    }

    #[test]
    fn missing_fields_default() {
        let env = Envelope::from_json(br#"{"kind":"ELECTION","origin_id":2,"carried_max_id":2}"#)
            .unwrap();
        assert_eq!(env.sender_id, 0);
        assert_eq!(env.timestamp, 0);
        assert!(env.content.is_empty());
    }

    #[test]
    fn every_route_maps_back_from_its_kind() {
        for route in Route::ALL {
            assert_eq!(Route::for_kind(route.kind()), route);
        }
    }
}
