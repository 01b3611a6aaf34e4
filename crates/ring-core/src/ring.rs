//! # ring
//!
//! why: describe the fixed ring this process belongs to
//! relations: consumed by node.rs, built from cli flags in ring-node
//! what: RingConfig, AckRouting, successor and peer computation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RingError;
use crate::message::NodeId;
use crate::total_order::DEFAULT_QUORUM;

/// Where a process sends the ack for a message it enqueued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckRouting {
    /// Every other ring member counts the ack
    #[default]
    Broadcast,
    /// Only the message's sender counts the ack
    Originator,
}

impl fmt::Display for AckRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => f.write_str("broadcast"),
            Self::Originator => f.write_str("originator"),
        }
    }
}

impl FromStr for AckRouting {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "broadcast" => Ok(Self::Broadcast),
            "originator" => Ok(Self::Originator),
            other => Err(RingError::InvalidConfig(format!(
                "unknown ack routing '{other}', expected broadcast or originator"
            ))),
        }
    }
}

/// Identity and fixed topology of one ring member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    /// This process (1-based)
    pub node_id: NodeId,
    /// Number of members; ids are 1..=ring_size
    pub ring_size: u64,
    /// Ack count (self included) a queued message needs before delivery
    pub quorum: u32,
    pub ack_routing: AckRouting,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            ring_size: 3,
            quorum: DEFAULT_QUORUM,
            ack_routing: AckRouting::default(),
        }
    }
}

impl RingConfig {
    pub fn new(node_id: NodeId, ring_size: u64) -> Self {
        Self {
            node_id,
            ring_size,
            ..Self::default()
        }
    }

    pub fn with_quorum(mut self, quorum: u32) -> Self {
        self.quorum = quorum;
        self
    }

    pub fn with_ack_routing(mut self, ack_routing: AckRouting) -> Self {
        self.ack_routing = ack_routing;
        self
    }

    pub fn validate(&self) -> Result<(), RingError> {
        if self.ring_size == 0 {
            return Err(RingError::InvalidConfig("ring size must be at least 1".into()));
        }
        if self.node_id == 0 || self.node_id > self.ring_size {
            return Err(RingError::InvalidConfig(format!(
                "node id {} is outside the ring 1..={}",
                self.node_id, self.ring_size
            )));
        }
        if self.quorum == 0 {
            return Err(RingError::InvalidConfig("quorum must be at least 1".into()));
        }
        Ok(())
    }

    /// Next member after `id`, wrapping from the last back to 1
    pub fn successor_of(&self, id: NodeId) -> NodeId {
        (id % self.ring_size) + 1
    }

    pub fn successor(&self) -> NodeId {
        self.successor_of(self.node_id)
    }

    /// Every member except this one, in id order
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        (1..=self.ring_size).filter(move |id| *id != self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_wraps_around() {
        let config = RingConfig::new(3, 3);
        assert_eq!(config.successor(), 1);
        assert_eq!(config.successor_of(1), 2);
    }

    #[test]
    fn peers_exclude_self() {
        let config = RingConfig::new(2, 3);
        assert_eq!(config.peers().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn rejects_id_outside_ring() {
        assert!(RingConfig::new(4, 3).validate().is_err());
        assert!(RingConfig::new(0, 3).validate().is_err());
        assert!(RingConfig::new(1, 0).validate().is_err());
        assert!(RingConfig::new(1, 3).with_quorum(0).validate().is_err());
    }

    #[test]
    fn parses_ack_routing() {
        assert_eq!("Originator".parse::<AckRouting>(), Ok(AckRouting::Originator));
        assert!("everyone".parse::<AckRouting>().is_err());
    }
}
