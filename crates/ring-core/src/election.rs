//! # election
//!
//! why: agree on a leader by passing a probe around the ring (chang-roberts style)
//! relations: driven by node.rs, which stamps and routes the envelopes
//! what: RingElection flags, ElectionStep, CoordinatorStep

use serde::{Deserialize, Serialize};

use crate::message::NodeId;

/// Leader every process assumes before any election
pub const INITIAL_LEADER: NodeId = 1;

/// What to do with an election probe after this process has seen it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionStep {
    /// The probe came back to its initiator; `leader` won
    Completed { leader: NodeId },
    /// Pass the probe on carrying `carried_max`
    Forward { carried_max: NodeId },
}

/// Outcome of a coordinator announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorStep {
    /// Leader already known and no election running
    Ignored,
    /// Leader recorded; `relay` says whether to pass the announcement on
    Applied { relay: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingElection {
    self_id: NodeId,
    leader_id: NodeId,
    in_progress: bool,
}

impl RingElection {
    pub fn new(self_id: NodeId) -> Self {
        Self {
            self_id,
            leader_id: INITIAL_LEADER,
            in_progress: false,
        }
    }

    pub fn leader(&self) -> NodeId {
        self.leader_id
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Mark an election started here. False if one is already running.
    pub fn begin(&mut self) -> bool {
        if self.in_progress {
            return false;
        }
        self.in_progress = true;
        true
    }

    /// Fold this process into a probe started by `origin`.
    ///
    /// Forwarding does not set the local in-progress flag; only the
    /// initiator's own arrival or a coordinator announcement clears it.
    pub fn on_probe(&mut self, origin: NodeId, carried_max: NodeId) -> ElectionStep {
        let carried_max = carried_max.max(self.self_id);
        if origin == self.self_id {
            self.leader_id = carried_max;
            self.in_progress = false;
            return ElectionStep::Completed { leader: carried_max };
        }
        ElectionStep::Forward { carried_max }
    }

    /// Apply an announcement of `leader` made by `announcer`.
    ///
    /// Each process relays at most once and the announcer never relays, so
    /// an announcement makes exactly one trip around the ring.
    pub fn on_coordinator(&mut self, leader: NodeId, announcer: NodeId) -> CoordinatorStep {
        if !self.in_progress && self.leader_id == leader {
            return CoordinatorStep::Ignored;
        }
        self.in_progress = false;
        self.leader_id = leader;
        CoordinatorStep::Applied {
            relay: announcer != self.self_id,
        }
    }
}
