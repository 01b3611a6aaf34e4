//! # total_order
//!
//! why: hold multicast messages back until they can be delivered in one global order
//! relations: fed by node.rs receive and ack handlers
//! what: sorted pending queue, ack table, head-of-line delivery

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::message::{Envelope, MessageId};

/// Ack count (self-ack included) a message needs before it may be delivered
pub const DEFAULT_QUORUM: u32 = 2;

/// Most distinct messages with acks waiting for the message itself
pub const EARLY_ACK_LIMIT: usize = 1024;

/// What happened to one incoming ack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckOutcome {
    /// Message pending; its count is now this
    Counted(u32),
    /// Message not seen yet; this many acks are held for it
    Early(u32),
    /// Message already delivered, or the early tally is full
    Ignored,
}

/// Pending-delivery queue plus its ack table.
///
/// Invariants:
/// - `pending` is sorted by `MessageId` ascending
/// - an id is in `acks` iff its message is in `pending`
/// - `early` only holds ids above `last_delivered` that are not pending
#[derive(Debug, Clone)]
pub struct TotalOrderQueue {
    pending: Vec<Envelope>,
    acks: BTreeMap<MessageId, u32>,
    early: BTreeMap<MessageId, u32>,
    last_delivered: Option<MessageId>,
    quorum: u32,
}

impl Default for TotalOrderQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUORUM)
    }
}

impl TotalOrderQueue {
    pub fn new(quorum: u32) -> Self {
        Self {
            pending: Vec::new(),
            acks: BTreeMap::new(),
            early: BTreeMap::new(),
            last_delivered: None,
            quorum,
        }
    }

    pub fn quorum(&self) -> u32 {
        self.quorum
    }

    /// Insert keeping sort order, seeding the ack count to 1 plus any acks
    /// that arrived ahead of the message.
    /// Returns false when the message is already pending.
    pub fn enqueue(&mut self, envelope: Envelope) -> bool {
        let id = envelope.id();
        if self.acks.contains_key(&id) {
            return false;
        }
        let at = self.pending.partition_point(|queued| queued.id() < id);
        self.pending.insert(at, envelope);
        let held = self.early.remove(&id).unwrap_or(0);
        self.acks.insert(id, 1 + held);
        true
    }

    /// Count one more ack for `id`.
    ///
    /// Acks can overtake their message on the wire, so an ack for an id
    /// not yet received is held until `enqueue` sees the message.
    pub fn acknowledge(&mut self, id: MessageId) -> AckOutcome {
        if let Some(count) = self.acks.get_mut(&id) {
            *count += 1;
            return AckOutcome::Counted(*count);
        }
        if self.last_delivered.is_some_and(|last| id <= last) {
            return AckOutcome::Ignored;
        }
        if !self.early.contains_key(&id) && self.early.len() >= EARLY_ACK_LIMIT {
            return AckOutcome::Ignored;
        }
        let held = self.early.entry(id).or_insert(0);
        *held += 1;
        AckOutcome::Early(*held)
    }

    /// Release heads while they have quorum. Never looks past a head
    /// that is still short of acks.
    pub fn deliverable(&mut self) -> Vec<Envelope> {
        let mut delivered = Vec::new();
        while let Some(head) = self.pending.first() {
            let id = head.id();
            let count = self.acks.get(&id).copied().unwrap_or(0);
            if count < self.quorum {
                break;
            }
            self.acks.remove(&id);
            self.last_delivered = Some(id);
            delivered.push(self.pending.remove(0));
        }
        if let Some(last) = self.last_delivered {
            self.early.retain(|id, _| *id > last);
        }
        delivered
    }

    pub fn ack_count(&self, id: MessageId) -> Option<u32> {
        self.acks.get(&id).copied()
    }

    /// Acks held for `id` while its message is still on the way
    pub fn early_acks(&self, id: MessageId) -> Option<u32> {
        self.early.get(&id).copied()
    }

    pub fn head(&self) -> Option<&Envelope> {
        self.pending.first()
    }

    pub fn pending(&self) -> &[Envelope] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(timestamp: u64, sender: u64) -> Envelope {
        Envelope::message(format!("m{timestamp}-{sender}"), timestamp, sender)
    }

    #[test]
    fn enqueue_keeps_queue_sorted() {
        let mut queue = TotalOrderQueue::default();
        queue.enqueue(msg(5, 3));
        queue.enqueue(msg(2, 1));
        queue.enqueue(msg(5, 2));

        let ids: Vec<_> = queue.pending().iter().map(Envelope::id).collect();
        assert_eq!(
            ids,
            vec![MessageId::new(2, 1), MessageId::new(5, 2), MessageId::new(5, 3)]
        );
    }

    #[test]
    fn duplicate_enqueue_keeps_count() {
        let mut queue = TotalOrderQueue::new(3);
        queue.enqueue(msg(1, 1));
        queue.acknowledge(MessageId::new(1, 1));

        assert!(!queue.enqueue(msg(1, 1)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.ack_count(MessageId::new(1, 1)), Some(2));
    }

    #[test]
    fn ack_ahead_of_its_message_is_held() {
        let mut queue = TotalOrderQueue::new(3);
        let id = MessageId::new(4, 1);
        assert_eq!(queue.acknowledge(id), AckOutcome::Early(1));
        assert_eq!(queue.acknowledge(id), AckOutcome::Early(2));
        assert_eq!(queue.ack_count(id), None);

        assert!(queue.enqueue(msg(4, 1)));
        assert_eq!(queue.ack_count(id), Some(3));
        assert_eq!(queue.early_acks(id), None);
        assert_eq!(queue.deliverable().len(), 1);
    }

    #[test]
    fn ack_after_delivery_is_ignored() {
        let mut queue = TotalOrderQueue::default();
        queue.enqueue(msg(1, 1));
        queue.acknowledge(MessageId::new(1, 1));
        queue.deliverable();

        assert_eq!(queue.acknowledge(MessageId::new(1, 1)), AckOutcome::Ignored);
        assert_eq!(queue.early_acks(MessageId::new(1, 1)), None);
    }

    #[test]
    fn early_tally_is_bounded() {
        let mut queue = TotalOrderQueue::default();
        for ts in 1..=EARLY_ACK_LIMIT as u64 {
            assert_eq!(queue.acknowledge(MessageId::new(ts, 2)), AckOutcome::Early(1));
        }
        let overflow = MessageId::new(EARLY_ACK_LIMIT as u64 + 1, 2);
        assert_eq!(queue.acknowledge(overflow), AckOutcome::Ignored);
        // ids already held still count
        assert_eq!(queue.acknowledge(MessageId::new(1, 2)), AckOutcome::Early(2));
    }

    #[test]
    fn delivery_drops_stale_early_acks() {
        let mut queue = TotalOrderQueue::default();
        queue.acknowledge(MessageId::new(1, 3));
        queue.acknowledge(MessageId::new(9, 3));

        queue.enqueue(msg(2, 1));
        queue.acknowledge(MessageId::new(2, 1));
        assert_eq!(queue.deliverable().len(), 1);

        assert_eq!(queue.early_acks(MessageId::new(1, 3)), None);
        assert_eq!(queue.early_acks(MessageId::new(9, 3)), Some(1));
    }

    #[test]
    fn delivery_removes_ack_entry() {
        let mut queue = TotalOrderQueue::default();
        queue.enqueue(msg(1, 1));
        queue.acknowledge(MessageId::new(1, 1));

        let delivered = queue.deliverable();
        assert_eq!(delivered.len(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.ack_count(MessageId::new(1, 1)), None);
    }

    #[test]
    fn quorum_of_one_delivers_on_enqueue() {
        let mut queue = TotalOrderQueue::new(1);
        queue.enqueue(msg(1, 1));
        assert_eq!(queue.deliverable().len(), 1);
    }
}
