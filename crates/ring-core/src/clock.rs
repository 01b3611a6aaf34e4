//! # clock
//!
//! why: give every process a lamport logical clock
//! relations: advanced by node.rs on every originated and received envelope
//! what: LamportClock with tick and observe

use serde::{Deserialize, Serialize};

use crate::message::Timestamp;

/// Lamport logical clock, one per process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LamportClock {
    value: Timestamp,
}

impl LamportClock {
    /// Create a clock starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value without advancing
    pub fn value(&self) -> Timestamp {
        self.value
    }

    /// Local event: advance by one and return the new value.
    /// Saturates at `Timestamp::MAX`.
    pub fn tick(&mut self) -> Timestamp {
        self.value = self.value.saturating_add(1);
        self.value
    }

    /// Receive event: jump past `received`, then advance by one
    pub fn observe(&mut self, received: Timestamp) -> Timestamp {
        self.value = self.value.max(received);
        self.tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clock_starts_at_zero() {
        assert_eq!(LamportClock::new().value(), 0);
    }

    #[test]
    fn observe_jumps_past_remote_value() {
        let mut clock = LamportClock::new();
        clock.tick();
        assert_eq!(clock.observe(10), 11);
        // an older remote value still advances the clock
        assert_eq!(clock.observe(3), 12);
    }

    #[test]
    fn observe_of_max_timestamp_saturates() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.observe(Timestamp::MAX), Timestamp::MAX);
        assert_eq!(clock.tick(), Timestamp::MAX);
    }
}
