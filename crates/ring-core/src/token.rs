//! # token
//!
//! why: mutual exclusion by circulating a single token around the ring
//! relations: driven by node.rs, the hold itself runs in ring-node
//! what: TokenRing flags, TokenState, EntryRequest

use serde::{Deserialize, Serialize};

/// Where this process stands with respect to the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenState {
    NoToken,
    HoldingIdle,
    HoldingInCriticalSection,
}

/// Answer to a local request for the critical section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryRequest {
    /// Token held and idle; the section was entered
    Entered,
    /// Already inside the section
    AlreadyInside,
    /// No token; entry happens when it next arrives
    Pending,
}

/// Token and critical-section flags of one process.
///
/// Nothing here stops two processes from being inside at once; that only
/// holds because a single token exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRing {
    has_token: bool,
    in_critical_section: bool,
    entry_requested: bool,
    /// Token sent to the successor, reply still outstanding
    forwarding: bool,
}

impl TokenRing {
    pub fn new(has_token: bool) -> Self {
        Self {
            has_token,
            ..Self::default()
        }
    }

    pub fn has_token(&self) -> bool {
        self.has_token
    }

    pub fn in_critical_section(&self) -> bool {
        self.in_critical_section
    }

    /// A request arrived while the token was elsewhere and has not been served yet
    pub fn entry_requested(&self) -> bool {
        self.entry_requested
    }

    pub fn forwarding(&self) -> bool {
        self.forwarding
    }

    pub fn state(&self) -> TokenState {
        match (self.has_token, self.in_critical_section) {
            (false, _) => TokenState::NoToken,
            (true, false) => TokenState::HoldingIdle,
            (true, true) => TokenState::HoldingInCriticalSection,
        }
    }

    /// Take an arriving token. False when one is already held; the
    /// arrival must then be dropped.
    pub fn accept(&mut self) -> bool {
        if self.has_token {
            return false;
        }
        self.has_token = true;
        true
    }

    /// Enter the section if holding the token, idle and not handing it over
    pub fn try_enter(&mut self) -> bool {
        if !self.has_token || self.in_critical_section || self.forwarding {
            return false;
        }
        self.in_critical_section = true;
        self.entry_requested = false;
        true
    }

    pub fn request(&mut self) -> EntryRequest {
        if self.in_critical_section {
            return EntryRequest::AlreadyInside;
        }
        if self.try_enter() {
            return EntryRequest::Entered;
        }
        self.entry_requested = true;
        EntryRequest::Pending
    }

    /// Leave the section. False when not inside.
    pub fn exit(&mut self) -> bool {
        if !self.in_critical_section {
            return false;
        }
        self.in_critical_section = false;
        true
    }

    /// The token is on its way to the successor. False when not held.
    pub fn begin_forward(&mut self) -> bool {
        if !self.has_token {
            return false;
        }
        self.forwarding = true;
        true
    }

    /// The forward to the successor succeeded
    pub fn release(&mut self) {
        self.has_token = false;
        self.forwarding = false;
    }

    /// The forward failed; the token stays here, idle
    pub fn forward_failed(&mut self) {
        self.forwarding = false;
    }
}
