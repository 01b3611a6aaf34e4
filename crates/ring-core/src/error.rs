//! # error
//!
//! why: report the few ways a core operation can be refused
//! relations: returned by ring.rs validation and node.rs handlers
//! what: RingError

use thiserror::Error;

use crate::message::EnvelopeKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    /// Ring topology or protocol parameters are unusable
    #[error("invalid ring config: {0}")]
    InvalidConfig(String),

    /// Envelope handed to the handler of another kind; no state was touched
    #[error("expected a {expected} envelope, got {found}")]
    UnexpectedKind {
        expected: EnvelopeKind,
        found: EnvelopeKind,
    },
}
