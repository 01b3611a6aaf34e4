//! # error
//!
//! why: collect the failures that can stop a node from starting or serving
//! relations: returned by main.rs; ApiError in api.rs covers per-request failures
//! what: NodeError

use ring_core::RingError;
use ring_transport::SendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] RingError),

    #[error("failed to set up peer messenger: {0}")]
    Messenger(#[from] SendError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}
