//! # ring-node
//!
//! why: run one ring member as a networked process
//! relations: drives ring-core state machines, sends through ring-transport
//! what: async Node wrapper, axum router, clap config, startup errors

pub mod api;
pub mod config;
pub mod error;
pub mod node;

pub use config::Args;
pub use error::NodeError;
pub use node::{Inbound, Node};
