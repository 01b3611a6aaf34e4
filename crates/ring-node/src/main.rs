//! # ring-node binary
//!
//! why: start one ring member as a standalone process
//! relations: wires config.rs, node.rs and api.rs to an HttpMessenger
//! what: tracing setup, argument parsing, listener and server loop

use std::sync::Arc;

use clap::Parser;
use ring_core::RingNode;
use ring_node::{api, Args, Node, NodeError};
use ring_transport::HttpMessenger;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), NodeError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let ring = RingNode::new(args.ring_config()?)?;
    let status = ring.status();
    info!(
        node = status.node_id,
        successor = status.successor_id,
        leader = status.leader_id,
        has_token = status.has_token,
        "ring member starting"
    );

    let messenger = Arc::new(HttpMessenger::new(args.peer_directory())?);
    let node = Node::new(ring, messenger, args.critical_section_hold());

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(addr = %args.bind, "listening");
    axum::serve(listener, api::router(node)).await?;

    Ok(())
}
