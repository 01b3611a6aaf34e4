//! # config
//!
//! why: read process identity and ring parameters at startup
//! relations: turned into ring-core's RingConfig and ring-transport's PeerDirectory
//! what: clap Args with an environment fallback for every flag

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use ring_core::{AckRouting, NodeId, RingConfig, RingError, DEFAULT_QUORUM};
use ring_transport::{PeerDirectory, DEFAULT_PEER_URL};

#[derive(Parser, Debug, Clone)]
#[command(name = "ring-node")]
#[command(about = "Run one member of a fixed coordination ring")]
pub struct Args {
    /// This process's id, 1..=ring-size
    #[arg(long, env = "MY_ID", default_value_t = 1)]
    pub id: NodeId,

    #[arg(long, env = "RING_SIZE", default_value_t = 3)]
    pub ring_size: u64,

    #[arg(short, long, env = "RING_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Peer base url; `{id}` is replaced with the peer id
    #[arg(long, env = "RING_PEER_URL", default_value = DEFAULT_PEER_URL)]
    pub peer_url: String,

    /// Acks (self included) a message needs before delivery
    #[arg(long, env = "RING_QUORUM", default_value_t = DEFAULT_QUORUM)]
    pub quorum: u32,

    /// How long each visit to the critical section lasts
    #[arg(long, env = "RING_CS_MS", default_value_t = 3000)]
    pub critical_section_ms: u64,

    /// broadcast or originator
    #[arg(long, env = "RING_ACK_ROUTING", default_value = "broadcast")]
    pub ack_routing: AckRouting,
}

impl Args {
    pub fn ring_config(&self) -> Result<RingConfig, RingError> {
        let config = RingConfig::new(self.id, self.ring_size)
            .with_quorum(self.quorum)
            .with_ack_routing(self.ack_routing);
        config.validate()?;
        Ok(config)
    }

    pub fn peer_directory(&self) -> PeerDirectory {
        PeerDirectory::new(self.peer_url.clone())
    }

    pub fn critical_section_hold(&self) -> Duration {
        Duration::from_millis(self.critical_section_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_three_process_ring() {
        let args = Args::try_parse_from(["ring-node"]).unwrap();
        let config = args.ring_config().unwrap();

        assert_eq!(config.node_id, 1);
        assert_eq!(config.ring_size, 3);
        assert_eq!(config.quorum, 2);
        assert_eq!(config.ack_routing, AckRouting::Broadcast);
        assert_eq!(args.critical_section_hold(), Duration::from_secs(3));
        assert_eq!(args.peer_directory().base_url(3), "http://proc3:8080");
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "ring-node",
            "--id",
            "4",
            "--ring-size",
            "5",
            "--quorum",
            "3",
            "--ack-routing",
            "originator",
        ])
        .unwrap();
        let config = args.ring_config().unwrap();

        assert_eq!(config.successor(), 5);
        assert_eq!(config.quorum, 3);
        assert_eq!(config.ack_routing, AckRouting::Originator);
    }

    #[test]
    fn id_outside_ring_is_rejected() {
        let args = Args::try_parse_from(["ring-node", "--id", "7"]).unwrap();
        assert!(args.ring_config().is_err());
    }
}
