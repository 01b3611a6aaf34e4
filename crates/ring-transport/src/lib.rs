//! # ring-transport
//!
//! why: carry envelopes from one ring member to another
//! relations: used by ring-node to send whatever ring-core hands back as Outbound
//! what: Messenger trait, HttpMessenger (reqwest), InMemoryMessenger for testing

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use ring_core::{Envelope, NodeId, Outbound, Route};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Placeholder in a peer URL template replaced by the peer id
pub const ID_PLACEHOLDER: &str = "{id}";

/// Default template: one container per process named `proc<id>`
pub const DEFAULT_PEER_URL: &str = "http://proc{id}:8080";

#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("peer {0} is unreachable")]
    Unreachable(NodeId),
}

/// trait for point-to-point delivery of one envelope
///
/// one call is one attempt: implementations must not retry. callers decide
/// what a failure means (usually: log it and move on).
#[async_trait]
pub trait Messenger: Send + Sync + 'static {
    /// deliver `envelope` to `to` on `route`; `Ok` iff the peer accepted it
    async fn send(&self, to: NodeId, route: Route, envelope: &Envelope) -> Result<(), SendError>;
}

// -- peer addressing --

/// maps a peer id to its base url through a template like `http://proc{id}:8080`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDirectory {
    template: String,
}

impl Default for PeerDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_PEER_URL)
    }
}

impl PeerDirectory {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let template = template.trim_end_matches('/').to_string();
        Self { template }
    }

    pub fn base_url(&self, peer: NodeId) -> String {
        self.template.replace(ID_PLACEHOLDER, &peer.to_string())
    }

    /// full url of `route` on `peer`
    pub fn url(&self, peer: NodeId, route: Route) -> String {
        format!("{}{}", self.base_url(peer), route.path())
    }
}

// -- http implementation --

/// posts json envelopes with reqwest, default client timeouts, no retries
#[derive(Debug, Clone)]
pub struct HttpMessenger {
    client: Client,
    peers: PeerDirectory,
}

impl HttpMessenger {
    pub fn new(peers: PeerDirectory) -> Result<Self, SendError> {
        let client = Client::builder().no_proxy().build().map_err(SendError::Client)?;
        Ok(Self { client, peers })
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }
}

#[async_trait]
impl Messenger for HttpMessenger {
    async fn send(&self, to: NodeId, route: Route, envelope: &Envelope) -> Result<(), SendError> {
        let body = envelope.to_json()?;
        let url = self.peers.url(to, route);
        debug!(%url, kind = %envelope.kind, timestamp = envelope.timestamp, "posting envelope");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|source| SendError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

// -- in-memory implementation --

/// in-memory messenger for testing
///
/// records every accepted send; peers marked unreachable fail instead
#[derive(Debug, Default)]
pub struct InMemoryMessenger {
    sent: Mutex<Vec<Outbound>>,
    unreachable: Mutex<HashSet<NodeId>>,
}

impl InMemoryMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// make every later send to `peer` fail
    pub async fn cut(&self, peer: NodeId) {
        self.unreachable.lock().await.insert(peer);
    }

    pub async fn restore(&self, peer: NodeId) {
        self.unreachable.lock().await.remove(&peer);
    }

    /// everything delivered so far, in send order
    pub async fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_on(&self, route: Route) -> Vec<Outbound> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|outbound| outbound.route == route)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Messenger for InMemoryMessenger {
    async fn send(&self, to: NodeId, route: Route, envelope: &Envelope) -> Result<(), SendError> {
        if self.unreachable.lock().await.contains(&to) {
            return Err(SendError::Unreachable(to));
        }
        self.sent
            .lock()
            .await
            .push(Outbound::new(to, route, envelope.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directory_points_at_proc_hosts() {
        let peers = PeerDirectory::default();
        assert_eq!(peers.url(2, Route::Token), "http://proc2:8080/token");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let peers = PeerDirectory::new("http://127.0.0.1:9000/");
        assert_eq!(peers.url(3, Route::Ack), "http://127.0.0.1:9000/ack");
    }

    #[tokio::test]
    async fn in_memory_messenger_records_and_fails() {
        let messenger = InMemoryMessenger::new();
        let token = Envelope::token(1, 1);

        messenger.send(2, Route::Token, &token).await.unwrap();
        messenger.cut(3).await;
        let err = messenger.send(3, Route::Token, &token).await.unwrap_err();

        assert!(matches!(err, SendError::Unreachable(3)));
        assert_eq!(messenger.sent().await.len(), 1);
    }
}
