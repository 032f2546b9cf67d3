use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::blockchain::{Block, Transaction};

/// Errors that can occur while talking to a peer
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("peer {peer} answered with status {status}")]
    Rejected { peer: String, status: u16 },

    #[error("peer {peer} sent a malformed response: {reason}")]
    Malformed { peer: String, reason: String },
}

/// A statically configured peer node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Peer {
    /// Base URL, e.g. `http://127.0.0.1:5002`
    pub url: String,
}

impl Peer {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Peer {
            url: url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// A chain and its declared length, as served by `GET /chain`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub length: usize,
}

impl ChainSnapshot {
    pub fn new(chain: Vec<Block>) -> Self {
        ChainSnapshot {
            length: chain.len(),
            chain,
        }
    }
}

/// Transport used by replication to reach other nodes
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Pushes a newly admitted transaction to `POST /update_mempool`
    async fn push_transaction(&self, peer: &Peer, transaction: &Transaction) -> Result<(), PeerError>;

    /// Pushes a newly mined block to `POST /update_chain`
    async fn push_block(&self, peer: &Peer, block: &Block) -> Result<(), PeerError>;

    /// Fetches the peer's chain from `GET /chain`
    async fn fetch_chain(&self, peer: &Peer) -> Result<ChainSnapshot, PeerError>;
}

/// [`PeerClient`] speaking JSON over HTTP
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    /// Creates a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpPeerClient { client })
    }

    async fn post_json<T: Serialize + Sync>(&self, peer: &Peer, path: &str, body: &T) -> Result<(), PeerError> {
        let response = self
            .client
            .post(peer.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| unreachable_peer(peer, e))?;

        if !response.status().is_success() {
            return Err(PeerError::Rejected {
                peer: peer.url.clone(),
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn push_transaction(&self, peer: &Peer, transaction: &Transaction) -> Result<(), PeerError> {
        self.post_json(peer, "update_mempool", transaction).await
    }

    async fn push_block(&self, peer: &Peer, block: &Block) -> Result<(), PeerError> {
        self.post_json(peer, "update_chain", block).await
    }

    async fn fetch_chain(&self, peer: &Peer) -> Result<ChainSnapshot, PeerError> {
        let response = self
            .client
            .get(peer.endpoint("chain"))
            .send()
            .await
            .map_err(|e| unreachable_peer(peer, e))?;

        if !response.status().is_success() {
            return Err(PeerError::Rejected {
                peer: peer.url.clone(),
                status: response.status().as_u16(),
            });
        }

        response
            .json::<ChainSnapshot>()
            .await
            .map_err(|e| PeerError::Malformed {
                peer: peer.url.clone(),
                reason: e.to_string(),
            })
    }
}

fn unreachable_peer(peer: &Peer, err: reqwest::Error) -> PeerError {
    PeerError::Unreachable {
        peer: peer.url.clone(),
        reason: err.to_string(),
    }
}
