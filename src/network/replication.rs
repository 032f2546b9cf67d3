use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::peer::{Peer, PeerClient, PeerError};
use crate::blockchain::node::shares_genesis;
use crate::blockchain::{Block, ChainValidator, Transaction};

/// What happened when a single peer was contacted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PeerOutcome {
    /// The peer accepted the object
    Updated,

    /// The peer answered with a non-success status
    Rejected { status: u16 },

    /// The peer could not be reached or answered with garbage
    Unreachable { reason: String },
}

impl From<Result<(), PeerError>> for PeerOutcome {
    fn from(result: Result<(), PeerError>) -> Self {
        match result {
            Ok(()) => PeerOutcome::Updated,
            Err(PeerError::Rejected { status, .. }) => PeerOutcome::Rejected { status },
            Err(PeerError::Unreachable { reason, .. }) | Err(PeerError::Malformed { reason, .. }) => {
                PeerOutcome::Unreachable { reason }
            }
        }
    }
}

/// Outcome of a fan-out to every peer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub outcomes: Vec<(Peer, PeerOutcome)>,
}

impl BroadcastReport {
    /// Peers that accepted the broadcast object
    pub fn updated_peers(&self) -> Vec<Peer> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == PeerOutcome::Updated)
            .map(|(peer, _)| peer.clone())
            .collect()
    }
}

/// Result of running fork choice against every peer
#[derive(Debug, Clone, PartialEq)]
pub struct ForkChoice {
    pub replaced: bool,
    pub chain: Vec<Block>,
}

/// Sends a newly admitted transaction to every peer, once, without retrying
pub async fn broadcast_transaction(
    client: &dyn PeerClient,
    peers: &[Peer],
    transaction: &Transaction,
) -> BroadcastReport {
    let results = join_all(
        peers
            .iter()
            .map(|peer| client.push_transaction(peer, transaction)),
    )
    .await;

    collect_report("transaction", &transaction.id, peers, results)
}

/// Sends a newly mined block to every peer, once, without retrying
pub async fn broadcast_block(client: &dyn PeerClient, peers: &[Peer], block: &Block) -> BroadcastReport {
    let results = join_all(peers.iter().map(|peer| client.push_block(peer, block))).await;

    collect_report("block", &block.hash, peers, results)
}

/// Longest valid chain rule
///
/// Peers are queried concurrently but judged in list order. A peer chain is
/// adopted only if it is valid and strictly longer than both the local chain
/// and every earlier candidate, so ties never replace anything. Chains that do
/// not grow from the local genesis block are ignored.
pub async fn fork_choice(
    client: &dyn PeerClient,
    peers: &[Peer],
    validator: &ChainValidator,
    local_chain: &[Block],
) -> ForkChoice {
    let responses = join_all(peers.iter().map(|peer| client.fetch_chain(peer))).await;

    let mut longest: Option<Vec<Block>> = None;
    let mut max_length = local_chain.len();

    for (peer, response) in peers.iter().zip(responses) {
        let snapshot = match response {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Skipping {} during fork choice: {}", peer, err);
                continue;
            }
        };

        if snapshot.length != snapshot.chain.len() {
            warn!(
                "Skipping {}: declared length {} but sent {} blocks",
                peer,
                snapshot.length,
                snapshot.chain.len()
            );
            continue;
        }

        if snapshot.length > max_length && !shares_genesis(&snapshot.chain, local_chain) {
            warn!("Skipping {}: chain is rooted at a different genesis", peer);
            continue;
        }

        if snapshot.length > max_length {
            match validator.check_chain(&snapshot.chain) {
                Ok(()) => {
                    debug!("{} offers a valid chain of length {}", peer, snapshot.length);
                    max_length = snapshot.length;
                    longest = Some(snapshot.chain);
                }
                Err(err) => warn!("Ignoring invalid chain from {}: {}", peer, err),
            }
        }
    }

    match longest {
        Some(chain) => {
            info!("Fork choice selected a chain of length {}", chain.len());
            ForkChoice { replaced: true, chain }
        }
        None => ForkChoice {
            replaced: false,
            chain: local_chain.to_vec(),
        },
    }
}

fn collect_report(kind: &str, id: &str, peers: &[Peer], results: Vec<Result<(), PeerError>>) -> BroadcastReport {
    let outcomes = peers
        .iter()
        .cloned()
        .zip(results)
        .map(|(peer, result)| {
            match &result {
                Ok(()) => debug!("Sent {} {} to {}", kind, id, peer),
                Err(err) => warn!("Failed to send {} {}: {}", kind, id, err),
            }
            (peer, PeerOutcome::from(result))
        })
        .collect();

    BroadcastReport { outcomes }
}
