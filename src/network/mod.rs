// Network module
//
// Peer transport and the replication protocol built on top of it:
// broadcasting transactions and blocks, and longest-valid-chain fork choice.

pub mod peer;
pub mod replication;

pub use peer::{ChainSnapshot, HttpPeerClient, Peer, PeerClient};
pub use replication::{broadcast_block, broadcast_transaction, fork_choice};
