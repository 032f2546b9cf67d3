// Blockchain module
//
// This module contains the core ledger implementation including:
// - Transaction structure and balance validation
// - Block structure and content hashing
// - Compact difficulty targets
// - Proof of work search
// - Chain validation
// - Per-node chain and mempool state

pub mod block;
pub mod chain;
pub mod node;
pub mod pow;
pub mod target;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::ChainValidator;
pub use node::{ConsensusParams, Node, NodeError, NodeIdentity, NodeSnapshot};
pub use transaction::{Address, Amount, Transaction, TransactionInput, TransactionOutput, TransactionRequest};
