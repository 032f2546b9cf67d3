use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::{Address, Amount, Transaction, TransactionInput, TransactionOutput};

/// Height of the first block in every chain
pub const GENESIS_HEIGHT: u64 = 1;

/// Previous hash recorded by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Nonce recorded by the genesis block, also where the proof-of-work search starts
pub const INITIAL_NONCE: u64 = 1;

/// 2024-01-01T00:00:00Z, shared by every node so that their chains share a root
const GENESIS_TIMESTAMP: i64 = 1_704_067_200;

/// A block whose content is fixed but whose nonce has not been searched for yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTemplate {
    pub height: u64,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub bits: u32,
    pub transactions: Vec<Transaction>,
}

impl BlockTemplate {
    /// Creates a template stamped with the current time
    pub fn new(height: u64, previous_hash: String, bits: u32, transactions: Vec<Transaction>) -> Self {
        BlockTemplate {
            height,
            timestamp: Utc::now(),
            previous_hash,
            bits,
            transactions,
        }
    }

    /// Canonical content of the block for the given nonce
    pub fn content(&self, nonce: u64) -> Value {
        canonical_content(
            self.height,
            &self.timestamp,
            &self.previous_hash,
            self.bits,
            nonce,
            &self.transactions,
        )
    }

    /// Hash this template would have when sealed with `nonce`
    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        hash_value(&self.content(nonce))
    }

    /// Finalizes the template with the nonce and hash found by proof-of-work
    pub fn seal(self, nonce: u64, hash: String) -> Block {
        Block {
            height: self.height,
            timestamp: self.timestamp,
            previous_hash: self.previous_hash,
            nonce,
            bits: self.bits,
            hash,
            transactions: self.transactions,
        }
    }
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Position in the chain, genesis is 1
    pub height: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2024-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Nonce found by proof-of-work
    pub nonce: u64,

    /// Compact difficulty target
    pub bits: u32,

    /// Hash of the block content
    pub hash: String,

    /// Transactions included in this block, coinbase first
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Creates the genesis block
    ///
    /// Every node builds the same genesis for a given `bits`, so a block mined
    /// on one node links to the tip of a freshly started peer.
    pub fn genesis(bits: u32) -> Self {
        let coinbase = Transaction {
            id: uuid::Uuid::nil().to_string(),
            inputs: vec![TransactionInput {
                sender: Address::new("Node:genesis"),
                amount: Amount::ONE,
            }],
            outputs: vec![TransactionOutput {
                receiver: Address::new("Miner:genesis"),
                amount: Amount::ONE,
            }],
        };

        let template = BlockTemplate {
            height: GENESIS_HEIGHT,
            timestamp: Utc
                .timestamp_opt(GENESIS_TIMESTAMP, 0)
                .single()
                .unwrap_or_default(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            bits,
            transactions: vec![coinbase],
        };

        let hash = template.hash_with_nonce(INITIAL_NONCE);
        template.seal(INITIAL_NONCE, hash)
    }

    /// Recomputes the hash of the block content, excluding the stored `hash`
    pub fn hash_content(&self) -> String {
        hash_value(&canonical_content(
            self.height,
            &self.timestamp,
            &self.previous_hash,
            self.bits,
            self.nonce,
            &self.transactions,
        ))
    }

    /// Identifiers of the transactions carried by this block
    pub fn transaction_ids(&self) -> impl Iterator<Item = &str> {
        self.transactions.iter().map(|transaction| transaction.id.as_str())
    }
}

fn canonical_content(
    height: u64,
    timestamp: &DateTime<Utc>,
    previous_hash: &str,
    bits: u32,
    nonce: u64,
    transactions: &[Transaction],
) -> Value {
    // serde_json maps keep their keys sorted, which fixes the field order
    serde_json::json!({
        "height": height,
        "timestamp": timestamp,
        "previous_hash": previous_hash,
        "bits": bits,
        "nonce": nonce,
        "transactions": transactions,
    })
}

/// Double SHA-256 of the serialized content, as lowercase hex
pub fn hash_value(content: &Value) -> String {
    let first = Sha256::digest(content.to_string().as_bytes());
    let second = Sha256::digest(first);
    hex::encode(second)
}
