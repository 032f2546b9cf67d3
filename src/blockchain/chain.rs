use thiserror::Error;

use super::block::Block;
use super::target::{encode_target, meets_target, TargetError};

/// Reasons a block or chain is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chain is empty")]
    Empty,

    #[error("block {height} does not link to the hash of its predecessor")]
    BrokenLink { height: u64 },

    #[error("block height {got} does not follow {previous}")]
    HeightMismatch { previous: u64, got: u64 },

    #[error("block {height} uses target {got:#010x}, expected {expected:#010x}")]
    UnexpectedTarget { height: u64, expected: u32, got: u32 },

    #[error("block {height} hash does not match its content")]
    HashMismatch { height: u64 },

    #[error("block {height} does not satisfy proof-of-work")]
    InsufficientWork { height: u64 },

    #[error("target error: {0}")]
    Target(#[from] TargetError),
}

/// Checks hash linkage and proof-of-work for blocks and chains
#[derive(Debug, Clone)]
pub struct ChainValidator {
    bits: u32,
}

impl ChainValidator {
    /// Creates a validator accepting only blocks mined against `bits`
    pub fn new(bits: u32) -> Self {
        ChainValidator { bits }
    }

    /// Checks that `block` may follow `previous`
    ///
    /// The previous hash is recomputed from content, never trusted from the
    /// stored `hash` field.
    pub fn check_block(&self, previous: &Block, block: &Block) -> Result<(), ChainError> {
        if block.previous_hash != previous.hash_content() {
            return Err(ChainError::BrokenLink { height: block.height });
        }

        if block.height != previous.height + 1 {
            return Err(ChainError::HeightMismatch {
                previous: previous.height,
                got: block.height,
            });
        }

        if block.bits != self.bits {
            return Err(ChainError::UnexpectedTarget {
                height: block.height,
                expected: self.bits,
                got: block.bits,
            });
        }

        if block.hash != block.hash_content() {
            return Err(ChainError::HashMismatch { height: block.height });
        }

        let target = encode_target(block.bits)?;
        if !meets_target(&block.hash, &target)? {
            return Err(ChainError::InsufficientWork { height: block.height });
        }

        Ok(())
    }

    /// Walks every adjacent pair of the chain; genesis itself is not checked
    pub fn check_chain(&self, chain: &[Block]) -> Result<(), ChainError> {
        if chain.is_empty() {
            return Err(ChainError::Empty);
        }

        chain
            .windows(2)
            .try_for_each(|pair| self.check_block(&pair[0], &pair[1]))
    }

    /// Returns true iff the chain is non-empty and every link is valid
    pub fn validate(&self, chain: &[Block]) -> bool {
        self.check_chain(chain).is_ok()
    }
}
