use std::collections::HashSet;

use log::{info, warn};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::{Block, BlockTemplate};
use super::chain::{ChainError, ChainValidator};
use super::pow;
use super::target::{difficulty, encode_target, TargetError, DEFAULT_TARGET_BITS};
use super::transaction::{Address, Amount, Transaction, TransactionError};

/// Default number of pooled transactions taken into one block
pub const DEFAULT_MAX_BLOCK_TRANSACTIONS: usize = 10;

/// Errors that can occur while mutating node state
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("unbalanced transaction: {0}")]
    UnbalancedTransaction(#[from] TransactionError),

    #[error("invalid block: {0}")]
    InvalidBlock(#[from] ChainError),

    #[error("stale tip: mined on {expected} but the chain tip is now {current}")]
    StaleTip { expected: String, current: String },

    #[error("target error: {0}")]
    Target(#[from] TargetError),
}

/// Consensus constants shared by every node of a network
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusParams {
    /// Compact proof-of-work target
    pub bits: u32,

    /// Coinbase reward per mined block
    pub reward: Amount,

    /// Maximum pooled transactions per block, coinbase excluded
    pub max_block_transactions: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            bits: DEFAULT_TARGET_BITS,
            reward: Amount::ONE,
            max_block_transactions: DEFAULT_MAX_BLOCK_TRANSACTIONS,
        }
    }
}

/// Network identity of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NodeIdentity {
    pub port: u16,

    /// Sender of this node's coinbase transactions
    pub address: Address,

    /// Default receiver of this node's mining rewards
    pub miner_address: Address,
}

impl NodeIdentity {
    pub fn new(port: u16) -> Self {
        NodeIdentity {
            port,
            address: Address(format!("Node:{}", port)),
            miner_address: Address(format!("Miner:{}", port)),
        }
    }
}

/// Block template plus the target its search must meet
#[derive(Debug, Clone)]
pub struct MiningJob {
    pub template: BlockTemplate,
    pub target: BigUint,
}

impl MiningJob {
    /// Runs the proof-of-work search and seals the block
    pub fn solve(self) -> Result<Block, TargetError> {
        let solution = pow::search(&self.template, &self.target)?;
        Ok(self.template.seal(solution.nonce, solution.hash))
    }
}

/// Full node state as reported by `GET /node`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NodeSnapshot {
    pub identity: NodeIdentity,
    pub bits: u32,
    pub difficulty: f64,
    pub length: usize,
    pub chain: Vec<Block>,
    pub mempool: Vec<Transaction>,
}

/// A single node's chain and pending-transaction pool
#[derive(Debug, Clone)]
pub struct Node {
    identity: NodeIdentity,
    params: ConsensusParams,
    target: BigUint,
    validator: ChainValidator,
    chain: Vec<Block>,
    mempool: Vec<Transaction>,
}

impl Node {
    /// Creates a node holding only the genesis block
    pub fn new(identity: NodeIdentity, params: ConsensusParams) -> Result<Self, NodeError> {
        let target = encode_target(params.bits)?;

        Ok(Node {
            validator: ChainValidator::new(params.bits),
            chain: vec![Block::genesis(params.bits)],
            mempool: Vec::new(),
            identity,
            params,
            target,
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn validator(&self) -> &ChainValidator {
        &self.validator
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn mempool(&self) -> &[Transaction] {
        &self.mempool
    }

    /// Last block of the chain; the chain always holds at least genesis
    pub fn tip(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    pub fn difficulty(&self) -> f64 {
        difficulty(&self.target)
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            identity: self.identity.clone(),
            bits: self.params.bits,
            difficulty: self.difficulty(),
            length: self.chain.len(),
            chain: self.chain.clone(),
            mempool: self.mempool.clone(),
        }
    }

    /// Validates a transaction and appends it to the mempool
    ///
    /// A transaction whose id is already pooled is accepted again without
    /// being appended twice.
    pub fn admit_transaction(&mut self, transaction: Transaction) -> Result<Transaction, NodeError> {
        transaction.check()?;

        if self.mempool.iter().any(|pooled| pooled.id == transaction.id) {
            return Ok(transaction);
        }

        info!(
            "Node:{} admitted transaction {} (mempool size {})",
            self.identity.port,
            transaction.id,
            self.mempool.len() + 1
        );
        self.mempool.push(transaction.clone());
        Ok(transaction)
    }

    /// Fresh coinbase followed by the oldest pooled transactions
    pub fn select_block_transactions(&self, miner_address: &Address) -> Vec<Transaction> {
        let coinbase = Transaction::new_coinbase(
            self.identity.address.clone(),
            miner_address.clone(),
            self.params.reward,
        );

        std::iter::once(coinbase)
            .chain(
                self.mempool
                    .iter()
                    .take(self.params.max_block_transactions)
                    .cloned(),
            )
            .collect()
    }

    /// Builds the next block template on top of the current tip
    pub fn prepare_block(&self, miner_address: &Address) -> MiningJob {
        let tip = self.tip();
        let template = BlockTemplate::new(
            tip.height + 1,
            tip.hash_content(),
            self.params.bits,
            self.select_block_transactions(miner_address),
        );

        MiningJob {
            template,
            target: self.target.clone(),
        }
    }

    /// Appends a block mined locally from [`Node::prepare_block`]
    ///
    /// Fails with [`NodeError::StaleTip`] if the chain moved while searching.
    pub fn commit_mined_block(&mut self, block: Block) -> Result<Block, NodeError> {
        let current = self.tip().hash_content();
        if block.previous_hash != current {
            return Err(NodeError::StaleTip {
                expected: block.previous_hash,
                current,
            });
        }

        self.validator.check_block(self.tip(), &block)?;
        self.append(block.clone());

        info!(
            "Node:{} mined block {} with hash {}",
            self.identity.port, block.height, block.hash
        );
        Ok(block)
    }

    /// Builds, solves, appends and prunes in one step
    pub fn mine(&mut self, miner_address: &Address) -> Result<Block, NodeError> {
        let block = self.prepare_block(miner_address).solve()?;
        self.commit_mined_block(block)
    }

    /// Appends a block received from a peer if it extends the local tip
    pub fn accept_remote_block(&mut self, block: Block) -> Result<(), NodeError> {
        self.validator.check_block(self.tip(), &block)?;

        info!(
            "Node:{} chain updated with block {} ({})",
            self.identity.port, block.height, block.hash
        );
        self.append(block);
        Ok(())
    }

    /// Installs a fork-choice winner if it is still valid and strictly longer
    ///
    /// The candidate must grow from the same genesis block as the local chain.
    pub fn replace_chain(&mut self, chain: Vec<Block>) -> bool {
        if chain.len() <= self.chain.len() || !self.validator.validate(&chain) {
            return false;
        }

        if !shares_genesis(&chain, &self.chain) {
            warn!(
                "Node:{} refused a chain rooted at a different genesis",
                self.identity.port
            );
            return false;
        }

        let included: HashSet<&str> = chain.iter().flat_map(|block| block.transaction_ids()).collect();
        self.mempool
            .retain(|transaction| !included.contains(transaction.id.as_str()));

        info!(
            "Node:{} replaced its chain, new length {}",
            self.identity.port,
            chain.len()
        );
        self.chain = chain;
        true
    }

    /// Adopts a peer's pool wholesale after validating every entry
    pub fn replace_mempool(&mut self, transactions: Vec<Transaction>) -> Result<(), NodeError> {
        for transaction in &transactions {
            transaction.check()?;
        }

        info!(
            "Node:{} mempool replaced with {} transactions",
            self.identity.port,
            transactions.len()
        );
        self.mempool = transactions;
        Ok(())
    }

    fn append(&mut self, block: Block) {
        let included: HashSet<&str> = block.transaction_ids().collect();
        let before = self.mempool.len();
        self.mempool
            .retain(|transaction| !included.contains(transaction.id.as_str()));

        if before != self.mempool.len() {
            info!(
                "Node:{} mempool cleared of {} transactions",
                self.identity.port,
                before - self.mempool.len()
            );
        }
        self.chain.push(block);
    }
}

/// True iff both chains start with a block of the same content hash
pub fn shares_genesis(chain: &[Block], other: &[Block]) -> bool {
    match (chain.first(), other.first()) {
        (Some(genesis), Some(other_genesis)) => genesis.hash_content() == other_genesis.hash_content(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::target::MAX_TARGET_BITS;
    use crate::blockchain::transaction::{TransactionInput, TransactionOutput};

    fn params(max_block_transactions: usize) -> ConsensusParams {
        ConsensusParams {
            bits: MAX_TARGET_BITS,
            reward: Amount::ONE,
            max_block_transactions,
        }
    }

    fn node(port: u16) -> Node {
        Node::new(NodeIdentity::new(port), params(DEFAULT_MAX_BLOCK_TRANSACTIONS)).unwrap()
    }

    fn transfer(sender: &str, receiver: &str, sent: i64, received: i64) -> Transaction {
        Transaction::new(
            vec![TransactionInput {
                sender: Address::new(sender),
                amount: Amount::from(sent),
            }],
            vec![TransactionOutput {
                receiver: Address::new(receiver),
                amount: Amount::from(received),
            }],
        )
    }

    #[test]
    fn test_new_node() {
        let node = node(5001);

        assert_eq!(node.chain().len(), 1);
        assert_eq!(node.tip().height, 1);
        assert!(node.mempool().is_empty());
        assert!(node.validator().validate(node.chain()));
        assert_eq!(node.identity().address.0, "Node:5001");
        assert_eq!(node.identity().miner_address.0, "Miner:5001");
    }

    #[test]
    fn test_invalid_bits_are_rejected() {
        let mut invalid = params(1);
        invalid.bits = 0x1f80_0000;

        assert!(matches!(
            Node::new(NodeIdentity::new(5001), invalid),
            Err(NodeError::Target(TargetError::Negative(_)))
        ));
    }

    #[test]
    fn test_admit_transaction() {
        let mut node = node(5001);

        let admitted = node.admit_transaction(transfer("alice", "bob", 5, 5));
        assert!(admitted.is_ok());
        assert_eq!(node.mempool().len(), 1);

        let rejected = node.admit_transaction(transfer("alice", "bob", 5, 4));
        assert!(matches!(rejected, Err(NodeError::UnbalancedTransaction(_))));
        assert_eq!(node.mempool().len(), 1);
    }

    #[test]
    fn test_rejection_reason() {
        let mut node = node(5001);
        let err = node
            .admit_transaction(transfer("alice", "bob", 5, 4))
            .unwrap_err();

        assert!(err.to_string().starts_with("unbalanced transaction"));
    }

    #[test]
    fn test_duplicate_transaction_is_not_pooled_twice() {
        let mut node = node(5001);
        let transaction = transfer("alice", "bob", 5, 5);

        node.admit_transaction(transaction.clone()).unwrap();
        node.admit_transaction(transaction).unwrap();

        assert_eq!(node.mempool().len(), 1);
    }

    #[test]
    fn test_select_block_transactions_is_fifo() {
        let mut node = Node::new(NodeIdentity::new(5001), params(2)).unwrap();
        let first = node.admit_transaction(transfer("a", "b", 1, 1)).unwrap();
        let second = node.admit_transaction(transfer("c", "d", 2, 2)).unwrap();
        node.admit_transaction(transfer("e", "f", 3, 3)).unwrap();

        let miner = Address::new("Miner:5001");
        let selected = node.select_block_transactions(&miner);

        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].inputs[0].sender.0, "Node:5001");
        assert_eq!(selected[0].outputs[0].receiver, miner);
        assert_eq!(selected[0].outputs[0].amount, Amount::ONE);
        assert_eq!(selected[1].id, first.id);
        assert_eq!(selected[2].id, second.id);
    }

    #[test]
    fn test_mine_respects_block_limit_and_prunes() {
        let mut node = Node::new(NodeIdentity::new(5001), params(1)).unwrap();
        let tx1 = node.admit_transaction(transfer("alice", "bob", 5, 5)).unwrap();
        let tx2 = node.admit_transaction(transfer("carol", "dave", 3, 3)).unwrap();

        let miner = node.identity().miner_address.clone();
        let block = node.mine(&miner).unwrap();

        assert_eq!(block.height, 2);
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[0].outputs[0].receiver, miner);
        assert_eq!(block.transactions[1].id, tx1.id);
        assert_eq!(node.mempool(), &[tx2]);
        assert_eq!(node.chain().len(), 2);
    }

    #[test]
    fn test_mined_chain_stays_valid() {
        let mut node = node(5001);
        let miner = node.identity().miner_address.clone();

        for amount in 1..=3 {
            node.admit_transaction(transfer("alice", "bob", amount, amount))
                .unwrap();
            node.mine(&miner).unwrap();
        }

        assert_eq!(node.chain().len(), 4);
        assert!(node.validator().validate(node.chain()));
        assert!(node.mempool().is_empty());
    }

    #[test]
    fn test_stale_mined_block_is_discarded() {
        let mut node = node(5001);
        let miner = node.identity().miner_address.clone();

        let job = node.prepare_block(&miner);
        node.mine(&miner).unwrap();
        let stale = job.solve().unwrap();

        assert!(matches!(
            node.commit_mined_block(stale),
            Err(NodeError::StaleTip { .. })
        ));
        assert_eq!(node.chain().len(), 2);
    }

    #[test]
    fn test_accept_remote_block() {
        let mut miner_node = node(5001);
        let mut peer = node(5002);
        let transaction = transfer("alice", "bob", 5, 5);

        miner_node.admit_transaction(transaction.clone()).unwrap();
        peer.admit_transaction(transaction).unwrap();

        let miner = miner_node.identity().miner_address.clone();
        let block = miner_node.mine(&miner).unwrap();

        peer.accept_remote_block(block).unwrap();

        assert_eq!(peer.chain().len(), 2);
        assert!(peer.mempool().is_empty());
        assert!(peer.validator().validate(peer.chain()));
    }

    #[test]
    fn test_reject_remote_block_on_wrong_tip() {
        let mut miner_node = node(5001);
        let mut peer = node(5002);
        let miner = miner_node.identity().miner_address.clone();

        miner_node.mine(&miner).unwrap();
        let second = miner_node.mine(&miner).unwrap();

        let err = peer.accept_remote_block(second).unwrap_err();
        assert!(err.to_string().starts_with("invalid block"));
        assert_eq!(peer.chain().len(), 1);
    }

    #[test]
    fn test_reject_remote_block_with_forged_hash() {
        let mut miner_node = node(5001);
        let mut peer = node(5002);
        let miner = miner_node.identity().miner_address.clone();

        let mut block = miner_node.mine(&miner).unwrap();
        block.transactions[0].outputs[0].amount = Amount::ONE_HUNDRED;
        block.transactions[0].inputs[0].amount = Amount::ONE_HUNDRED;

        assert!(matches!(
            peer.accept_remote_block(block),
            Err(NodeError::InvalidBlock(ChainError::HashMismatch { height: 2 }))
        ));
        assert_eq!(peer.chain().len(), 1);
    }

    #[test]
    fn test_replace_chain_requires_longer_valid_chain() {
        let mut longer = node(5002);
        let miner = longer.identity().miner_address.clone();
        longer.mine(&miner).unwrap();
        longer.mine(&miner).unwrap();

        let mut local = node(5001);
        let pooled = local.admit_transaction(transfer("alice", "bob", 5, 5)).unwrap();

        let mut forged = longer.chain().to_vec();
        forged[2].nonce += 1;
        assert!(!local.replace_chain(forged));
        assert!(!local.replace_chain(local.chain().to_vec()));
        assert_eq!(local.chain().len(), 1);

        assert!(local.replace_chain(longer.chain().to_vec()));
        assert_eq!(local.chain().len(), 3);
        assert_eq!(local.mempool(), &[pooled]);
    }

    #[test]
    fn test_replace_chain_prunes_included_transactions() {
        let transaction = transfer("alice", "bob", 5, 5);

        let mut peer = node(5002);
        peer.admit_transaction(transaction.clone()).unwrap();
        let miner = peer.identity().miner_address.clone();
        peer.mine(&miner).unwrap();

        let mut local = node(5001);
        local.admit_transaction(transaction).unwrap();

        assert!(local.replace_chain(peer.chain().to_vec()));
        assert!(local.mempool().is_empty());
    }

    #[test]
    fn test_replace_chain_refuses_foreign_genesis() {
        let mut foreign = node(5002);
        foreign.chain[0].nonce += 1;
        let miner = foreign.identity().miner_address.clone();
        foreign.mine(&miner).unwrap();
        foreign.mine(&miner).unwrap();
        assert!(foreign.validator().validate(foreign.chain()));

        let mut local = node(5001);

        assert!(!shares_genesis(foreign.chain(), local.chain()));
        assert!(!local.replace_chain(foreign.chain().to_vec()));
        assert_eq!(local.chain().len(), 1);
    }

    #[test]
    fn test_replace_mempool() {
        let mut node = node(5001);
        node.admit_transaction(transfer("x", "y", 1, 1)).unwrap();

        let incoming = vec![transfer("alice", "bob", 5, 5), transfer("carol", "dave", 2, 2)];
        node.replace_mempool(incoming.clone()).unwrap();
        assert_eq!(node.mempool(), incoming.as_slice());

        let invalid = vec![transfer("alice", "bob", 5, 5), transfer("carol", "dave", 2, 1)];
        assert!(node.replace_mempool(invalid).is_err());
        assert_eq!(node.mempool(), incoming.as_slice());
    }

    #[test]
    fn test_snapshot() {
        let node = node(5001);
        let snapshot = node.snapshot();

        assert_eq!(snapshot.identity.port, 5001);
        assert_eq!(snapshot.length, 1);
        assert_eq!(snapshot.bits, MAX_TARGET_BITS);
        assert_eq!(snapshot.difficulty, 1.0);
    }
}
