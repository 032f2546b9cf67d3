//! Peer ledger
//!
//! A minimal multi-node proof-of-work ledger. Each node mines its own blocks,
//! keeps a pool of pending transactions and replicates both to a fixed set of
//! peers over HTTP, settling divergent chains by the longest valid chain rule.
//!
//! - `blockchain/`: transactions, blocks, difficulty targets, proof-of-work,
//!   chain validation and per-node state
//! - `network/`: peer transport, broadcasts and fork choice
//! - `api/`: the actix-web routes served by every node
//! - `config`: environment-driven node settings

pub mod api;
pub mod blockchain;
pub mod config;
pub mod network;
