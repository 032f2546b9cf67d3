use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::blockchain::node::DEFAULT_MAX_BLOCK_TRANSACTIONS;
use crate::blockchain::target::{encode_target, DEFAULT_TARGET_BITS};
use crate::blockchain::{Amount, ConsensusParams};
use crate::network::Peer;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5001;
const DEFAULT_PEERS: &str = "5001,5002,5003";
const DEFAULT_PEER_HOST: &str = "127.0.0.1";
const DEFAULT_PEER_TIMEOUT_SECS: u64 = 5;

/// Errors in the node configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid TARGET_BITS: {0}")]
    InvalidTarget(#[from] crate::blockchain::target::TargetError),
}

/// Settings for one node process
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub peers: Vec<Peer>,
    pub consensus: ConsensusParams,
    pub peer_timeout: Duration,
}

impl NodeConfig {
    /// Reads the configuration from the environment, after loading `.env` if present
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("NODE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(&lookup, "NODE_PORT", DEFAULT_PORT)?;
        let peer_host = lookup("PEER_HOST").unwrap_or_else(|| DEFAULT_PEER_HOST.to_string());
        let peers = parse_peers(
            &lookup("NODE_PEERS").unwrap_or_else(|| DEFAULT_PEERS.to_string()),
            &peer_host,
            port,
        )?;

        let bits = match lookup("TARGET_BITS") {
            Some(value) => parse_bits(&value)?,
            None => DEFAULT_TARGET_BITS,
        };
        encode_target(bits)?;

        let reward = parse_or(&lookup, "BLOCK_REWARD", Amount::ONE)?;
        if reward.is_sign_negative() && !reward.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "BLOCK_REWARD",
                value: reward.to_string(),
            });
        }

        let consensus = ConsensusParams {
            bits,
            reward,
            max_block_transactions: parse_or(&lookup, "MAX_BLOCK_TRANSACTIONS", DEFAULT_MAX_BLOCK_TRANSACTIONS)?,
        };

        let peer_timeout = Duration::from_secs(parse_or(&lookup, "PEER_TIMEOUT_SECS", DEFAULT_PEER_TIMEOUT_SECS)?);

        Ok(NodeConfig {
            host,
            port,
            peers,
            consensus,
            peer_timeout,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

fn parse_bits(value: &str) -> Result<u32, ConfigError> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };

    parsed.map_err(|_| ConfigError::InvalidValue {
        name: "TARGET_BITS",
        value: value.to_string(),
    })
}

/// Entries are bare ports on `peer_host` or full URLs; the node's own port is dropped
fn parse_peers(value: &str, peer_host: &str, own_port: u16) -> Result<Vec<Peer>, ConfigError> {
    let own_url = format!("http://{}:{}", peer_host, own_port);
    let mut peers = Vec::new();

    for entry in value.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let peer = if entry.contains("://") {
            Peer::new(entry)
        } else {
            let port: u16 = entry.parse().map_err(|_| ConfigError::InvalidValue {
                name: "NODE_PEERS",
                value: entry.to_string(),
            })?;
            if port == own_port {
                continue;
            }
            Peer::new(format!("http://{}:{}", peer_host, port))
        };

        if peer.url != own_url && !peers.contains(&peer) {
            peers.push(peer);
        }
    }

    Ok(peers)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<NodeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5001);
        assert_eq!(
            config.peers,
            vec![Peer::new("http://127.0.0.1:5002"), Peer::new("http://127.0.0.1:5003")]
        );
        assert_eq!(config.consensus, ConsensusParams::default());
        assert_eq!(config.peer_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_own_port_is_excluded() {
        let config = config(&[("NODE_PORT", "5002")]).unwrap();

        assert_eq!(
            config.peers,
            vec![Peer::new("http://127.0.0.1:5001"), Peer::new("http://127.0.0.1:5003")]
        );
    }

    #[test]
    fn test_peer_urls_and_ports_mix() {
        let config = config(&[
            ("NODE_PEERS", "http://10.0.0.2:6000/, 5004 ,,http://127.0.0.1:5001"),
        ])
        .unwrap();

        assert_eq!(
            config.peers,
            vec![Peer::new("http://10.0.0.2:6000"), Peer::new("http://127.0.0.1:5004")]
        );
    }

    #[test]
    fn test_consensus_overrides() {
        let config = config(&[
            ("TARGET_BITS", "0x2000ffff"),
            ("BLOCK_REWARD", "2.5"),
            ("MAX_BLOCK_TRANSACTIONS", "1"),
        ])
        .unwrap();

        assert_eq!(config.consensus.bits, 0x2000ffff);
        assert_eq!(config.consensus.reward, Amount::new(25, 1));
        assert_eq!(config.consensus.max_block_transactions, 1);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("NODE_PORT", "not-a-port")]),
            Err(ConfigError::InvalidValue { name: "NODE_PORT", .. })
        ));
        assert!(matches!(
            config(&[("NODE_PEERS", "5002,abc")]),
            Err(ConfigError::InvalidValue { name: "NODE_PEERS", .. })
        ));
        assert!(matches!(
            config(&[("TARGET_BITS", "0x1f800000")]),
            Err(ConfigError::InvalidTarget(_))
        ));
        assert!(matches!(
            config(&[("BLOCK_REWARD", "-5")]),
            Err(ConfigError::InvalidValue { name: "BLOCK_REWARD", .. })
        ));
    }

    #[test]
    fn test_zero_reward_is_allowed() {
        let config = config(&[("BLOCK_REWARD", "0")]).unwrap();

        assert_eq!(config.consensus.reward, Amount::ZERO);
    }
}
