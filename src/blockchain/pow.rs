use log::debug;
use num_bigint::BigUint;
use serde_json::Value;

use super::block::{hash_value, BlockTemplate, INITIAL_NONCE};
use super::target::{meets_target, TargetError};

/// Result of a successful proof-of-work search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub hash: String,
    pub nonce: u64,
}

/// Searches for the first nonce whose block hash is below `target`
///
/// Candidates start at [`INITIAL_NONCE`] and increase by one. The search has
/// no iteration bound and touches no shared state, so the same template
/// always yields the same solution.
pub fn search(template: &BlockTemplate, target: &BigUint) -> Result<Solution, TargetError> {
    let mut content = template.content(INITIAL_NONCE);
    let mut nonce = INITIAL_NONCE;

    loop {
        content["nonce"] = Value::from(nonce);
        let hash = hash_value(&content);

        if meets_target(&hash, target)? {
            debug!(
                "Found nonce {} for block {} after {} attempts",
                nonce,
                template.height,
                nonce - INITIAL_NONCE + 1
            );
            return Ok(Solution { hash, nonce });
        }

        nonce = nonce.wrapping_add(1);
    }
}
