use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use thiserror::Error;

/// Default compact target: roughly one hash in 65 536 qualifies
pub const DEFAULT_TARGET_BITS: u32 = 0x1f00ffff;

/// Easiest accepted target, defines difficulty 1
pub const MAX_TARGET_BITS: u32 = 0x2000ffff;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;
const HASH_BITS: u64 = 256;

/// Errors in a compact difficulty encoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("compact target {0:#010x} has the sign bit set")]
    Negative(u32),

    #[error("compact target {0:#010x} encodes zero")]
    Zero(u32),

    #[error("compact target {0:#010x} exceeds 256 bits")]
    Overflow(u32),

    #[error("hash is not a 256-bit hex digest: {0}")]
    MalformedHash(String),
}

/// Expands a compact `bits` encoding into the full threshold a hash must stay below
///
/// The high byte is a base-256 exponent and the low 23 bits are the mantissa,
/// so `target = mantissa * 256^(exponent - 3)`.
pub fn encode_target(bits: u32) -> Result<BigUint, TargetError> {
    if bits & SIGN_BIT != 0 {
        return Err(TargetError::Negative(bits));
    }

    let exponent = bits >> 24;
    let mantissa = BigUint::from(bits & MANTISSA_MASK);

    let target = if exponent <= 3 {
        mantissa >> (8 * (3 - exponent))
    } else {
        mantissa << (8 * (exponent - 3))
    };

    if target.is_zero() {
        return Err(TargetError::Zero(bits));
    }
    if target.bits() > HASH_BITS {
        return Err(TargetError::Overflow(bits));
    }

    Ok(target)
}

/// Relative difficulty of a target, `max_target / target`
///
/// Observational only, never used to validate.
pub fn difficulty(target: &BigUint) -> f64 {
    let max_target = match encode_target(MAX_TARGET_BITS) {
        Ok(max_target) => max_target,
        Err(_) => return 0.0,
    };

    match (max_target.to_f64(), target.to_f64()) {
        (Some(max), Some(current)) if current > 0.0 => max / current,
        _ => 0.0,
    }
}

/// Checks whether a hex digest, read as a big-endian integer, is below `target`
pub fn meets_target(hash: &str, target: &BigUint) -> Result<bool, TargetError> {
    let bytes = hex::decode(hash).map_err(|_| TargetError::MalformedHash(hash.to_string()))?;
    if bytes.len() != (HASH_BITS / 8) as usize {
        return Err(TargetError::MalformedHash(hash.to_string()));
    }

    Ok(BigUint::from_bytes_be(&bytes) < *target)
}
