//! Proof-of-work header verification.
//!
//! Mining (constructing and iterating a nonce to find a block that meets a
//! target) is out of scope for this node; only verification of an already-
//! mined header's `bits`/`nonce` pair against its hash is implemented, since
//! `BlockHeader` carries those fields regardless.
//!
//! `bits` is the standard Bitcoin "compact" target representation: the top
//! byte is an exponent, the remaining three bytes are the mantissa.

use crate::codec::Hash256;

/// Expands a compact `bits` value into a 256-bit target, as an array of 32
/// big-endian bytes (MSB first), matching `Hash256`'s comparison order.
pub fn target_from_bits(bits: u32) -> [u8; 32] {
    let exponent = (bits >> 24) as u32;
    let mantissa = bits & 0x007f_ffff;
    let mut target = [0u8; 32];

    if exponent <= 3 {
        let mantissa = mantissa >> (8 * (3 - exponent));
        target[29..32].copy_from_slice(&mantissa.to_be_bytes()[1..4]);
    } else {
        let shift = exponent as usize - 3;
        if shift < 32 {
            let bytes = mantissa.to_be_bytes();
            let start = 32usize.saturating_sub(shift + 3);
            for (i, b) in bytes[1..4].iter().enumerate() {
                let idx = start + i;
                if idx < 32 {
                    target[idx] = *b;
                }
            }
        }
    }
    target
}

/// Returns `true` if a block header's hash (big-endian byte order, matching
/// [`Hash256::as_be_bytes`]) is numerically less than or equal to the target
/// implied by `bits`.
pub fn hash_meets_target(hash: &Hash256, bits: u32) -> bool {
    let target = target_from_bits(bits);
    hash.as_be_bytes() <= target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mantissa_never_met() {
        let target = target_from_bits(0x00000000);
        assert_eq!(target, [0u8; 32]);
    }

    #[test]
    fn max_target_accepts_any_hash() {
        // exponent 32, full mantissa -> target fills the high bytes with 0x7f/0xff
        let target = target_from_bits(0x207fffff);
        assert_ne!(target, [0u8; 32]);
    }
}
