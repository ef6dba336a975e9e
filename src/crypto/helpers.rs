//! Cryptographic Helper Functions
//!
//! Shared utilities used by the tweak, MuSig and TapTree code.
//!
//! ## Functions
//!
//! - **Tagged hash**: BIP340-style domain separated hashing
//! - **Hash to scalar**: strict (tweaks, coefficients) and mod-order (challenges)
//! - **Hex codecs**: parse scalars and points from user input

use crate::error::{Error, Result};
use secp256kfun::prelude::*;
use sha2::{Digest, Sha256};

// ============================================================================
// Tagged Hash (BIP340)
// ============================================================================

/// Compute BIP340 tagged hash: SHA256(SHA256(tag) || SHA256(tag) || data)
///
/// # Tags used in this crate
/// - "TapTweak" for pay-to-contract key tweaking
/// - "TapLeaf" / "TapBranch" for script tree hashing
/// - "TapSighash" for taproot signature hashes
/// - "BIP0340/challenge", "BIP0340/aux", "BIP0340/nonce" for Schnorr
/// - "KeyAgg list" / "KeyAgg coefficient" for MuSig key aggregation
pub fn tagged_hash(tag: &str, data: &[u8]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    hasher.update(data);
    hasher.finalize().into()
}

/// Tagged hash over several byte strings, concatenated in order.
pub fn tagged_hash_parts(tag: &str, parts: &[&[u8]]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Plain single SHA256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

// ============================================================================
// Hash to Scalar
// ============================================================================

/// Interpret a 32-byte digest as a scalar without reducing it.
///
/// Digests that are zero or not below the group order are rejected. Tweaks and
/// key aggregation coefficients go through here, never through a wrap-around.
pub fn scalar_from_hash(hash: [u8; 32]) -> Result<Scalar<Public, NonZero>> {
    Scalar::<Public, Zero>::from_bytes(hash)
        .ok_or(Error::InvalidScalar)?
        .non_zero()
        .ok_or(Error::ZeroScalar)
}

/// Interpret a 32-byte digest as a scalar reduced mod n (BIP340 challenges).
pub fn scalar_from_hash_mod_order(hash: [u8; 32]) -> Scalar<Public, Zero> {
    Scalar::<Public, Zero>::from_bytes_mod_order(hash)
}

// ============================================================================
// Hex Codecs
// ============================================================================

/// Decode a hex string into exactly `N` bytes.
pub fn decode_hex_array<const N: usize>(hex_str: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(hex_str.trim()).map_err(|e| Error::InvalidHex(e.to_string()))?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| Error::InvalidLength { expected: N, got })
}

/// Parse a 32-byte secret key. Zero and values not below n are rejected.
pub fn parse_secret_key(hex_str: &str) -> Result<Scalar<Secret, NonZero>> {
    let bytes: [u8; 32] = decode_hex_array(hex_str)?;
    Scalar::<Secret, Zero>::from_bytes(bytes)
        .ok_or(Error::InvalidScalar)?
        .non_zero()
        .ok_or(Error::ZeroScalar)
}

/// Parse a 32-byte x-only public key (even Y implied).
pub fn parse_xonly(hex_str: &str) -> Result<Point<EvenY>> {
    let bytes: [u8; 32] = decode_hex_array(hex_str)?;
    Point::<EvenY>::from_xonly_bytes(bytes).ok_or(Error::InvalidPoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_separate_domains() {
        let data = b"same payload";
        assert_eq!(tagged_hash("TapLeaf", data), tagged_hash("TapLeaf", data));
        assert_ne!(tagged_hash("TapLeaf", data), tagged_hash("TapBranch", data));
        assert_ne!(tagged_hash("TapLeaf", data), sha256(data));
    }

    #[test]
    fn test_tagged_hash_matches_manual_construction() {
        let tag = sha256(b"TapLeaf");
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&tag);
        preimage.extend_from_slice(&tag);
        preimage.extend_from_slice(b"abc");
        assert_eq!(tagged_hash("TapLeaf", b"abc"), sha256(&preimage));
    }

    #[test]
    fn test_tagged_hash_parts_is_concatenation() {
        assert_eq!(
            tagged_hash_parts("TapBranch", &[b"left", b"right"]),
            tagged_hash("TapBranch", b"leftright")
        );
    }

    #[test]
    fn test_scalar_from_hash_rejects_zero_and_overflow() {
        assert_eq!(scalar_from_hash([0u8; 32]).unwrap_err(), Error::ZeroScalar);
        assert_eq!(
            scalar_from_hash([0xff; 32]).unwrap_err(),
            Error::InvalidScalar
        );

        let mut one = [0u8; 32];
        one[31] = 1;
        assert!(scalar_from_hash(one).is_ok());
    }

    #[test]
    fn test_mod_order_reduction_wraps() {
        // 0xff..ff mod n is a valid (nonzero) scalar
        let reduced = scalar_from_hash_mod_order([0xff; 32]);
        assert_ne!(reduced.to_bytes(), [0xff; 32]);
    }

    #[test]
    fn test_decode_hex_array_length() {
        let err = decode_hex_array::<32>("00ff").unwrap_err();
        assert_eq!(
            err,
            Error::InvalidLength {
                expected: 32,
                got: 2
            }
        );
        assert!(matches!(
            decode_hex_array::<2>("zz"),
            Err(Error::InvalidHex(_))
        ));
    }

    #[test]
    fn test_parse_xonly_generator() {
        let g_hex = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
        let point = parse_xonly(g_hex).unwrap();
        assert_eq!(hex::encode(point.to_xonly_bytes()), g_hex);
    }

    #[test]
    fn test_parse_secret_key_rejects_zero() {
        let zero = "0000000000000000000000000000000000000000000000000000000000000000";
        assert_eq!(parse_secret_key(zero).unwrap_err(), Error::ZeroScalar);
    }
}
