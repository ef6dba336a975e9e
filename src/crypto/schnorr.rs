//! Bitcoin Schnorr Signatures (BIP340)
//!
//! Single-signer BIP340 signing and verification. MuSig aggregate signatures
//! and tweaked-key signatures are checked with [`verify`] as well: an
//! aggregate signature is indistinguishable from a single-signer one.
//!
//! BIP340 specifies:
//! - 32-byte x-only public keys (even Y coordinate assumed)
//! - Tagged hashing for domain separation
//! - Deterministic nonces using aux randomness
//!
//! References:
//! - BIP340: https://github.com/bitcoin/bips/blob/master/bip-0340.mediawiki

use crate::crypto::helpers::{scalar_from_hash_mod_order, tagged_hash, tagged_hash_parts};
use crate::crypto::keypair::KeyPair;
use crate::error::{Error, Result};
use secp256kfun::prelude::*;

const CHALLENGE_TAG: &str = "BIP0340/challenge";
const AUX_TAG: &str = "BIP0340/aux";
const NONCE_TAG: &str = "BIP0340/nonce";

/// A 64-byte BIP340 signature: x(R) || s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Signature {
    pub r: Point<EvenY>,
    pub s: Scalar<Public, Zero>,
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r.to_xonly_bytes());
        bytes[32..].copy_from_slice(&self.s.to_bytes());
        bytes
    }

    /// Parse a signature. R must be a valid x coordinate and s must be below n.
    pub fn from_bytes(bytes: [u8; 64]) -> Result<Self> {
        let mut r_bytes = [0u8; 32];
        let mut s_bytes = [0u8; 32];
        r_bytes.copy_from_slice(&bytes[..32]);
        s_bytes.copy_from_slice(&bytes[32..]);

        let r = Point::<EvenY>::from_xonly_bytes(r_bytes).ok_or(Error::InvalidPoint)?;
        let s = Scalar::<Public, Zero>::from_bytes(s_bytes).ok_or(Error::InvalidScalar)?;
        Ok(Self { r, s })
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; 64] = slice.try_into().map_err(|_| Error::InvalidLength {
            expected: 64,
            got: slice.len(),
        })?;
        Self::from_bytes(bytes)
    }
}

/// BIP340 challenge e = H_challenge(R || P || m) mod n.
pub fn challenge(
    r: &Point<EvenY>,
    public_key: &Point<EvenY>,
    message: &[u8],
) -> Scalar<Public, Zero> {
    let hash = tagged_hash_parts(
        CHALLENGE_TAG,
        &[&r.to_xonly_bytes(), &public_key.to_xonly_bytes(), message],
    );
    scalar_from_hash_mod_order(hash)
}

/// Sign `message` with BIP340.
///
/// The key pair is normalized to even Y first, so any key pair (including a
/// freshly tweaked one) can be passed directly.
pub fn sign(keypair: &KeyPair, message: &[u8], aux_rand: &[u8; 32]) -> Result<Signature> {
    let keypair = keypair.clone().normalize();
    let secret = keypair.secret_key();
    let public_key = keypair.x_only_public_key();

    // t = bytes(d) XOR H_aux(a)
    let aux_hashed = tagged_hash(AUX_TAG, aux_rand);
    let mut masked_secret = secret.to_bytes();
    for (byte, mask) in masked_secret.iter_mut().zip(aux_hashed.iter()) {
        *byte ^= mask;
    }

    // k' = H_nonce(t || P || m) mod n
    let k_bytes = tagged_hash_parts(
        NONCE_TAG,
        &[&masked_secret, &public_key.to_xonly_bytes(), message],
    );
    let k = Scalar::<Secret, Zero>::from_bytes_mod_order(k_bytes)
        .non_zero()
        .ok_or(Error::ZeroScalar)?;

    // Ensure R has even Y (negate k if needed)
    let nonce = KeyPair::new(k).normalize();
    let k = nonce.secret_key();
    let r = nonce.x_only_public_key();

    let e = challenge(&r, &public_key, message);
    let s = s!(k + e * secret).public();

    Ok(Signature { r, s })
}

/// Verify a BIP340 signature: s * G == R + e * P.
pub fn verify(public_key: &Point<EvenY>, message: &[u8], signature: &Signature) -> bool {
    let r = signature.r;
    let s = signature.s;
    let p = *public_key;
    let e = challenge(&r, &p, message);

    let lhs = g!(s * G).normalize();
    let rhs = g!(r + e * p).normalize();
    lhs == rhs
}
