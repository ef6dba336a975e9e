//! Key Tweaking
//!
//! A tweak `t` moves a key pair from (x, P) to (x + t, P + t*G) while keeping
//! it spendable. Two policies produce `t`:
//!
//! - **raw**: `t` is derived from the committed data alone. This is forgeable:
//!   whoever holds `x` can pick any other data `c'` and solve for an `x'` that
//!   lands on the same output key. [`forge_raw_commitment`] does exactly that.
//! - **pay-to-contract**: `t = H_TapTweak(P || data)`. Because `P` sits both
//!   inside and outside the hash, producing a second (P', data') pair for the
//!   same output key requires solving the discrete log.

use crate::crypto::helpers::{scalar_from_hash, sha256, tagged_hash_parts};
use crate::crypto::keypair::KeyPair;
use crate::error::{Error, Result};
use secp256kfun::prelude::*;
use tracing::trace;

const TAP_TWEAK_TAG: &str = "TapTweak";

/// A tweak scalar together with its point T = t*G.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tweak {
    scalar: Scalar<Public, NonZero>,
    point: Point,
}

impl Tweak {
    pub fn new(scalar: Scalar<Public, NonZero>) -> Self {
        let point = g!(scalar * G).normalize();
        Self { scalar, point }
    }

    /// Parse a 32-byte tweak. Zero and values not below n are rejected.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        Ok(Self::new(scalar_from_hash(bytes)?))
    }

    pub fn scalar(&self) -> Scalar<Public, NonZero> {
        self.scalar
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.scalar.to_bytes()
    }

    /// P' = P + t*G. Fails if the result is the point at infinity.
    pub fn tweak_add(&self, point: &Point) -> Result<Point> {
        let p = *point;
        let t = self.point;
        g!(p + t)
            .normalize()
            .non_zero()
            .ok_or(Error::PointAtInfinity)
    }

    /// x' = x + t mod n. Fails if the result is zero.
    pub fn tweak_private(
        &self,
        secret: Scalar<Secret, NonZero>,
    ) -> Result<Scalar<Secret, NonZero>> {
        let t = self.scalar;
        s!(secret + t).non_zero().ok_or(Error::ZeroScalar)
    }
}

// ============================================================================
// Free-function forms
// ============================================================================

/// P + t*G.
pub fn tweak_add(point: &Point, tweak: &Tweak) -> Result<Point> {
    tweak.tweak_add(point)
}

/// x + t mod n.
pub fn tweak_private(
    secret: Scalar<Secret, NonZero>,
    tweak: &Tweak,
) -> Result<Scalar<Secret, NonZero>> {
    tweak.tweak_private(secret)
}

// ============================================================================
// Pay-to-contract (committed) policy
// ============================================================================

/// t = H_TapTweak(x(P) || data), rejected if it is zero or not below n.
pub fn commit(internal_key: &Point<EvenY>, data: &[u8]) -> Result<Tweak> {
    let hash = tagged_hash_parts(TAP_TWEAK_TAG, &[&internal_key.to_xonly_bytes(), data]);
    let tweak = Tweak::from_bytes(hash)?;
    trace!(tweak = %hex::encode(tweak.to_bytes()), "derived TapTweak");
    Ok(tweak)
}

/// Taproot output tweak for an optional script tree root.
///
/// With no root the tweak commits to the internal key alone (BIP86 style).
pub fn tap_tweak(internal_key: &Point<EvenY>, merkle_root: Option<&[u8; 32]>) -> Result<Tweak> {
    match merkle_root {
        Some(root) => commit(internal_key, root),
        None => commit(internal_key, &[]),
    }
}

/// Does `output_key` equal `internal_key + H_TapTweak(internal_key || data)*G`?
pub fn verify_contract_commitment(
    internal_key: &Point<EvenY>,
    data: &[u8],
    output_key: &Point,
) -> bool {
    let p = internal_key.normalize();
    match commit(internal_key, data).and_then(|t| t.tweak_add(&p)) {
        Ok(expected) => expected == *output_key,
        Err(_) => false,
    }
}

// ============================================================================
// Raw (insecure) policy
// ============================================================================

/// t = SHA256(data). Does not bind the tweak to the key it is added to.
pub fn raw_tweak(data: &[u8]) -> Result<Tweak> {
    Tweak::from_bytes(sha256(data))
}

/// Does `output_key` equal `internal_key + t*G`?
pub fn verify_raw_commitment(internal_key: &Point, tweak: &Tweak, output_key: &Point) -> bool {
    match tweak.tweak_add(internal_key) {
        Ok(expected) => expected == *output_key,
        Err(_) => false,
    }
}

/// Re-open a raw commitment to different data.
///
/// Given the original internal key pair (x, P) committed with `c`, returns
/// (x', P') with x' = x - c' + c, so that P' + c'*G == P + c*G. Anyone holding
/// `x` can do this for any `c'`, which is why raw tweaks are not commitments.
pub fn forge_raw_commitment(
    original: &KeyPair,
    original_tweak: &Tweak,
    alternate_tweak: &Tweak,
) -> Result<KeyPair> {
    let x = original.secret_key();
    let c = original_tweak.scalar();
    let c_alt = alternate_tweak.scalar();
    let forged = s!(x - c_alt + c).non_zero().ok_or(Error::ZeroScalar)?;
    Ok(KeyPair::new(forged))
}
