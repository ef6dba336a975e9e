//! MuSig Nonces
//!
//! Each signer draws a fresh nonce k_i per session and publishes R_i = k_i*G.
//! The aggregate R = sum(R_i) is published in its even-Y form; if the raw sum
//! had odd Y every signer negates their own k_i, never R.
//!
//! [`SecretNonce`] is neither `Clone` nor `Copy` and signing consumes it, so a
//! nonce cannot be fed into two signatures.

use crate::error::{Error, Result};
use rand::{CryptoRng, RngCore};
use secp256kfun::prelude::*;
use tracing::debug;

/// A signer's one-time nonce. Never serialized, never reused.
pub struct SecretNonce {
    k: Scalar<Secret, NonZero>,
    public: Point,
}

impl SecretNonce {
    /// Draw a uniformly random nonce from the injected RNG.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let k = Scalar::random(rng);
        let public = g!(k * G).normalize();
        Self { k, public }
    }

    /// R_i, the value sent to the other participants.
    pub fn public(&self) -> Point {
        self.public
    }

    /// Consume the nonce, returning k_i adjusted to the aggregate parity.
    pub(crate) fn into_scalar(self, aggregate: &AggregateNonce) -> Scalar<Secret, NonZero> {
        if aggregate.negated {
            -self.k
        } else {
            self.k
        }
    }
}

impl std::fmt::Debug for SecretNonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretNonce")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// The session nonce R (even Y) and whether signers must negate k_i.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregateNonce {
    r: Point<EvenY>,
    negated: bool,
}

impl AggregateNonce {
    pub fn public(&self) -> Point<EvenY> {
        self.r
    }

    pub fn negated(&self) -> bool {
        self.negated
    }

    /// R_i as it enters the final signature: negated when R was.
    pub fn effective_nonce(&self, public_nonce: &Point) -> Point {
        if self.negated {
            -*public_nonce
        } else {
            *public_nonce
        }
    }
}

/// R = sum(R_i), normalized to even Y.
pub fn aggregate_nonces(public_nonces: &[Point]) -> Result<AggregateNonce> {
    if public_nonces.is_empty() {
        return Err(Error::MissingNonces {
            expected: 1,
            got: 0,
        });
    }

    let mut sum: Point<Normal, Public, Zero> = Point::zero();
    for nonce in public_nonces {
        let r_i = *nonce;
        sum = g!(sum + r_i).normalize();
    }
    let (r, negated) = sum
        .non_zero()
        .ok_or(Error::PointAtInfinity)?
        .into_point_with_even_y();

    debug!(
        nonces = public_nonces.len(),
        negated, "aggregated session nonce"
    );
    Ok(AggregateNonce { r, negated })
}
