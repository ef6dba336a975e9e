//! MuSig Key Aggregation
//!
//! Keys are sorted by their 33-byte compressed encoding, so every permutation
//! of the same participant set aggregates to the same key. With
//! L = H_list(P_1 || ... || P_n) each key gets a challenge factor
//! c_i = H_coeff(L || P_i) and the aggregate is Q = sum(c_i * P_i).
//!
//! The aggregate is kept in its even-Y form. `needs_negation` records whether
//! signers must negate their challenge-scaled secret keys to match it, and
//! `tweak` accumulates any tweaks applied afterwards (for example a TapTree
//! root). The invariant is Q = (-1)^needs_negation * sum(c_i * P_i) + tweak * G.

use crate::crypto::helpers::{scalar_from_hash, tagged_hash, tagged_hash_parts};
use crate::crypto::tweak::{self, Tweak};
use crate::error::{Error, Result};
use secp256kfun::prelude::*;
use tracing::debug;

const KEYAGG_LIST_TAG: &str = "KeyAgg list";
const KEYAGG_COEFF_TAG: &str = "KeyAgg coefficient";

#[derive(Clone, Debug)]
pub struct MuSigKey {
    /// Participants, sorted by compressed encoding.
    participants: Vec<Point>,
    /// Challenge factor of each participant, same order.
    coefficients: Vec<Scalar<Public, NonZero>>,
    key_list_hash: [u8; 32],
    agg_key: Point<EvenY>,
    tweak: Scalar<Public, Zero>,
    needs_negation: bool,
}

/// Aggregate two or more public keys into a MuSig key.
///
/// Duplicate keys are rejected.
pub fn generate_musig_key(public_keys: &[Point]) -> Result<MuSigKey> {
    if public_keys.len() < 2 {
        return Err(Error::TooFewParticipants(public_keys.len()));
    }

    let mut participants = public_keys.to_vec();
    participants.sort_by_key(|p| p.to_bytes());
    if participants.windows(2).any(|w| w[0] == w[1]) {
        return Err(Error::DuplicateKey);
    }

    let key_list_hash = key_list_hash(&participants);
    let coefficients = participants
        .iter()
        .map(|p| challenge_factor(&key_list_hash, p))
        .collect::<Result<Vec<_>>>()?;

    let mut sum: Point<Normal, Public, Zero> = Point::zero();
    for (c, p) in coefficients.iter().zip(participants.iter()) {
        let (c, p) = (*c, *p);
        sum = g!(sum + c * p).normalize();
    }
    let (agg_key, needs_negation) = sum
        .non_zero()
        .ok_or(Error::PointAtInfinity)?
        .into_point_with_even_y();

    debug!(
        participants = participants.len(),
        agg_key = %hex::encode(agg_key.to_xonly_bytes()),
        needs_negation,
        "aggregated MuSig key"
    );

    Ok(MuSigKey {
        participants,
        coefficients,
        key_list_hash,
        agg_key,
        tweak: Scalar::zero(),
        needs_negation,
    })
}

/// L = H_list(P_1 || ... || P_n) over 33-byte compressed keys.
pub fn key_list_hash(sorted_keys: &[Point]) -> [u8; 32] {
    let mut serialized = Vec::with_capacity(sorted_keys.len() * 33);
    for key in sorted_keys {
        serialized.extend_from_slice(&key.to_bytes());
    }
    tagged_hash(KEYAGG_LIST_TAG, &serialized)
}

/// c_i = H_coeff(L || P_i).
pub fn challenge_factor(key_list_hash: &[u8; 32], key: &Point) -> Result<Scalar<Public, NonZero>> {
    let hash = tagged_hash_parts(KEYAGG_COEFF_TAG, &[key_list_hash, &key.to_bytes()]);
    scalar_from_hash(hash)
}

impl MuSigKey {
    /// The x-only aggregate key signatures verify against.
    pub fn agg_public_key(&self) -> Point<EvenY> {
        self.agg_key
    }

    pub fn participants(&self) -> &[Point] {
        &self.participants
    }

    pub fn key_list_hash(&self) -> [u8; 32] {
        self.key_list_hash
    }

    /// Accumulated tweak, already sign-adjusted for the current parity.
    pub fn tweak(&self) -> Scalar<Public, Zero> {
        self.tweak
    }

    pub fn needs_negation(&self) -> bool {
        self.needs_negation
    }

    pub fn is_tweaked(&self) -> bool {
        self.tweak.to_bytes() != [0u8; 32]
    }

    /// The challenge factor for one participant.
    pub fn coefficient(&self, public_key: &Point) -> Result<Scalar<Public, NonZero>> {
        self.participants
            .iter()
            .position(|p| p == public_key)
            .map(|i| self.coefficients[i])
            .ok_or(Error::UnknownParticipant)
    }

    /// A participant's effective public key: +/- c_i * P_i.
    pub fn effective_public_key(&self, public_key: &Point) -> Result<Point> {
        let c = self.coefficient(public_key)?;
        let p = *public_key;
        let scaled = g!(c * p).normalize();
        Ok(if self.needs_negation { -scaled } else { scaled })
    }

    /// A participant's effective secret key: +/- c_i * x_i.
    ///
    /// This is the only secret a signer needs for a partial signature.
    pub fn signing_key(
        &self,
        secret_key: Scalar<Secret, NonZero>,
    ) -> Result<Scalar<Secret, NonZero>> {
        let public_key = g!(secret_key * G).normalize();
        let c = self.coefficient(&public_key)?;
        let scaled = s!(c * secret_key);
        Ok(if self.needs_negation { -scaled } else { scaled })
    }

    /// Add `t*G` to the aggregate key, keeping the even-Y representative.
    pub fn tweak_add(&self, tweak: &Tweak) -> Result<Self> {
        let q = tweak.tweak_add(&self.agg_key.normalize())?;
        let (agg_key, flipped) = q.into_point_with_even_y();

        let t = tweak.scalar();
        let previous = self.tweak;
        let accumulated = s!(previous + t).public();
        let accumulated = if flipped {
            s!(-accumulated).public()
        } else {
            accumulated
        };

        debug!(
            agg_key = %hex::encode(agg_key.to_xonly_bytes()),
            flipped,
            "tweaked MuSig key"
        );

        Ok(Self {
            participants: self.participants.clone(),
            coefficients: self.coefficients.clone(),
            key_list_hash: self.key_list_hash,
            agg_key,
            tweak: accumulated,
            needs_negation: self.needs_negation ^ flipped,
        })
    }

    /// Commit the aggregate key to a script tree root (or to nothing).
    pub fn tap_tweak(&self, merkle_root: Option<&[u8; 32]>) -> Result<Self> {
        let t = tweak::tap_tweak(&self.agg_key, merkle_root)?;
        self.tweak_add(&t)
    }
}
