//! MuSig Signing Sessions
//!
//! The protocol moves through five stages:
//!
//! ```text
//! KeysCollected -> Aggregated -> NoncesExchanged -> PartialSigsCollected -> Complete
//! ```
//!
//! [`MuSigSession`] is the coordinator's view: it aggregates keys, collects
//! public nonces and partial signatures, and produces the final signature.
//! [`Signer`] is one participant's view: it owns a secret key and at most one
//! live nonce. Both reject calls made out of order before touching any secret.
//!
//! The transport between participants is left to the caller.

use crate::crypto::keypair::KeyPair;
use crate::crypto::schnorr::{self, Signature};
use crate::crypto::tweak::Tweak;
use crate::error::{Error, Result};
use crate::musig::key_agg::{generate_musig_key, MuSigKey};
use crate::musig::nonce::{aggregate_nonces, AggregateNonce, SecretNonce};
use rand::{CryptoRng, RngCore};
use secp256kfun::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

// ============================================================================
// Partial Signatures
// ============================================================================

/// s_i = k_i + e * c_i * x_i from one participant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PartialSignature {
    signer: Point,
    s: Scalar<Public, Zero>,
}

impl PartialSignature {
    pub fn new(signer: Point, s: Scalar<Public, Zero>) -> Self {
        Self { signer, s }
    }

    pub fn signer(&self) -> Point {
        self.signer
    }

    pub fn scalar(&self) -> Scalar<Public, Zero> {
        self.s
    }
}

/// Produce one participant's partial signature.
///
/// Takes the nonce by value: it is spent whether or not signing succeeds.
pub fn sign_musig(
    key: &MuSigKey,
    secret_key: Scalar<Secret, NonZero>,
    nonce: SecretNonce,
    aggregate_nonce: &AggregateNonce,
    message: &[u8],
) -> Result<PartialSignature> {
    let signer = g!(secret_key * G).normalize();
    let x = key.signing_key(secret_key)?;
    let k = nonce.into_scalar(aggregate_nonce);
    let e = schnorr::challenge(&aggregate_nonce.public(), &key.agg_public_key(), message);
    let s = s!(k + e * x).public();
    Ok(PartialSignature { signer, s })
}

/// Check s_i * G == R_i' + e * c_i * P_i' for one participant.
///
/// R_i' and P_i' are the nonce and key after parity adjustment.
pub fn verify_partial_signature(
    key: &MuSigKey,
    aggregate_nonce: &AggregateNonce,
    message: &[u8],
    public_nonce: &Point,
    partial: &PartialSignature,
) -> bool {
    let p = match key.effective_public_key(&partial.signer) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let r = aggregate_nonce.effective_nonce(public_nonce);
    let e = schnorr::challenge(&aggregate_nonce.public(), &key.agg_public_key(), message);
    let s = partial.s;

    let lhs = g!(s * G).normalize();
    let rhs = g!(r + e * p).normalize();
    lhs == rhs
}

/// s = sum(s_i) + e * t, paired with x(R).
///
/// The tweak correction e * t is added once, not per signer. Every
/// participant must contribute exactly one partial signature.
pub fn aggregate_musig_signatures(
    key: &MuSigKey,
    aggregate_nonce: &AggregateNonce,
    message: &[u8],
    partials: &[PartialSignature],
) -> Result<Signature> {
    let expected = key.participants().len();
    if partials.len() != expected {
        return Err(Error::MissingPartialSignatures {
            expected,
            got: partials.len(),
        });
    }

    let mut seen = Vec::with_capacity(partials.len());
    let mut s_sum: Scalar<Public, Zero> = Scalar::zero();
    for partial in partials {
        key.coefficient(&partial.signer)?;
        let encoded = partial.signer.to_bytes();
        if seen.contains(&encoded) {
            return Err(Error::DuplicateKey);
        }
        seen.push(encoded);

        let s_i = partial.s;
        s_sum = s!(s_sum + s_i).public();
    }

    let r = aggregate_nonce.public();
    let e = schnorr::challenge(&r, &key.agg_public_key(), message);
    let t = key.tweak();
    let s = s!(s_sum + e * t).public();

    Ok(Signature { r, s })
}

// ============================================================================
// Signing Context
// ============================================================================

/// Everything a signer needs after nonce exchange.
#[derive(Clone, Debug)]
pub struct SigningContext {
    key: MuSigKey,
    aggregate_nonce: AggregateNonce,
    public_nonces: BTreeMap<[u8; 33], Point>,
    message: Vec<u8>,
}

impl SigningContext {
    pub fn key(&self) -> &MuSigKey {
        &self.key
    }

    pub fn aggregate_nonce(&self) -> &AggregateNonce {
        &self.aggregate_nonce
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    pub fn public_nonce(&self, signer: &Point) -> Option<Point> {
        self.public_nonces.get(&signer.to_bytes()).copied()
    }
}

// ============================================================================
// Signer
// ============================================================================

enum NonceSlot {
    Empty,
    Committed(SecretNonce),
    Spent,
}

/// One participant: a secret key and at most one live nonce.
pub struct Signer {
    keypair: KeyPair,
    nonce: NonceSlot,
}

impl Signer {
    pub fn new(keypair: KeyPair) -> Self {
        Self {
            keypair,
            nonce: NonceSlot::Empty,
        }
    }

    pub fn public_key(&self) -> Point {
        self.keypair.public_key()
    }

    /// Draw a fresh nonce and return R_i for broadcast.
    pub fn commit_nonce(&mut self, rng: &mut (impl RngCore + CryptoRng)) -> Result<Point> {
        if matches!(self.nonce, NonceSlot::Committed(_)) {
            return Err(Error::NonceAlreadyCommitted);
        }
        let nonce = SecretNonce::generate(rng);
        let public = nonce.public();
        self.nonce = NonceSlot::Committed(nonce);
        Ok(public)
    }

    /// Sign with the committed nonce, spending it.
    pub fn sign(&mut self, context: &SigningContext) -> Result<PartialSignature> {
        let public_key = self.keypair.public_key();
        context.key.coefficient(&public_key)?;

        match std::mem::replace(&mut self.nonce, NonceSlot::Spent) {
            NonceSlot::Committed(nonce) => {
                if context.public_nonce(&public_key) != Some(nonce.public()) {
                    // The context was built without our nonce. Burn it anyway.
                    return Err(Error::NonceMissing);
                }
                sign_musig(
                    &context.key,
                    self.keypair.secret_key(),
                    nonce,
                    &context.aggregate_nonce,
                    &context.message,
                )
            }
            NonceSlot::Empty => {
                self.nonce = NonceSlot::Empty;
                Err(Error::NonceMissing)
            }
            NonceSlot::Spent => Err(Error::NonceReused),
        }
    }
}

// ============================================================================
// Coordinator Session
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    KeysCollected,
    Aggregated,
    NoncesExchanged,
    PartialSigsCollected,
    Complete,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::KeysCollected => "KeysCollected",
            Stage::Aggregated => "Aggregated",
            Stage::NoncesExchanged => "NoncesExchanged",
            Stage::PartialSigsCollected => "PartialSigsCollected",
            Stage::Complete => "Complete",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Coordinator state for one signing session over one message.
#[derive(Debug)]
pub struct MuSigSession {
    stage: Stage,
    public_keys: Vec<Point>,
    message: Vec<u8>,
    key: Option<MuSigKey>,
    public_nonces: BTreeMap<[u8; 33], Point>,
    aggregate_nonce: Option<AggregateNonce>,
    partials: BTreeMap<[u8; 33], PartialSignature>,
    signature: Option<Signature>,
}

impl MuSigSession {
    pub fn new(public_keys: Vec<Point>, message: impl Into<Vec<u8>>) -> Self {
        Self {
            stage: Stage::KeysCollected,
            public_keys,
            message: message.into(),
            key: None,
            public_nonces: BTreeMap::new(),
            aggregate_nonce: None,
            partials: BTreeMap::new(),
            signature: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    pub fn key(&self) -> Option<&MuSigKey> {
        self.key.as_ref()
    }

    pub fn aggregate_nonce(&self) -> Option<&AggregateNonce> {
        self.aggregate_nonce.as_ref()
    }

    fn expect_stage(&self, expected: Stage) -> Result<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(Error::OutOfOrder {
                expected: expected.name(),
                actual: self.stage.name(),
            })
        }
    }

    fn musig_key(&self) -> Result<&MuSigKey> {
        self.key.as_ref().ok_or(Error::OutOfOrder {
            expected: Stage::Aggregated.name(),
            actual: self.stage.name(),
        })
    }

    /// KeysCollected -> Aggregated.
    pub fn aggregate_keys(&mut self) -> Result<&MuSigKey> {
        self.expect_stage(Stage::KeysCollected)?;
        let key = generate_musig_key(&self.public_keys)?;
        self.stage = Stage::Aggregated;
        Ok(self.key.insert(key))
    }

    /// Tweak the aggregate key. Only allowed before any nonce arrives.
    pub fn tweak(&mut self, tweak: &Tweak) -> Result<&MuSigKey> {
        self.expect_stage(Stage::Aggregated)?;
        if !self.public_nonces.is_empty() {
            return Err(Error::NonceAlreadyCommitted);
        }
        let tweaked = self.musig_key()?.tweak_add(tweak)?;
        Ok(self.key.insert(tweaked))
    }

    /// Commit the aggregate key to a script tree root.
    pub fn tap_tweak(&mut self, merkle_root: Option<&[u8; 32]>) -> Result<&MuSigKey> {
        self.expect_stage(Stage::Aggregated)?;
        if !self.public_nonces.is_empty() {
            return Err(Error::NonceAlreadyCommitted);
        }
        let tweaked = self.musig_key()?.tap_tweak(merkle_root)?;
        Ok(self.key.insert(tweaked))
    }

    /// Record R_i. Moves to NoncesExchanged once every participant is in.
    pub fn add_nonce(&mut self, signer: Point, public_nonce: Point) -> Result<Stage> {
        self.expect_stage(Stage::Aggregated)?;
        let key = self.musig_key()?;
        key.coefficient(&signer)?;
        let expected = key.participants().len();

        let slot = signer.to_bytes();
        if self.public_nonces.contains_key(&slot) {
            return Err(Error::NonceAlreadyCommitted);
        }

        // The last nonce is only recorded once the aggregate is known to be valid
        if self.public_nonces.len() + 1 == expected {
            let mut nonces: Vec<Point> = self.public_nonces.values().copied().collect();
            nonces.push(public_nonce);
            let aggregate = aggregate_nonces(&nonces)?;
            self.public_nonces.insert(slot, public_nonce);
            self.aggregate_nonce = Some(aggregate);
            self.stage = Stage::NoncesExchanged;
            debug!(participants = expected, "all nonces exchanged");
        } else {
            self.public_nonces.insert(slot, public_nonce);
        }
        Ok(self.stage)
    }

    /// The data each signer needs to produce a partial signature.
    pub fn signing_context(&self) -> Result<SigningContext> {
        self.expect_stage(Stage::NoncesExchanged)?;
        let aggregate_nonce = self.aggregate_nonce.ok_or(Error::MissingNonces {
            expected: self.public_keys.len(),
            got: self.public_nonces.len(),
        })?;
        Ok(SigningContext {
            key: self.musig_key()?.clone(),
            aggregate_nonce,
            public_nonces: self.public_nonces.clone(),
            message: self.message.clone(),
        })
    }

    /// Record s_i. Moves to PartialSigsCollected once every participant is in.
    pub fn add_partial_signature(&mut self, partial: PartialSignature) -> Result<Stage> {
        self.expect_stage(Stage::NoncesExchanged)?;
        let key = self.musig_key()?;
        key.coefficient(&partial.signer)?;
        let expected = key.participants().len();

        let slot = partial.signer.to_bytes();
        if self.partials.contains_key(&slot) {
            return Err(Error::DuplicateKey);
        }
        self.partials.insert(slot, partial);

        if self.partials.len() == expected {
            self.stage = Stage::PartialSigsCollected;
        }
        Ok(self.stage)
    }

    /// Check one collected partial signature against its signer's nonce.
    pub fn verify_partial(&self, signer: &Point) -> bool {
        let (Some(key), Some(agg)) = (self.key.as_ref(), self.aggregate_nonce.as_ref()) else {
            return false;
        };
        let slot = signer.to_bytes();
        match (self.public_nonces.get(&slot), self.partials.get(&slot)) {
            (Some(r_i), Some(partial)) => {
                verify_partial_signature(key, agg, &self.message, r_i, partial)
            }
            _ => false,
        }
    }

    /// PartialSigsCollected -> Complete.
    pub fn finalize(&mut self) -> Result<Signature> {
        self.expect_stage(Stage::PartialSigsCollected)?;
        let key = self.musig_key()?;
        let aggregate_nonce = self.aggregate_nonce.ok_or(Error::MissingNonces {
            expected: self.public_keys.len(),
            got: self.public_nonces.len(),
        })?;
        let partials: Vec<PartialSignature> = self.partials.values().copied().collect();
        let signature =
            aggregate_musig_signatures(key, &aggregate_nonce, &self.message, &partials)?;

        info!(
            agg_key = %hex::encode(key.agg_public_key().to_xonly_bytes()),
            "MuSig signature aggregated"
        );
        self.signature = Some(signature);
        self.stage = Stage::Complete;
        Ok(signature)
    }

    /// Does the final signature verify against the aggregate key?
    pub fn verify(&self) -> bool {
        match (self.signature.as_ref(), self.key.as_ref()) {
            (Some(signature), Some(key)) => {
                schnorr::verify(&key.agg_public_key(), &self.message, signature)
            }
            _ => false,
        }
    }
}
