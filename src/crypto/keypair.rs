//! Key Pairs
//!
//! A [`KeyPair`] couples a secret scalar with its public point. Every
//! operation that changes one side changes the other in the same step, so the
//! pair never drifts out of sync.
//!
//! BIP340 keys are x-only: the Y coordinate is implied to be even. When a
//! point has odd Y the matching scalar must be negated. That rule lives in
//! exactly one place, [`KeyPair::normalize`].

use crate::crypto::tweak::Tweak;
use crate::error::{Error, Result};
use rand::{CryptoRng, RngCore};
use secp256kfun::prelude::*;

#[derive(Clone, Debug)]
pub struct KeyPair {
    secret: Scalar<Secret, NonZero>,
    public: Point,
}

impl KeyPair {
    /// Build a key pair from a secret scalar. P = x * G.
    pub fn new(secret: Scalar<Secret, NonZero>) -> Self {
        let public = g!(secret * G).normalize();
        Self { secret, public }
    }

    /// Generate a fresh random key pair from the injected RNG.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self::new(Scalar::random(rng))
    }

    /// Parse a 32-byte big-endian secret key.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        let secret = Scalar::<Secret, Zero>::from_bytes(bytes)
            .ok_or(Error::InvalidScalar)?
            .non_zero()
            .ok_or(Error::ZeroScalar)?;
        Ok(Self::new(secret))
    }

    pub fn secret_key(&self) -> Scalar<Secret, NonZero> {
        self.secret
    }

    pub fn public_key(&self) -> Point {
        self.public
    }

    pub fn is_y_even(&self) -> bool {
        self.public.is_y_even()
    }

    /// The 32-byte x-only encoding of the public key.
    pub fn x_only_public_key(&self) -> Point<EvenY> {
        self.public.into_point_with_even_y().0
    }

    /// Negate both halves: (-x, -P).
    pub fn negate(self) -> Self {
        Self {
            secret: -self.secret,
            public: -self.public,
        }
    }

    /// Return the representative with even Y, negating the scalar if needed.
    ///
    /// Applied after every aggregation or tweak whose output is consumed as an
    /// x-only key.
    pub fn normalize(self) -> Self {
        if self.public.is_y_even() {
            self
        } else {
            self.negate()
        }
    }

    /// Tweak both halves: (x + t, P + t*G).
    pub fn tweak_add(&self, tweak: &Tweak) -> Result<Self> {
        let secret = tweak.tweak_private(self.secret)?;
        let public = tweak.tweak_add(&self.public)?;
        Ok(Self { secret, public })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_normalize_yields_even_y() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        for _ in 0..16 {
            let kp = KeyPair::generate(&mut rng).normalize();
            let x = kp.secret_key();
            assert!(kp.is_y_even());
            assert_eq!(g!(x * G).normalize(), kp.public_key());
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let kp = KeyPair::generate(&mut rng).normalize();
        let again = kp.clone().normalize();
        assert_eq!(kp.secret_key().to_bytes(), again.secret_key().to_bytes());
    }

    #[test]
    fn test_negate_keeps_x_coordinate() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let kp = KeyPair::generate(&mut rng);
        let neg = kp.clone().negate();
        assert_eq!(
            kp.x_only_public_key().to_xonly_bytes(),
            neg.x_only_public_key().to_xonly_bytes()
        );
        assert_ne!(kp.is_y_even(), neg.is_y_even());
    }

    #[test]
    fn test_from_bytes_rejects_overflow() {
        assert_eq!(
            KeyPair::from_bytes([0xff; 32]).unwrap_err(),
            Error::InvalidScalar
        );
        assert_eq!(KeyPair::from_bytes([0; 32]).unwrap_err(), Error::ZeroScalar);
    }
}
