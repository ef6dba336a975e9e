//! MuSig n-of-n Schnorr signatures
//!
//! - `key_agg`: sorted, coefficient-weighted key aggregation and tweaking
//! - `nonce`: one-time signer nonces and their aggregation
//! - `session`: partial signing, aggregation and the staged coordinator

pub mod key_agg;
pub mod nonce;
pub mod session;

pub use key_agg::{generate_musig_key, MuSigKey};
pub use nonce::{aggregate_nonces, AggregateNonce, SecretNonce};
pub use session::{
    aggregate_musig_signatures, sign_musig, verify_partial_signature, MuSigSession,
    PartialSignature, Signer, SigningContext, Stage,
};
