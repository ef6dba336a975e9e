//! Cryptographic Primitives
//!
//! This module provides the curve-level building blocks shared by MuSig and
//! TapTree:
//!
//! - **helpers**: tagged hash, hash-to-scalar, hex codecs
//! - **keypair**: scalar/point pairs and even-Y normalization
//! - **schnorr**: BIP340 single-signer signing and verification
//! - **tweak**: raw and pay-to-contract key tweaking

pub mod helpers;
pub mod keypair;
pub mod schnorr;
pub mod tweak;
