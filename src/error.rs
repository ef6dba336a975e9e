//! Error Types
//!
//! Every fallible library operation returns [`Result`]. Variants fall into two
//! groups: domain errors (malformed scalars, points, encodings, tree inputs)
//! and protocol sequencing errors (a signing session driven out of order).
//!
//! Signature verification never produces an error. It answers `true` or
//! `false` and says nothing about which component was wrong.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // ------------------------------------------------------------------
    // Domain errors
    // ------------------------------------------------------------------
    #[error("scalar is not below the curve order")]
    InvalidScalar,

    #[error("scalar is zero")]
    ZeroScalar,

    #[error("operation produced the point at infinity")]
    PointAtInfinity,

    #[error("bytes do not encode a curve point")]
    InvalidPoint,

    #[error("expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("leaf version {0:#04x} is not a valid tapscript leaf version")]
    InvalidLeafVersion(u8),

    #[error("leaf weight must be positive")]
    ZeroWeight,

    #[error("leaf appears more than once in the tree")]
    DuplicateLeaf,

    #[error("public key appears more than once in the participant set")]
    DuplicateKey,

    #[error("key aggregation needs at least 2 participants, got {0}")]
    TooFewParticipants(usize),

    #[error("public key is not part of the aggregate key")]
    UnknownParticipant,

    #[error("sighash type {0:#04x} is not defined for taproot")]
    InvalidSighashType(u8),

    #[error("input index {index} out of range for {inputs} inputs")]
    InputIndexOutOfRange { index: usize, inputs: usize },

    #[error("SIGHASH_SINGLE input {0} has no matching output")]
    NoOutputForSingle(usize),

    #[error("transaction has {inputs} inputs but {prevouts} spent outputs were given")]
    PrevoutCountMismatch { inputs: usize, prevouts: usize },

    #[error("annex must start with 0x50")]
    InvalidAnnex,

    #[error("malformed control block: {0}")]
    InvalidControlBlock(String),

    #[error("threshold {threshold} is not within 1..={keys}")]
    InvalidThreshold { threshold: usize, keys: usize },

    // ------------------------------------------------------------------
    // Protocol sequencing errors
    // ------------------------------------------------------------------
    #[error("session is in stage {actual}, expected {expected}")]
    OutOfOrder {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("nonce was already used for a signature")]
    NonceReused,

    #[error("no nonce has been generated for this signer")]
    NonceMissing,

    #[error("a nonce is already committed for this session")]
    NonceAlreadyCommitted,

    #[error("collected {got} of {expected} public nonces")]
    MissingNonces { expected: usize, got: usize },

    #[error("collected {got} of {expected} partial signatures")]
    MissingPartialSignatures { expected: usize, got: usize },
}
