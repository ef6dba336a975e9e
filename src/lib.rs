//! Taproot commitments: key tweaking, MuSig, Huffman script trees and
//! BIP341 signature hashes.

pub mod btc;
pub mod commands;
pub mod crypto;
pub mod error;
pub mod musig;

pub use error::{Error, Result};

/// Result from a command, separating educational output from copy-paste result
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Educational output with explanations
    pub output: String,
    /// Clean JSON result for copy-pasting
    pub result: String,
}
