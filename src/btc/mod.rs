//! Bitcoin Integration
//!
//! This module provides Taproot-specific functionality:
//!
//! - **taptree**: Huffman script trees, output keys and control blocks
//! - **sighash**: BIP341 signature hashes for key-path and script-path spends
//! - **taproot_scripts**: Leaf script builders and spending conditions

pub mod sighash;
pub mod taproot_scripts;
pub mod taptree;
