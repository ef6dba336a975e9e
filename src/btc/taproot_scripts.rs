//! Taproot Leaf Scripts
//!
//! Builders for common tapscript spending conditions, and a
//! [`SpendingCondition`] type that lowers a condition to weighted leaves and
//! commits them to an internal key:
//! - Pay to key
//! - Timelocks (absolute CLTV and relative CSV)
//! - Recovery scripts (fallback after timeout)
//! - HTLC (Hash Time-Locked Contracts)
//! - k-of-n multisig with OP_CHECKSIGADD

use crate::btc::taptree::{TapLeaf, TapTree};
use crate::error::{Error, Result};
use bitcoin::opcodes::all::*;
use bitcoin::script::Builder;
use bitcoin::ScriptBuf;
use secp256kfun::prelude::*;

/// Script: <pubkey> OP_CHECKSIG
pub fn p2pk_script(pubkey: &Point<EvenY>) -> ScriptBuf {
    Builder::new()
        .push_slice(pubkey.to_xonly_bytes())
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// Script: <height> OP_CLTV OP_DROP <pubkey> OP_CHECKSIG
pub fn cltv_script(lock_height: u32, pubkey: &Point<EvenY>) -> ScriptBuf {
    Builder::new()
        .push_int(i64::from(lock_height))
        .push_opcode(OP_CLTV)
        .push_opcode(OP_DROP)
        .push_slice(pubkey.to_xonly_bytes())
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// Script: <blocks> OP_CSV OP_DROP <pubkey> OP_CHECKSIG
pub fn csv_script(blocks: u16, pubkey: &Point<EvenY>) -> ScriptBuf {
    Builder::new()
        .push_int(i64::from(blocks))
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_slice(pubkey.to_xonly_bytes())
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// Script: OP_SHA256 <hash> OP_EQUALVERIFY <pubkey> OP_CHECKSIG
pub fn hashlock_script(hash: &[u8; 32], pubkey: &Point<EvenY>) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_SHA256)
        .push_slice(hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_slice(pubkey.to_xonly_bytes())
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// k-of-n multisig.
///
/// Script: <pk_1> OP_CHECKSIG <pk_2> OP_CHECKSIGADD ... <pk_n> OP_CHECKSIGADD <k> OP_NUMEQUAL
pub fn multisig_script(threshold: usize, pubkeys: &[Point<EvenY>]) -> Result<ScriptBuf> {
    if threshold == 0 || threshold > pubkeys.len() {
        return Err(Error::InvalidThreshold {
            threshold,
            keys: pubkeys.len(),
        });
    }

    let mut builder = Builder::new();
    for (i, pubkey) in pubkeys.iter().enumerate() {
        builder = builder.push_slice(pubkey.to_xonly_bytes());
        builder = if i == 0 {
            builder.push_opcode(OP_CHECKSIG)
        } else {
            builder.push_opcode(OP_CHECKSIGADD)
        };
    }
    Ok(builder
        .push_int(threshold as i64)
        .push_opcode(OP_NUMEQUAL)
        .into_script())
}

/// Script configuration for spending conditions
#[derive(Clone, Debug)]
pub enum SpendingCondition {
    /// No script - key path only
    KeyPathOnly,

    /// Funds can only be spent after block height
    TimelockAbsolute {
        lock_height: u32,
        recipient: Point<EvenY>,
    },

    /// Funds can only be spent N blocks after UTXO confirmation
    TimelockRelative {
        blocks: u16,
        recipient: Point<EvenY>,
    },

    /// Primary owner can spend anytime, recovery key can spend after timeout
    Recovery {
        owner: Point<EvenY>,
        recovery: Point<EvenY>,
        timeout_height: u32,
    },

    /// Recipient can claim with preimage, sender can refund after timeout
    Htlc {
        hash: [u8; 32],
        recipient: Point<EvenY>,
        refund: Point<EvenY>,
        timeout_height: u32,
    },

    /// k-of-n signers in a single leaf
    Multisig {
        threshold: usize,
        signers: Vec<Point<EvenY>>,
    },
}

impl SpendingCondition {
    /// Weighted leaves for this condition.
    ///
    /// Paths expected to be used more often get the larger weight.
    pub fn leaves(&self) -> Result<Vec<(u32, TapLeaf)>> {
        Ok(match self {
            SpendingCondition::KeyPathOnly => vec![],
            SpendingCondition::TimelockAbsolute {
                lock_height,
                recipient,
            } => vec![(1, TapLeaf::new(cltv_script(*lock_height, recipient)))],
            SpendingCondition::TimelockRelative { blocks, recipient } => {
                vec![(1, TapLeaf::new(csv_script(*blocks, recipient)))]
            }
            SpendingCondition::Recovery {
                owner,
                recovery,
                timeout_height,
            } => vec![
                (3, TapLeaf::new(p2pk_script(owner))),
                (1, TapLeaf::new(cltv_script(*timeout_height, recovery))),
            ],
            SpendingCondition::Htlc {
                hash,
                recipient,
                refund,
                timeout_height,
            } => vec![
                (3, TapLeaf::new(hashlock_script(hash, recipient))),
                (1, TapLeaf::new(cltv_script(*timeout_height, refund))),
            ],
            SpendingCondition::Multisig { threshold, signers } => {
                vec![(1, TapLeaf::new(multisig_script(*threshold, signers)?))]
            }
        })
    }

    /// Commit this condition's leaves to `internal_key`.
    pub fn build_tree(&self, internal_key: Point<EvenY>) -> Result<TapTree> {
        TapTree::construct(internal_key, self.leaves()?)
    }
}
