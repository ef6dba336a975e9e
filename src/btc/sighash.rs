//! Taproot Signature Hash (BIP341)
//!
//! Builds the message a Taproot input signs. Key-path and script-path spends
//! share everything up to the spend type byte; a script-path digest appends
//! the leaf hash, key version and code separator position.
//!
//! The transaction model is `bitcoin::Transaction` plus the outputs being
//! spent, one per input.

use crate::btc::taptree::TapLeaf;
use crate::crypto::helpers::{sha256, tagged_hash};
use crate::error::{Error, Result};
use bitcoin::consensus::encode::serialize;
use bitcoin::{Transaction, TxOut};
use tracing::debug;

const TAP_SIGHASH_TAG: &str = "TapSighash";
const SIGHASH_EPOCH: u8 = 0x00;
const ANNEX_TAG: u8 = 0x50;
const KEY_VERSION_0: u8 = 0x00;
const NO_CODESEPARATOR: u32 = 0xffff_ffff;

/// Taproot hash types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SighashMode {
    /// 0x00: commits like `All` and is omitted from the signature.
    Default,
    All,
    None,
    Single,
    AllPlusAnyoneCanPay,
    NonePlusAnyoneCanPay,
    SinglePlusAnyoneCanPay,
}

impl SighashMode {
    pub const ALL_MODES: [SighashMode; 7] = [
        SighashMode::Default,
        SighashMode::All,
        SighashMode::None,
        SighashMode::Single,
        SighashMode::AllPlusAnyoneCanPay,
        SighashMode::NonePlusAnyoneCanPay,
        SighashMode::SinglePlusAnyoneCanPay,
    ];

    pub fn from_u8(byte: u8) -> Result<Self> {
        Ok(match byte {
            0x00 => SighashMode::Default,
            0x01 => SighashMode::All,
            0x02 => SighashMode::None,
            0x03 => SighashMode::Single,
            0x81 => SighashMode::AllPlusAnyoneCanPay,
            0x82 => SighashMode::NonePlusAnyoneCanPay,
            0x83 => SighashMode::SinglePlusAnyoneCanPay,
            other => return Err(Error::InvalidSighashType(other)),
        })
    }

    pub fn to_u8(self) -> u8 {
        match self {
            SighashMode::Default => 0x00,
            SighashMode::All => 0x01,
            SighashMode::None => 0x02,
            SighashMode::Single => 0x03,
            SighashMode::AllPlusAnyoneCanPay => 0x81,
            SighashMode::NonePlusAnyoneCanPay => 0x82,
            SighashMode::SinglePlusAnyoneCanPay => 0x83,
        }
    }

    pub fn anyone_can_pay(self) -> bool {
        self.to_u8() & 0x80 != 0
    }

    fn commits_all_outputs(self) -> bool {
        !matches!(self.to_u8() & 0x03, 0x02 | 0x03)
    }

    fn commits_single_output(self) -> bool {
        self.to_u8() & 0x03 == 0x03
    }
}

/// Which spend path the signature is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendPath {
    KeyPath,
    ScriptPath { leaf_hash: [u8; 32] },
}

impl SpendPath {
    pub fn for_leaf(leaf: &TapLeaf) -> Self {
        SpendPath::ScriptPath {
            leaf_hash: leaf.leaf_hash(),
        }
    }

    fn ext_flag(&self) -> u8 {
        match self {
            SpendPath::KeyPath => 0,
            SpendPath::ScriptPath { .. } => 1,
        }
    }
}

/// The digest to sign for input `input_index`.
pub fn signature_hash(
    tx: &Transaction,
    prevouts: &[TxOut],
    mode: SighashMode,
    input_index: usize,
    spend: &SpendPath,
) -> Result<[u8; 32]> {
    signature_hash_with_annex(tx, prevouts, mode, input_index, spend, None)
}

/// As [`signature_hash`], committing to an annex. The annex must include its
/// leading 0x50 byte.
pub fn signature_hash_with_annex(
    tx: &Transaction,
    prevouts: &[TxOut],
    mode: SighashMode,
    input_index: usize,
    spend: &SpendPath,
    annex: Option<&[u8]>,
) -> Result<[u8; 32]> {
    let message = sighash_message(tx, prevouts, mode, input_index, spend, annex)?;
    let digest = tagged_hash(TAP_SIGHASH_TAG, &message);
    debug!(
        input_index,
        hash_type = mode.to_u8(),
        script_path = spend.ext_flag() == 1,
        annex = annex.is_some(),
        sighash = %hex::encode(digest),
        "computed taproot sighash"
    );
    Ok(digest)
}

/// The full preimage hashed under "TapSighash", epoch byte included.
pub fn sighash_message(
    tx: &Transaction,
    prevouts: &[TxOut],
    mode: SighashMode,
    input_index: usize,
    spend: &SpendPath,
    annex: Option<&[u8]>,
) -> Result<Vec<u8>> {
    if input_index >= tx.input.len() {
        return Err(Error::InputIndexOutOfRange {
            index: input_index,
            inputs: tx.input.len(),
        });
    }
    if prevouts.len() != tx.input.len() {
        return Err(Error::PrevoutCountMismatch {
            inputs: tx.input.len(),
            prevouts: prevouts.len(),
        });
    }
    if let Some(annex) = annex {
        if annex.first() != Some(&ANNEX_TAG) {
            return Err(Error::InvalidAnnex);
        }
    }
    if mode.commits_single_output() && input_index >= tx.output.len() {
        return Err(Error::NoOutputForSingle(input_index));
    }

    let mut msg = Vec::with_capacity(256);
    msg.push(SIGHASH_EPOCH);

    // Control
    msg.push(mode.to_u8());
    msg.extend_from_slice(&tx.version.0.to_le_bytes());
    msg.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());

    // Transaction-wide data
    if !mode.anyone_can_pay() {
        let mut outpoints = Vec::new();
        let mut amounts = Vec::new();
        let mut script_pubkeys = Vec::new();
        let mut sequences = Vec::new();
        for (input, prevout) in tx.input.iter().zip(prevouts) {
            outpoints.extend_from_slice(&serialize(&input.previous_output));
            amounts.extend_from_slice(&prevout.value.to_sat().to_le_bytes());
            script_pubkeys.extend_from_slice(&serialize(&prevout.script_pubkey));
            sequences.extend_from_slice(&input.sequence.to_consensus_u32().to_le_bytes());
        }
        msg.extend_from_slice(&sha256(&outpoints));
        msg.extend_from_slice(&sha256(&amounts));
        msg.extend_from_slice(&sha256(&script_pubkeys));
        msg.extend_from_slice(&sha256(&sequences));
    }
    if mode.commits_all_outputs() {
        let mut outputs = Vec::new();
        for output in &tx.output {
            outputs.extend_from_slice(&serialize(output));
        }
        msg.extend_from_slice(&sha256(&outputs));
    }

    // Data about this input
    let spend_type = spend.ext_flag() * 2 + u8::from(annex.is_some());
    msg.push(spend_type);
    if mode.anyone_can_pay() {
        let input = &tx.input[input_index];
        let prevout = &prevouts[input_index];
        msg.extend_from_slice(&serialize(&input.previous_output));
        msg.extend_from_slice(&prevout.value.to_sat().to_le_bytes());
        msg.extend_from_slice(&serialize(&prevout.script_pubkey));
        msg.extend_from_slice(&input.sequence.to_consensus_u32().to_le_bytes());
    } else {
        let index = u32::try_from(input_index).map_err(|_| Error::InputIndexOutOfRange {
            index: input_index,
            inputs: tx.input.len(),
        })?;
        msg.extend_from_slice(&index.to_le_bytes());
    }
    if let Some(annex) = annex {
        msg.extend_from_slice(&sha256(&serialize(&annex.to_vec())));
    }

    // Data about this output
    if mode.commits_single_output() {
        msg.extend_from_slice(&sha256(&serialize(&tx.output[input_index])));
    }

    // Script path extension
    if let SpendPath::ScriptPath { leaf_hash } = spend {
        msg.extend_from_slice(leaf_hash);
        msg.push(KEY_VERSION_0);
        msg.extend_from_slice(&NO_CODESEPARATOR.to_le_bytes());
    }

    Ok(msg)
}
