//! BIP341 sighash tests against rust-bitcoin's SighashCache

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{schnorr, Message, Secp256k1, XOnlyPublicKey};
use bitcoin::sighash::{Annex, Prevouts, SighashCache, TapSighashType};
use bitcoin::taproot::{LeafVersion, TapLeafHash};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tapcommit::btc::sighash::{signature_hash, signature_hash_with_annex, SighashMode, SpendPath};
use tapcommit::btc::taproot_scripts::p2pk_script;
use tapcommit::btc::taptree::{TapLeaf, TapTree};
use tapcommit::crypto::keypair::KeyPair;
use tapcommit::crypto::schnorr as bip340;

/// Three inputs with distinct sequences spending three taproot outputs.
fn spend_fixture() -> (Transaction, Vec<TxOut>) {
    let input = (0..3u8)
        .map(|i| TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([0x10 + i; 32]), u32::from(i)),
            script_sig: ScriptBuf::new(),
            sequence: Sequence(0xffff_fffd - u32::from(i)),
            witness: Witness::new(),
        })
        .collect();
    let output = (0..3u8)
        .map(|i| TxOut {
            value: Amount::from_sat(20_000 + u64::from(i) * 1_000),
            script_pubkey: ScriptBuf::from_bytes([vec![0x51, 0x20], vec![0xd0 + i; 32]].concat()),
        })
        .collect();
    let prevouts = (0..3u8)
        .map(|i| TxOut {
            value: Amount::from_sat(40_000 + u64::from(i)),
            script_pubkey: ScriptBuf::from_bytes([vec![0x51, 0x20], vec![0xa0 + i; 32]].concat()),
        })
        .collect();
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::from_consensus(800_000),
        input,
        output,
    };
    (tx, prevouts)
}

fn btc_type(mode: SighashMode) -> TapSighashType {
    TapSighashType::from_consensus_u8(mode.to_u8()).unwrap()
}

#[test]
fn test_key_path_matches_rust_bitcoin_for_every_type() {
    let (tx, prevouts) = spend_fixture();
    let mut cache = SighashCache::new(&tx);

    for mode in SighashMode::ALL_MODES {
        for index in 0..tx.input.len() {
            let ours = signature_hash(&tx, &prevouts, mode, index, &SpendPath::KeyPath).unwrap();
            let theirs = cache
                .taproot_key_spend_signature_hash(index, &Prevouts::All(&prevouts), btc_type(mode))
                .unwrap();
            assert_eq!(ours, theirs.to_byte_array(), "{:?} input {}", mode, index);
        }
    }
}

#[test]
fn test_script_path_matches_rust_bitcoin_for_every_type() {
    let (tx, prevouts) = spend_fixture();
    let mut cache = SighashCache::new(&tx);
    let script = ScriptBuf::from_bytes(vec![0x51]);
    let leaf = TapLeaf::new(script.clone());
    let leaf_hash = TapLeafHash::from_script(&script, LeafVersion::TapScript);
    assert_eq!(leaf.leaf_hash(), leaf_hash.to_byte_array());

    for mode in SighashMode::ALL_MODES {
        for index in 0..tx.input.len() {
            let ours = signature_hash(&tx, &prevouts, mode, index, &SpendPath::for_leaf(&leaf))
                .unwrap();
            let theirs = cache
                .taproot_script_spend_signature_hash(
                    index,
                    &Prevouts::All(&prevouts),
                    leaf_hash,
                    btc_type(mode),
                )
                .unwrap();
            assert_eq!(ours, theirs.to_byte_array(), "{:?} input {}", mode, index);
        }
    }
}

#[test]
fn test_annex_matches_rust_bitcoin() {
    let (tx, prevouts) = spend_fixture();
    let mut cache = SighashCache::new(&tx);
    let annex = [0x50u8, 0xde, 0xad, 0xbe, 0xef];

    for mode in [SighashMode::Default, SighashMode::SinglePlusAnyoneCanPay] {
        let ours = signature_hash_with_annex(
            &tx,
            &prevouts,
            mode,
            1,
            &SpendPath::KeyPath,
            Some(&annex[..]),
        )
        .unwrap();
        let theirs = cache
            .taproot_signature_hash(
                1,
                &Prevouts::All(&prevouts),
                Some(Annex::new(&annex).unwrap()),
                None,
                btc_type(mode),
            )
            .unwrap();
        assert_eq!(ours, theirs.to_byte_array());
    }
}

#[test]
fn test_anyone_can_pay_ignores_other_inputs() {
    let (tx, prevouts) = spend_fixture();
    let mut altered = tx.clone();
    altered.input[0].sequence = Sequence::MAX;
    let mut altered_prevouts = prevouts.clone();
    altered_prevouts[2].value = Amount::from_sat(1);

    let path = SpendPath::KeyPath;
    let acp = SighashMode::AllPlusAnyoneCanPay;
    assert_eq!(
        signature_hash(&tx, &prevouts, acp, 1, &path).unwrap(),
        signature_hash(&altered, &altered_prevouts, acp, 1, &path).unwrap()
    );
    assert_ne!(
        signature_hash(&tx, &prevouts, SighashMode::All, 1, &path).unwrap(),
        signature_hash(&altered, &altered_prevouts, SighashMode::All, 1, &path).unwrap()
    );
}

#[test]
fn test_sign_both_paths_of_a_tree_output() {
    let secp = Secp256k1::verification_only();
    let mut rng = ChaCha20Rng::seed_from_u64(4001);
    let internal = KeyPair::generate(&mut rng).normalize();
    let leaf_key = KeyPair::generate(&mut rng).normalize();
    let leaf_pk = leaf_key.x_only_public_key();
    let leaf = TapLeaf::new(p2pk_script(&leaf_pk));
    let tree = TapTree::construct(internal.x_only_public_key(), vec![(1, leaf.clone())]).unwrap();

    let (tx, mut prevouts) = spend_fixture();
    prevouts[0].script_pubkey = tree.script_pubkey();

    let output_kp = internal.tweak_add(&tree.tweak().unwrap()).unwrap();
    assert_eq!(output_kp.x_only_public_key(), tree.output_key());

    let cases = [
        (SpendPath::KeyPath, output_kp, tree.output_key()),
        (SpendPath::for_leaf(&leaf), leaf_key, leaf_pk),
    ];
    for (path, signer, verify_key) in cases {
        let digest = signature_hash(&tx, &prevouts, SighashMode::Default, 0, &path).unwrap();
        let sig = bip340::sign(&signer, &digest, &[7u8; 32]).unwrap();
        assert!(bip340::verify(&verify_key, &digest, &sig));

        let pk = XOnlyPublicKey::from_slice(&verify_key.to_xonly_bytes()).unwrap();
        let sig = schnorr::Signature::from_slice(&sig.to_bytes()).unwrap();
        assert!(secp
            .verify_schnorr(&sig, &Message::from_digest(digest), &pk)
            .is_ok());
    }
}
