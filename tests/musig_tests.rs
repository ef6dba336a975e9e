//! Integration tests for MuSig key aggregation and signing

use bitcoin::secp256k1::{schnorr, Message, Secp256k1, XOnlyPublicKey};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use secp256kfun::prelude::*;
use tapcommit::btc::taproot_scripts::p2pk_script;
use tapcommit::btc::taptree::{TapLeaf, TapTree};
use tapcommit::crypto::keypair::KeyPair;
use tapcommit::crypto::schnorr::{self as bip340, Signature};
use tapcommit::musig::{
    aggregate_musig_signatures, aggregate_nonces, generate_musig_key, sign_musig,
    verify_partial_signature, MuSigKey, MuSigSession, PartialSignature, SecretNonce, Signer,
    Stage,
};
use tapcommit::Error;

fn libsecp_verify(pk: &Point<EvenY>, msg: [u8; 32], sig: &Signature) -> bool {
    let secp = Secp256k1::verification_only();
    let pk = XOnlyPublicKey::from_slice(&pk.to_xonly_bytes()).unwrap();
    let sig = schnorr::Signature::from_slice(&sig.to_bytes()).unwrap();
    secp.verify_schnorr(&sig, &Message::from_digest(msg), &pk).is_ok()
}

/// Drive the stateless API end to end and return the signature.
fn sign_with(key: &MuSigKey, keypairs: &[KeyPair], msg: &[u8], rng: &mut ChaCha20Rng) -> Signature {
    let nonces: Vec<SecretNonce> = keypairs
        .iter()
        .map(|_| SecretNonce::generate(&mut *rng))
        .collect();
    let publics: Vec<Point> = nonces.iter().map(|n| n.public()).collect();
    let agg = aggregate_nonces(&publics).unwrap();

    let partials: Vec<PartialSignature> = keypairs
        .iter()
        .zip(nonces)
        .map(|(kp, nonce)| sign_musig(key, kp.secret_key(), nonce, &agg, msg).unwrap())
        .collect();
    for (partial, r_i) in partials.iter().zip(&publics) {
        assert!(verify_partial_signature(key, &agg, msg, r_i, partial));
    }
    aggregate_musig_signatures(key, &agg, msg, &partials).unwrap()
}

#[test]
fn test_musig_any_size_any_order() {
    let mut rng = ChaCha20Rng::seed_from_u64(2001);
    for n in [2usize, 3, 5] {
        let keypairs: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate(&mut rng)).collect();
        let mut pks: Vec<Point> = keypairs.iter().map(|k| k.public_key()).collect();
        let key = generate_musig_key(&pks).unwrap();

        for rotation in 0..n {
            pks.rotate_left(1);
            let permuted = generate_musig_key(&pks).unwrap();
            assert_eq!(
                permuted.agg_public_key(),
                key.agg_public_key(),
                "rotation {}",
                rotation
            );

            let mut msg = [0u8; 32];
            rng.fill_bytes(&mut msg);
            let sig = sign_with(&permuted, &keypairs, &msg, &mut rng);
            assert!(bip340::verify(&key.agg_public_key(), &msg, &sig));
            assert!(libsecp_verify(&key.agg_public_key(), msg, &sig));
        }
    }
}

#[test]
fn test_wrong_partial_signature_fails() {
    let mut rng = ChaCha20Rng::seed_from_u64(2002);
    let keypairs: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate(&mut rng)).collect();
    let pks: Vec<Point> = keypairs.iter().map(|k| k.public_key()).collect();
    let key = generate_musig_key(&pks).unwrap();
    let msg = [42u8; 32];

    let nonces: Vec<SecretNonce> = (0..3).map(|_| SecretNonce::generate(&mut rng)).collect();
    let publics: Vec<Point> = nonces.iter().map(|n| n.public()).collect();
    let agg = aggregate_nonces(&publics).unwrap();
    let mut partials: Vec<PartialSignature> = keypairs
        .iter()
        .zip(nonces)
        .map(|(kp, nonce)| sign_musig(&key, kp.secret_key(), nonce, &agg, &msg).unwrap())
        .collect();

    // Signer 0 reports signer 1's scalar
    partials[0] = PartialSignature::new(partials[0].signer(), partials[1].scalar());
    assert!(!verify_partial_signature(&key, &agg, &msg, &publics[0], &partials[0]));

    let sig = aggregate_musig_signatures(&key, &agg, &msg, &partials).unwrap();
    assert!(!bip340::verify(&key.agg_public_key(), &msg, &sig));
    assert!(!libsecp_verify(&key.agg_public_key(), msg, &sig));
}

#[test]
fn test_aggregation_rejects_incomplete_or_foreign_partials() {
    let mut rng = ChaCha20Rng::seed_from_u64(2003);
    let keypairs: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate(&mut rng)).collect();
    let pks: Vec<Point> = keypairs[..2].iter().map(|k| k.public_key()).collect();
    let key = generate_musig_key(&pks).unwrap();
    let msg = b"incomplete";

    let nonces: Vec<SecretNonce> = (0..2).map(|_| SecretNonce::generate(&mut rng)).collect();
    let publics: Vec<Point> = nonces.iter().map(|n| n.public()).collect();
    let agg = aggregate_nonces(&publics).unwrap();
    let partials: Vec<PartialSignature> = keypairs[..2]
        .iter()
        .zip(nonces)
        .map(|(kp, nonce)| sign_musig(&key, kp.secret_key(), nonce, &agg, msg).unwrap())
        .collect();

    assert_eq!(
        aggregate_musig_signatures(&key, &agg, msg, &partials[..1]).unwrap_err(),
        Error::MissingPartialSignatures {
            expected: 2,
            got: 1
        }
    );
    assert_eq!(
        aggregate_musig_signatures(&key, &agg, msg, &[partials[0], partials[0]]).unwrap_err(),
        Error::DuplicateKey
    );

    let outsider = PartialSignature::new(keypairs[2].public_key(), partials[1].scalar());
    assert_eq!(
        aggregate_musig_signatures(&key, &agg, msg, &[partials[0], outsider]).unwrap_err(),
        Error::UnknownParticipant
    );

    // An outsider cannot sign at all
    let nonce = SecretNonce::generate(&mut rng);
    assert_eq!(
        sign_musig(&key, keypairs[2].secret_key(), nonce, &agg, msg).unwrap_err(),
        Error::UnknownParticipant
    );
}

#[test]
fn test_tap_tweaked_musig_spends_tree_output() {
    let mut rng = ChaCha20Rng::seed_from_u64(2004);
    for _ in 0..4 {
        let mut signers: Vec<Signer> = (0..3)
            .map(|_| Signer::new(KeyPair::generate(&mut rng)))
            .collect();
        let pks: Vec<Point> = signers.iter().map(|s| s.public_key()).collect();
        let mut msg = [0u8; 32];
        rng.fill_bytes(&mut msg);

        let mut session = MuSigSession::new(pks, msg.to_vec());
        let internal = session.aggregate_keys().unwrap().agg_public_key();

        let backup = KeyPair::generate(&mut rng).x_only_public_key();
        let tree = TapTree::construct(internal, vec![(1, TapLeaf::new(p2pk_script(&backup)))])
            .unwrap();
        let root = tree.root_hash().unwrap();
        let tweaked = session.tap_tweak(Some(&root)).unwrap();
        assert_eq!(tweaked.agg_public_key(), tree.output_key());
        assert!(tweaked.is_tweaked());

        for signer in signers.iter_mut() {
            let r = signer.commit_nonce(&mut rng).unwrap();
            session.add_nonce(signer.public_key(), r).unwrap();
        }
        let ctx = session.signing_context().unwrap();
        for signer in signers.iter_mut() {
            let partial = signer.sign(&ctx).unwrap();
            session.add_partial_signature(partial).unwrap();
        }
        let sig = session.finalize().unwrap();

        assert!(session.verify());
        assert!(libsecp_verify(&tree.output_key(), msg, &sig));
    }
}

#[test]
fn test_double_tweak_keeps_invariant() {
    let mut rng = ChaCha20Rng::seed_from_u64(2005);
    let keypairs: Vec<KeyPair> = (0..2).map(|_| KeyPair::generate(&mut rng)).collect();
    let pks: Vec<Point> = keypairs.iter().map(|k| k.public_key()).collect();
    let key = generate_musig_key(&pks)
        .unwrap()
        .tap_tweak(Some(&[1u8; 32]))
        .unwrap()
        .tap_tweak(None)
        .unwrap();

    let msg = [5u8; 32];
    let sig = sign_with(&key, &keypairs, &msg, &mut rng);
    assert!(libsecp_verify(&key.agg_public_key(), msg, &sig));
}

#[test]
fn test_session_stages_in_order() {
    let mut rng = ChaCha20Rng::seed_from_u64(2006);
    let mut signers: Vec<Signer> = (0..2)
        .map(|_| Signer::new(KeyPair::generate(&mut rng)))
        .collect();
    let pks: Vec<Point> = signers.iter().map(|s| s.public_key()).collect();
    let mut session = MuSigSession::new(pks, b"staged".to_vec());
    assert_eq!(session.stage(), Stage::KeysCollected);

    assert!(matches!(session.finalize(), Err(Error::OutOfOrder { .. })));
    assert!(!session.verify());

    session.aggregate_keys().unwrap();
    assert_eq!(session.stage(), Stage::Aggregated);
    assert!(matches!(
        session.aggregate_keys(),
        Err(Error::OutOfOrder { .. })
    ));

    let r0 = signers[0].commit_nonce(&mut rng).unwrap();
    assert_eq!(
        session.add_nonce(signers[0].public_key(), r0).unwrap(),
        Stage::Aggregated
    );
    assert_eq!(
        session.add_nonce(signers[0].public_key(), r0).unwrap_err(),
        Error::NonceAlreadyCommitted
    );
    let r1 = signers[1].commit_nonce(&mut rng).unwrap();
    assert_eq!(
        session.add_nonce(signers[1].public_key(), r1).unwrap(),
        Stage::NoncesExchanged
    );

    let ctx = session.signing_context().unwrap();
    let p0 = signers[0].sign(&ctx).unwrap();
    assert_eq!(
        session.add_partial_signature(p0).unwrap(),
        Stage::NoncesExchanged
    );
    assert_eq!(session.add_partial_signature(p0).unwrap_err(), Error::DuplicateKey);
    assert!(matches!(session.finalize(), Err(Error::OutOfOrder { .. })));

    let p1 = signers[1].sign(&ctx).unwrap();
    assert_eq!(
        session.add_partial_signature(p1).unwrap(),
        Stage::PartialSigsCollected
    );
    session.finalize().unwrap();
    assert_eq!(session.stage(), Stage::Complete);
    assert!(session.verify());

    // Each signer's nonce is spent
    assert_eq!(signers[0].sign(&ctx).unwrap_err(), Error::NonceReused);
}

#[test]
fn test_signer_outside_session_is_rejected_before_nonce_use() {
    let mut rng = ChaCha20Rng::seed_from_u64(2007);
    let mut signers: Vec<Signer> = (0..3)
        .map(|_| Signer::new(KeyPair::generate(&mut rng)))
        .collect();
    let pks: Vec<Point> = signers[..2].iter().map(|s| s.public_key()).collect();
    let mut session = MuSigSession::new(pks, b"members only".to_vec());
    session.aggregate_keys().unwrap();
    for signer in signers[..2].iter_mut() {
        let r = signer.commit_nonce(&mut rng).unwrap();
        session.add_nonce(signer.public_key(), r).unwrap();
    }
    let ctx = session.signing_context().unwrap();

    signers[2].commit_nonce(&mut rng).unwrap();
    assert_eq!(signers[2].sign(&ctx).unwrap_err(), Error::UnknownParticipant);
    // The outsider's nonce is still committed, not burned
    assert_eq!(
        signers[2].commit_nonce(&mut rng).unwrap_err(),
        Error::NonceAlreadyCommitted
    );
}

#[test]
fn test_stale_key_set_signature_fails_against_current_key() {
    let mut rng = ChaCha20Rng::seed_from_u64(2008);
    let keypairs: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate(&mut rng)).collect();
    let all: Vec<Point> = keypairs.iter().map(|k| k.public_key()).collect();
    let current = generate_musig_key(&all).unwrap();
    // Coefficients computed before the third key joined
    let stale = generate_musig_key(&all[..2]).unwrap();
    assert_ne!(stale.agg_public_key(), current.agg_public_key());

    let msg = [11u8; 32];
    let sig = sign_with(&stale, &keypairs[..2], &msg, &mut rng);
    assert!(!bip340::verify(&current.agg_public_key(), &msg, &sig));
    assert!(!libsecp_verify(&current.agg_public_key(), msg, &sig));
    assert!(bip340::verify(&stale.agg_public_key(), &msg, &sig));
}
