//! End-to-end integration tests for the Covault protocol.
//!
//! These walk a three-member vault through its withdrawal lifecycle: build
//! the vault, evaluate requests, attest approvals, and execute them against
//! the live commitment. Every test builds its own vault. No shared state.

use covault_protocol::crypto::{sign, CovaultKeypair, Ed25519Verifier, SignatureVerifier};
use covault_protocol::predicate::{AuthorizationError, WithdrawalPredicate, WithdrawalRequest};
use covault_protocol::proof::{Ed25519Attestor, ProofEnvelope, ProofError};
use covault_protocol::vault::{CustodyError, Member, MultiPartyVault, RuleSet, VaultState};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Alice 40%, Bob 35%, Carol 25%, with real Ed25519 identities.
fn members() -> (Vec<CovaultKeypair>, VaultState) {
    let keys: Vec<CovaultKeypair> = (1u8..=3).map(|n| CovaultKeypair::from_seed(&[n; 32])).collect();
    let shares = [40u8, 35, 25];
    let roster = keys
        .iter()
        .zip(shares)
        .map(|(k, s)| Member::new(&k.public_key_hex(), s, 100).expect("member"))
        .collect();
    let state = VaultState::new(roster, 100_000_000, 100).expect("vault");
    (keys, state)
}

fn request(keys: &[&CovaultKeypair], amount: u64, height: u32) -> WithdrawalRequest {
    let ids: Vec<String> = keys.iter().map(|k| k.public_key_hex()).collect();
    WithdrawalRequest::from_hex_signers(amount, height, &ids).expect("request")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn three_member_vault_lifecycle() {
    let (keys, state) = members();
    let (alice, bob, carol) = (&keys[0], &keys[1], &keys[2]);
    let mut vault = MultiPartyVault::new(state, RuleSet::conservative()).unwrap();

    // Small withdrawal, 40% + 35% holders.
    let proof = vault
        .create_withdrawal_proof(request(&[alice, bob], 5_000_000, 200), &Ed25519Attestor)
        .unwrap();
    let receipt = vault.execute_withdrawal(&proof, &Ed25519Attestor).unwrap();
    assert_eq!(receipt.remaining_balance, 95_000_000);

    // Large withdrawal, same two signers: refused.
    let err = vault
        .create_withdrawal_proof(request(&[alice, bob], 50_000_000, 400), &Ed25519Attestor)
        .unwrap_err();
    assert!(matches!(
        err,
        CustodyError::Proof(ProofError::PredicateFailed(
            AuthorizationError::LargeWithdrawalRequiresAll { .. }
        ))
    ));

    // All three: accepted.
    let proof = vault
        .create_withdrawal_proof(request(&[alice, bob, carol], 50_000_000, 400), &Ed25519Attestor)
        .unwrap();
    let receipt = vault.execute_withdrawal(&proof, &Ed25519Attestor).unwrap();
    assert_eq!(receipt.remaining_balance, 45_000_000);
    assert_eq!(vault.history().len(), 2);
}

#[test]
fn envelope_verifies_only_against_its_commitment() {
    let (keys, mut state) = members();
    let predicate = WithdrawalPredicate::new(
        &state,
        RuleSet::conservative(),
        request(&[&keys[0], &keys[1]], 5_000_000, 200),
    );
    let envelope = ProofEnvelope::generate(&predicate, &state, &Ed25519Attestor).unwrap();
    assert!(envelope.verify(&state.commitment_hash(), &Ed25519Attestor).is_ok());

    let moved = state.debit(5_000_000).unwrap();
    assert_eq!(
        envelope.verify(&moved, &Ed25519Attestor),
        Err(ProofError::DigestMismatch("commitment"))
    );
}

#[test]
fn serialized_envelope_survives_transport() {
    let (keys, state) = members();
    let predicate = WithdrawalPredicate::new(
        &state,
        RuleSet::conservative(),
        request(&[&keys[0], &keys[2]], 1_000_000, 150),
    );
    let envelope = ProofEnvelope::generate(&predicate, &state, &Ed25519Attestor).unwrap();
    let wire = envelope.to_json().unwrap();
    let received = ProofEnvelope::from_json(&wire).unwrap();
    assert!(received.verify(&state.commitment_hash(), &Ed25519Attestor).is_ok());
}

#[test]
fn signed_approvals_are_bound_to_the_commitment() {
    let (keys, state) = members();
    let req = request(&[&keys[0], &keys[1]], 5_000_000, 200);
    let commitment = state.commitment_hash();
    let message = req.approval_message(&commitment);

    for key in &keys[..2] {
        let sig = sign(key, &message);
        assert!(Ed25519Verifier.verify_signature(&message, sig.as_bytes(), &key.public_key_hex()));
    }

    // The same signature is worthless against another vault state.
    let sig = sign(&keys[0], &message);
    let other = req.approval_message(&[0u8; 32]);
    assert!(!Ed25519Verifier.verify_signature(&other, sig.as_bytes(), &keys[0].public_key_hex()));
}

#[test]
fn emergency_exit_after_timeout() {
    let (keys, state) = members();
    let rules = RuleSet::conservative();
    let mut vault = MultiPartyVault::new(state, rules).unwrap();
    let after = 100 + rules.emergency_timeout_blocks;

    // Two signers, large amount, no all-hands: only the emergency path allows it.
    let normal = request(&[&keys[1], &keys[2]], 60_000_000, after);
    assert!(!vault.evaluate(normal.clone()).is_valid());

    let proof = vault
        .create_withdrawal_proof(normal.emergency(), &Ed25519Attestor)
        .unwrap();
    let receipt = vault.execute_withdrawal(&proof, &Ed25519Attestor).unwrap();
    assert_eq!(receipt.remaining_balance, 40_000_000);
    assert!(vault.history()[0].emergency);
}

#[test]
fn membership_change_invalidates_pending_proofs() {
    let (keys, state) = members();
    let mut vault = MultiPartyVault::new(state, RuleSet::conservative()).unwrap();
    let proof = vault
        .create_withdrawal_proof(request(&[&keys[0], &keys[1]], 5_000_000, 200), &Ed25519Attestor)
        .unwrap();

    let roster = vec![
        Member::new(&keys[0].public_key_hex(), 60, 100).unwrap(),
        Member::new(&keys[1].public_key_hex(), 40, 100).unwrap(),
    ];
    vault.apply_membership(roster).unwrap();

    assert!(matches!(
        vault.execute_withdrawal(&proof, &Ed25519Attestor),
        Err(CustodyError::Proof(ProofError::DigestMismatch(_)))
    ));
    assert_eq!(vault.state().total_balance(), 100_000_000);
}
