use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::circuit::{private_inputs_digest, public_inputs_digest, statement_digest, ValidityMarker};
use super::system::{Attestation, ProofError, ProofSystem};
use crate::crypto::hash::Digest;
use crate::predicate::{AuthorizationDecision, WithdrawalPredicate, WithdrawalRequest};
use crate::vault::VaultState;

// ---------------------------------------------------------------------------
// ProofEnvelope
// ---------------------------------------------------------------------------

/// A signed statement binding an approved withdrawal to one vault commitment.
///
/// Self-contained: verification needs only the envelope, the commitment to
/// compare against, and a [`ProofSystem`]. It never re-runs the predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEnvelope {
    #[serde(with = "hex")]
    pub commitment: Digest,
    #[serde(with = "hex")]
    pub public_inputs_digest: Digest,
    #[serde(with = "hex")]
    pub private_inputs_digest: Digest,
    pub validity_marker: ValidityMarker,
    /// The digest that was actually signed.
    #[serde(with = "hex")]
    pub statement_digest: Digest,
    /// Signature over `statement_digest`.
    #[serde(with = "hex")]
    pub attestation: Vec<u8>,
    #[serde(with = "hex")]
    pub verification_key: Vec<u8>,
}

impl ProofEnvelope {
    /// Re-evaluate `predicate` against `vault` and, if it approves, attest.
    ///
    /// # Errors
    ///
    /// [`ProofError::PredicateFailed`] with the denial reason. Backend errors
    /// pass through.
    pub fn generate<P: ProofSystem + ?Sized>(
        predicate: &WithdrawalPredicate,
        vault: &VaultState,
        system: &P,
    ) -> Result<Self, ProofError> {
        let decision = predicate.evaluate(vault);
        let marker = ValidityMarker::from_valid(decision.is_valid());
        if let AuthorizationDecision::Denied(reason) = decision {
            return Err(ProofError::PredicateFailed(reason));
        }

        let commitment = vault.commitment_hash();
        let request = predicate.request();
        let public = public_inputs_digest(&commitment, request.amount, request.current_height);
        let private = private_inputs_digest(&request.signers, predicate.rules())?;
        let statement = statement_digest(&public, &private, marker);

        let Attestation {
            signature,
            verification_key,
        } = system.prove(&statement)?;

        debug!(
            backend = system.name(),
            commitment = %hex::encode(commitment),
            amount = request.amount,
            "proof envelope generated"
        );

        Ok(Self {
            commitment,
            public_inputs_digest: public,
            private_inputs_digest: private,
            validity_marker: marker,
            statement_digest: statement,
            attestation: signature,
            verification_key,
        })
    }

    /// Check the envelope against `current_commitment`.
    ///
    /// In order: commitment, statement digest, signature, marker.
    pub fn verify<P: ProofSystem + ?Sized>(
        &self,
        current_commitment: &Digest,
        system: &P,
    ) -> Result<(), ProofError> {
        if &self.commitment != current_commitment {
            warn!(
                envelope = %hex::encode(self.commitment),
                current = %hex::encode(current_commitment),
                "envelope bound to a different vault state"
            );
            return Err(ProofError::DigestMismatch("commitment"));
        }

        let recomputed = statement_digest(
            &self.public_inputs_digest,
            &self.private_inputs_digest,
            self.validity_marker,
        );
        if recomputed != self.statement_digest {
            return Err(ProofError::DigestMismatch("statement"));
        }

        let attestation = Attestation {
            signature: self.attestation.clone(),
            verification_key: self.verification_key.clone(),
        };
        system
            .verify(&self.statement_digest, &attestation)
            .map_err(|e| match e {
                ProofError::KeyMaterial(_) => ProofError::SignatureInvalid,
                other => other,
            })?;

        if !self.validity_marker.is_valid() {
            return Err(ProofError::NotApproved);
        }
        Ok(())
    }

    /// Hex commitment the envelope is bound to.
    pub fn commitment_hex(&self) -> String {
        hex::encode(self.commitment)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// ---------------------------------------------------------------------------
// WithdrawalProof
// ---------------------------------------------------------------------------

/// An envelope together with the predicate it attests.
///
/// This is what the executor consumes. On top of the envelope checks it
/// confirms that the envelope's input digests really describe the bound
/// request, so an envelope can't be paired with a different request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalProof {
    envelope: ProofEnvelope,
    predicate: WithdrawalPredicate,
}

impl WithdrawalProof {
    pub fn generate<P: ProofSystem + ?Sized>(
        predicate: WithdrawalPredicate,
        vault: &VaultState,
        system: &P,
    ) -> Result<Self, ProofError> {
        let envelope = ProofEnvelope::generate(&predicate, vault, system)?;
        Ok(Self {
            envelope,
            predicate,
        })
    }

    /// Envelope checks plus input-digest binding to the request.
    pub fn verify<P: ProofSystem + ?Sized>(
        &self,
        current_commitment: &Digest,
        system: &P,
    ) -> Result<(), ProofError> {
        self.envelope.verify(current_commitment, system)?;

        let request = self.predicate.request();
        let public = public_inputs_digest(current_commitment, request.amount, request.current_height);
        if public != self.envelope.public_inputs_digest {
            return Err(ProofError::DigestMismatch("public inputs"));
        }
        let private = private_inputs_digest(&request.signers, self.predicate.rules())?;
        if private != self.envelope.private_inputs_digest {
            return Err(ProofError::DigestMismatch("private inputs"));
        }
        if self.predicate.vault_commitment() != &self.envelope.commitment {
            return Err(ProofError::DigestMismatch("predicate commitment"));
        }
        Ok(())
    }

    pub fn envelope(&self) -> &ProofEnvelope {
        &self.envelope
    }

    pub fn predicate(&self) -> &WithdrawalPredicate {
        &self.predicate
    }

    pub fn request(&self) -> &WithdrawalRequest {
        self.predicate.request()
    }

    pub fn net_amount(&self) -> u64 {
        self.predicate.net_amount()
    }

    pub fn penalty(&self) -> u64 {
        self.predicate.penalty()
    }

    pub fn into_envelope(self) -> ProofEnvelope {
        self.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::AuthorizationError;
    use crate::proof::Ed25519Attestor;
    use crate::vault::{Member, RuleSet};

    fn id(n: u8) -> String {
        hex::encode([n; 32])
    }

    fn vault() -> VaultState {
        VaultState::new(
            vec![
                Member::new(&id(1), 40, 100).unwrap(),
                Member::new(&id(2), 35, 100).unwrap(),
                Member::new(&id(3), 25, 100).unwrap(),
            ],
            100_000_000,
            100,
        )
        .unwrap()
    }

    fn predicate(state: &VaultState, amount: u64, signers: &[u8]) -> WithdrawalPredicate {
        let ids: Vec<String> = signers.iter().map(|n| id(*n)).collect();
        let req = WithdrawalRequest::from_hex_signers(amount, 200, &ids).unwrap();
        WithdrawalPredicate::new(state, RuleSet::conservative(), req)
    }

    #[test]
    fn generate_then_verify() {
        let state = vault();
        let env = ProofEnvelope::generate(&predicate(&state, 5_000_000, &[1, 2]), &state, &Ed25519Attestor).unwrap();
        assert_eq!(env.validity_marker, ValidityMarker::Valid);
        assert!(env.verify(&state.commitment_hash(), &Ed25519Attestor).is_ok());
    }

    #[test]
    fn denied_request_yields_no_envelope() {
        let state = vault();
        let err = ProofEnvelope::generate(&predicate(&state, 5_000_000, &[1]), &state, &Ed25519Attestor).unwrap_err();
        assert!(matches!(
            err,
            ProofError::PredicateFailed(AuthorizationError::QuorumNotMet { .. })
        ));
    }

    #[test]
    fn moved_vault_breaks_verification() {
        let mut state = vault();
        let env = ProofEnvelope::generate(&predicate(&state, 5_000_000, &[1, 2]), &state, &Ed25519Attestor).unwrap();
        let new_commitment = state.debit(1).unwrap();
        assert_eq!(
            env.verify(&new_commitment, &Ed25519Attestor),
            Err(ProofError::DigestMismatch("commitment"))
        );
    }

    #[test]
    fn tampered_fields_are_caught() {
        let state = vault();
        let c = state.commitment_hash();
        let env = ProofEnvelope::generate(&predicate(&state, 5_000_000, &[1, 2]), &state, &Ed25519Attestor).unwrap();

        let mut digest = env.clone();
        digest.public_inputs_digest[0] ^= 1;
        assert_eq!(digest.verify(&c, &Ed25519Attestor), Err(ProofError::DigestMismatch("statement")));

        let mut marker = env.clone();
        marker.validity_marker = ValidityMarker::Invalid;
        assert_eq!(marker.verify(&c, &Ed25519Attestor), Err(ProofError::DigestMismatch("statement")));

        let mut sig = env.clone();
        sig.attestation[0] ^= 1;
        assert_eq!(sig.verify(&c, &Ed25519Attestor), Err(ProofError::SignatureInvalid));

        let mut key = env;
        key.verification_key = vec![1, 2, 3];
        assert_eq!(key.verify(&c, &Ed25519Attestor), Err(ProofError::SignatureInvalid));
    }

    #[test]
    fn invalid_marker_never_verifies() {
        // Re-sign an Invalid statement with a consistent digest.
        let state = vault();
        let c = state.commitment_hash();
        let mut env = ProofEnvelope::generate(&predicate(&state, 5_000_000, &[1, 2]), &state, &Ed25519Attestor).unwrap();
        env.validity_marker = ValidityMarker::Invalid;
        env.statement_digest = statement_digest(&env.public_inputs_digest, &env.private_inputs_digest, env.validity_marker);
        let att = Ed25519Attestor.prove(&env.statement_digest).unwrap();
        env.attestation = att.signature;
        env.verification_key = att.verification_key;
        assert_eq!(env.verify(&c, &Ed25519Attestor), Err(ProofError::NotApproved));
    }

    #[test]
    fn json_roundtrip_uses_hex() {
        let state = vault();
        let env = ProofEnvelope::generate(&predicate(&state, 5_000_000, &[1, 2]), &state, &Ed25519Attestor).unwrap();
        let json = env.to_json().unwrap();
        assert!(json.contains(&state.commitment_hex()));
        assert!(json.contains("\"validity_marker\": \"valid\""));
        let back = ProofEnvelope::from_json(&json).unwrap();
        assert_eq!(back, env);
        assert!(back.verify(&state.commitment_hash(), &Ed25519Attestor).is_ok());
    }

    #[test]
    fn bound_proof_rejects_swapped_request() {
        let state = vault();
        let c = state.commitment_hash();
        let small = WithdrawalProof::generate(predicate(&state, 1_000, &[1, 2]), &state, &Ed25519Attestor).unwrap();
        assert!(small.verify(&c, &Ed25519Attestor).is_ok());
        assert_eq!(small.net_amount(), 1_000);
        assert_eq!(small.penalty(), 0);

        // Pair the small envelope with a bigger request.
        let big = predicate(&state, 9_000_000, &[1, 2]);
        let swapped = WithdrawalProof {
            envelope: small.envelope().clone(),
            predicate: big,
        };
        assert_eq!(
            swapped.verify(&c, &Ed25519Attestor),
            Err(ProofError::DigestMismatch("public inputs"))
        );
    }
}
