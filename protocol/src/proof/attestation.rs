//! Default [`ProofSystem`] backend: one-shot Ed25519 keys.

use tracing::trace;

use super::system::{Attestation, ProofError, ProofSystem};
use crate::crypto::hash::Digest;
use crate::crypto::keys::{CovaultKeypair, CovaultPublicKey, CovaultSignature};
use crate::config::SIGNATURE_LENGTH;

/// Signs each statement with a freshly generated Ed25519 keypair.
///
/// The secret is dropped (and zeroized) as soon as the signature exists.
/// Nobody, including us, can produce a second signature under that key, so
/// the embedded verification key identifies exactly one statement.
///
/// This proves the envelope wasn't altered after generation. It does *not*
/// prove who generated it. Callers who need that bind approvals separately.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Attestor;

impl ProofSystem for Ed25519Attestor {
    fn name(&self) -> &'static str {
        "ed25519-attestor"
    }

    fn prove(&self, statement: &Digest) -> Result<Attestation, ProofError> {
        let keypair = CovaultKeypair::generate();
        let signature = keypair.sign(statement);
        trace!(key = %keypair.public_key().to_hex(), "attested statement");
        Ok(Attestation {
            signature: signature.as_bytes().to_vec(),
            verification_key: keypair.public_key().as_bytes().to_vec(),
        })
    }

    fn verify(&self, statement: &Digest, attestation: &Attestation) -> Result<(), ProofError> {
        let key = CovaultPublicKey::try_from_slice(&attestation.verification_key)
            .map_err(|e| ProofError::KeyMaterial(e.to_string()))?;
        if attestation.signature.len() != SIGNATURE_LENGTH {
            return Err(ProofError::KeyMaterial(format!(
                "signature is {} bytes",
                attestation.signature.len()
            )));
        }
        let signature = CovaultSignature::from_vec(attestation.signature.clone());
        if key.verify(statement, &signature) {
            Ok(())
        } else {
            Err(ProofError::SignatureInvalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prove_then_verify() {
        let statement = [7u8; 32];
        let att = Ed25519Attestor.prove(&statement).unwrap();
        assert!(Ed25519Attestor.verify(&statement, &att).is_ok());
    }

    #[test]
    fn fresh_key_per_proof() {
        let statement = [7u8; 32];
        let a = Ed25519Attestor.prove(&statement).unwrap();
        let b = Ed25519Attestor.prove(&statement).unwrap();
        assert_ne!(a.verification_key, b.verification_key);
    }

    #[test]
    fn other_statement_fails() {
        let att = Ed25519Attestor.prove(&[1u8; 32]).unwrap();
        assert_eq!(
            Ed25519Attestor.verify(&[2u8; 32], &att),
            Err(ProofError::SignatureInvalid)
        );
    }

    #[test]
    fn malformed_material_is_reported_as_such() {
        let mut att = Ed25519Attestor.prove(&[1u8; 32]).unwrap();
        att.signature.truncate(10);
        assert!(matches!(
            Ed25519Attestor.verify(&[1u8; 32], &att),
            Err(ProofError::KeyMaterial(_))
        ));

        let mut att = Ed25519Attestor.prove(&[1u8; 32]).unwrap();
        att.verification_key = vec![0u8; 5];
        assert!(matches!(
            Ed25519Attestor.verify(&[1u8; 32], &att),
            Err(ProofError::KeyMaterial(_))
        ));
    }
}
