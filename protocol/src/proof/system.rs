//! # Proof System Capability
//!
//! Everything cryptographic about an envelope goes through [`ProofSystem`]:
//! sign a 32-byte statement, check a signature over one. The envelope code
//! never names a curve. Swapping Ed25519 for a real proving backend means
//! implementing two methods.
//!
//! The trait is object-safe and `Send + Sync`, so a node can hold an
//! `Arc<dyn ProofSystem>` and share it across vault locks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash::Digest;
use crate::predicate::AuthorizationError;
use crate::vault::RuleSetError;

/// Errors from generating or verifying a proof envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    /// The predicate denied the request, so there is nothing to attest.
    #[error("predicate failed: {0}")]
    PredicateFailed(#[from] AuthorizationError),

    /// A recomputed digest disagrees with the envelope.
    #[error("digest mismatch: {0}")]
    DigestMismatch(&'static str),

    /// The attestation does not verify under the embedded key.
    #[error("attestation signature invalid")]
    SignatureInvalid,

    /// The embedded verification key or signature is malformed.
    ///
    /// Backends return this from `verify`; the envelope folds it into
    /// [`SignatureInvalid`](Self::SignatureInvalid) before it reaches callers.
    #[error("malformed key material: {0}")]
    KeyMaterial(String),

    /// The envelope's validity marker is not `Valid`.
    #[error("envelope does not attest an approved withdrawal")]
    NotApproved,

    /// The rule set could not be encoded for the private digest.
    #[error(transparent)]
    Rules(#[from] RuleSetError),
}

/// What a backend returns from `prove`: a signature and the key to check it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
    #[serde(with = "hex")]
    pub verification_key: Vec<u8>,
}

/// A pluggable attest/check backend.
pub trait ProofSystem: Send + Sync {
    /// Short backend name, for logs.
    fn name(&self) -> &'static str;

    /// Attest to `statement`.
    fn prove(&self, statement: &Digest) -> Result<Attestation, ProofError>;

    /// Check an attestation over `statement`.
    ///
    /// # Errors
    ///
    /// [`ProofError::KeyMaterial`] for malformed keys or signatures,
    /// [`ProofError::SignatureInvalid`] for a well-formed signature that
    /// doesn't verify.
    fn verify(&self, statement: &Digest, attestation: &Attestation) -> Result<(), ProofError>;
}

impl<P: ProofSystem + ?Sized> ProofSystem for &P {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn prove(&self, statement: &Digest) -> Result<Attestation, ProofError> {
        (**self).prove(statement)
    }

    fn verify(&self, statement: &Digest, attestation: &Attestation) -> Result<(), ProofError> {
        (**self).verify(statement, attestation)
    }
}

impl<P: ProofSystem + ?Sized> ProofSystem for std::sync::Arc<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn prove(&self, statement: &Digest) -> Result<Attestation, ProofError> {
        (**self).prove(statement)
    }

    fn verify(&self, statement: &Digest, attestation: &Attestation) -> Result<(), ProofError> {
        (**self).verify(statement, attestation)
    }
}
