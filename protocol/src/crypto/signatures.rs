//! # Signature Verification Capability
//!
//! The core never checks a member's signature itself. The predicate only asks
//! "is this identity a member?" Proving that the member actually approved
//! is delegated to a [`SignatureVerifier`] supplied by whoever assembles the
//! signer set.
//!
//! [`Ed25519Verifier`] is the default implementation: identities are
//! hex-encoded Ed25519 public keys and signatures are raw 64-byte Ed25519
//! signatures. A deployment with secp256k1 member keys plugs in its own
//! verifier and nothing downstream changes.
//!
//! ## Strictness
//!
//! We use `verify_strict`, which rejects some edge-case signatures that
//! lenient implementations accept. Stricter is safer.

use super::keys::{CovaultKeypair, CovaultPublicKey, CovaultSignature};

/// External identity-verification capability.
///
/// Implementations must be pure: the same inputs always produce the same
/// answer, and a malformed identity or signature is simply `false`.
pub trait SignatureVerifier: Send + Sync {
    /// Returns `true` if `signature` is a valid signature over `message` by
    /// the holder of `public_identity`.
    fn verify_signature(&self, message: &[u8], signature: &[u8], public_identity: &str) -> bool;
}

/// Ed25519 over hex-encoded public-key identities.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify_signature(&self, message: &[u8], signature: &[u8], public_identity: &str) -> bool {
        let Ok(public_key) = CovaultPublicKey::from_hex(public_identity) else {
            return false;
        };
        verify(&public_key, message, &CovaultSignature::from_vec(signature.to_vec()))
    }
}

/// Sign a message with a keypair.
///
/// # Example
///
/// ```
/// use covault_protocol::crypto::{sign, verify, CovaultKeypair};
///
/// let keypair = CovaultKeypair::generate();
/// let signature = sign(&keypair, b"approve withdrawal");
/// assert!(verify(&keypair.public_key(), b"approve withdrawal", &signature));
/// ```
pub fn sign(keypair: &CovaultKeypair, message: &[u8]) -> CovaultSignature {
    keypair.sign(message)
}

/// Verify a signature. We don't distinguish "bad signature" from "wrong
/// key". Both are just "nope."
pub fn verify(public_key: &CovaultPublicKey, message: &[u8], signature: &CovaultSignature) -> bool {
    public_key.verify(message, signature)
}
