//! # Key Management
//!
//! Ed25519 keys play two parts in a vault:
//!
//! - **Attestation keys.** The default `ProofSystem` backend mints a fresh
//!   keypair for every proof envelope, signs one statement, and drops the
//!   secret. Only the public half survives, embedded in the envelope.
//! - **Member keys.** A member identity is a hex-encoded public key. The
//!   secret half signs withdrawal approvals. Scenario fixtures load member
//!   keys from hex seeds; nothing here stores them.
//!
//! Secrets are zeroized on drop by ed25519-dalek and never printed. `Debug`
//! shows the public half only.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use crate::config::{SIGNATURE_LENGTH, VERIFYING_KEY_LENGTH};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("seed must be 32 hex-encoded bytes")]
    InvalidSeed,

    #[error("not a valid Ed25519 public key")]
    InvalidPublicKey,
}

// ---------------------------------------------------------------------------
// CovaultKeypair
// ---------------------------------------------------------------------------

/// A member or attestation keypair. Not `Serialize` and not `Clone`.
pub struct CovaultKeypair {
    signing_key: SigningKey,
}

impl CovaultKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Fixtures only.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Keypair from a hex seed, as written in scenario files.
    pub fn from_hex(seed_hex: &str) -> Result<Self, KeyError> {
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        hex::decode_to_slice(seed_hex.trim(), &mut seed).map_err(|_| KeyError::InvalidSeed)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> CovaultPublicKey {
        CovaultPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// The member identity for this key.
    pub fn public_key_hex(&self) -> String {
        self.public_key().to_hex()
    }

    /// RFC 8032 signature, deterministic per (key, message).
    pub fn sign(&self, message: &[u8]) -> CovaultSignature {
        CovaultSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for CovaultKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CovaultKeypair(pub={})", self.public_key_hex())
    }
}

// ---------------------------------------------------------------------------
// CovaultPublicKey
// ---------------------------------------------------------------------------

/// A validated Ed25519 point. Member identities and envelope verification
/// keys both parse into this.
#[derive(Clone, PartialEq, Eq)]
pub struct CovaultPublicKey {
    bytes: [u8; VERIFYING_KEY_LENGTH],
}

impl CovaultPublicKey {
    /// Rejects wrong lengths and bytes that don't decode to a curve point.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; VERIFYING_KEY_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Parse a member identity.
    pub fn from_hex(identity: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(identity).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VERIFYING_KEY_LENGTH] {
        &self.bytes
    }

    /// Strict verification. Any malformed input is `false`.
    pub fn verify(&self, message: &[u8], signature: &CovaultSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Some(signature) = signature.to_dalek() else {
            return false;
        };
        verifying_key.verify_strict(message, &signature).is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Debug for CovaultPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CovaultPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// CovaultSignature
// ---------------------------------------------------------------------------

/// Raw signature bytes as they travel in approvals and envelopes. Anything
/// other than 64 bytes fails verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovaultSignature {
    bytes: Vec<u8>,
}

impl CovaultSignature {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn to_dalek(&self) -> Option<DalekSignature> {
        let bytes: [u8; SIGNATURE_LENGTH] = self.bytes.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE_SEED: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    #[test]
    fn hex_seed_matches_byte_seed() {
        let from_hex = CovaultKeypair::from_hex(ALICE_SEED).unwrap();
        let from_bytes = CovaultKeypair::from_seed(&[1u8; 32]);
        assert_eq!(from_hex.public_key(), from_bytes.public_key());
        assert_eq!(from_hex.sign(b"approve"), from_bytes.sign(b"approve"));
    }

    #[test]
    fn bad_seeds_are_rejected() {
        assert!(matches!(CovaultKeypair::from_hex("deadbeef"), Err(KeyError::InvalidSeed)));
        assert!(matches!(CovaultKeypair::from_hex("zz"), Err(KeyError::InvalidSeed)));
        assert!(CovaultKeypair::from_hex(&format!(" {ALICE_SEED}\n")).is_ok());
    }

    #[test]
    fn identity_parses_back_to_the_same_key() {
        let kp = CovaultKeypair::generate();
        let identity = kp.public_key_hex();
        assert_eq!(identity.len(), 64);
        assert_eq!(CovaultPublicKey::from_hex(&identity).unwrap(), kp.public_key());
        assert!(CovaultPublicKey::try_from_slice(&[0u8; 16]).is_err());
    }

    #[test]
    fn approval_signature_is_bound_to_key_and_message() {
        let alice = CovaultKeypair::from_seed(&[1u8; 32]);
        let bob = CovaultKeypair::from_seed(&[2u8; 32]);
        let sig = alice.sign(b"withdraw 5000000");

        assert!(alice.public_key().verify(b"withdraw 5000000", &sig));
        assert!(!alice.public_key().verify(b"withdraw 5000001", &sig));
        assert!(!bob.public_key().verify(b"withdraw 5000000", &sig));

        let mut truncated = sig.as_bytes().to_vec();
        truncated.pop();
        assert!(!alice.public_key().verify(b"withdraw 5000000", &CovaultSignature::from_vec(truncated)));
    }

    #[test]
    fn debug_shows_only_the_public_half() {
        let kp = CovaultKeypair::from_seed(&[7u8; 32]);
        let shown = format!("{kp:?}");
        assert_eq!(shown, format!("CovaultKeypair(pub={})", kp.public_key_hex()));
        assert!(!shown.contains(&hex::encode([7u8; 32])));
    }
}
