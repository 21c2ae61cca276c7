//! The statement an envelope attests to.
//!
//! ```text
//! public    = SHA-256(commitment ‖ amount (8, LE) ‖ current_height (4, LE))
//! private   = SHA-256(signer_1 ‖ .. ‖ signer_n ‖ bincode(RuleSet))
//! statement = BLAKE3-derive_key(ATTESTATION_CONTEXT; public ‖ private ‖ marker)
//! ```
//!
//! "Private" is aspirational. The digest hides the signer list from anyone
//! reading the envelope, but nothing here is zero-knowledge.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{ATTESTATION_CONTEXT, VALIDITY_MARKER_INVALID, VALIDITY_MARKER_VALID};
use crate::crypto::hash::{domain_separated_hash_multi, sha256_multi, Digest};
use crate::vault::{MemberId, RuleSet, RuleSetError};

/// Whether the attested statement is an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidityMarker {
    Valid,
    Invalid,
}

impl ValidityMarker {
    pub fn from_valid(valid: bool) -> Self {
        if valid {
            Self::Valid
        } else {
            Self::Invalid
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Valid => VALIDITY_MARKER_VALID,
            Self::Invalid => VALIDITY_MARKER_INVALID,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for ValidityMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

pub fn public_inputs_digest(commitment: &Digest, amount: u64, current_height: u32) -> Digest {
    sha256_multi(&[
        commitment,
        &amount.to_le_bytes(),
        &current_height.to_le_bytes(),
    ])
}

/// Signers in request order, then the canonical rule bytes.
pub fn private_inputs_digest(signers: &[MemberId], rules: &RuleSet) -> Result<Digest, RuleSetError> {
    let rule_bytes = rules.to_canonical_bytes()?;
    let mut parts: Vec<&[u8]> = signers.iter().map(MemberId::as_bytes).collect();
    parts.push(&rule_bytes);
    Ok(sha256_multi(&parts))
}

pub fn statement_digest(public: &Digest, private: &Digest, marker: ValidityMarker) -> Digest {
    domain_separated_hash_multi(ATTESTATION_CONTEXT, &[public, private, marker.as_bytes()])
}
