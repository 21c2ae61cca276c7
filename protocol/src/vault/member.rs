//! Vault members and their identities.
//!
//! An identity is a public key, carried as raw bytes and written as
//! lowercase hex everywhere it leaves the process. The bytes are what go
//! into the vault id and the commitment; the hex is what humans and JSON
//! see. Ordering is byte order, which is also lowercase-hex order, so
//! "sorted ascending" means the same thing in both views.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::VaultError;
use crate::config::TOTAL_SHARE_PERCENT;

/// A member identity: the bytes of a hex-encoded public key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberId(Vec<u8>);

impl MemberId {
    /// Parse a hex identity. Upper-case input is accepted and normalized.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidIdentity`] for empty or non-hex input.
    pub fn parse(s: &str) -> Result<Self, VaultError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VaultError::InvalidIdentity(s.to_string()));
        }
        let bytes = hex::decode(trimmed).map_err(|_| VaultError::InvalidIdentity(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// The raw identity bytes as they enter the commitment.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(8);
        s
    }
}

impl TryFrom<String> for MemberId {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MemberId> for String {
    fn from(id: MemberId) -> Self {
        id.to_hex()
    }
}

impl std::str::FromStr for MemberId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({}..)", self.short())
    }
}

/// One owner of the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Hex-encoded public key.
    pub identity: MemberId,
    /// Ownership share, 0..=100. Shares across the vault sum to 100.
    pub share_percent: u8,
    /// Block height at which the member joined.
    pub join_height: u32,
}

impl Member {
    /// Build a member from a hex identity.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidIdentity`] for a bad identity,
    /// [`VaultError::ShareOutOfRange`] for a share above 100.
    pub fn new(identity: &str, share_percent: u8, join_height: u32) -> Result<Self, VaultError> {
        let identity = MemberId::parse(identity)?;
        let member = Self {
            identity,
            share_percent,
            join_height,
        };
        member.check_share()?;
        Ok(member)
    }

    pub(crate) fn check_share(&self) -> Result<(), VaultError> {
        if u32::from(self.share_percent) > TOTAL_SHARE_PERCENT {
            return Err(VaultError::ShareOutOfRange {
                identity: self.identity.to_hex(),
                share: self.share_percent,
            });
        }
        Ok(())
    }

    /// Bytes this member contributes to the commitment:
    /// `identity ‖ share (1 byte) ‖ join_height (4 bytes LE)`.
    pub fn commitment_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.identity.as_bytes().len() + 5);
        out.extend_from_slice(self.identity.as_bytes());
        out.push(self.share_percent);
        out.extend_from_slice(&self.join_height.to_le_bytes());
        out
    }
}
