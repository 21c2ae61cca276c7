//! # Vault State & Commitment
//!
//! [`VaultState`] is the canonical snapshot of one vault: who owns it, in
//! what proportion, how much is in it, and when it was created. Two digests
//! are derived from it:
//!
//! - **vault id**: SHA-256 over `VAULT_ID_DOMAIN` followed by the member
//!   identities sorted ascending. Computed once at construction. Reordering
//!   the member list does not change it.
//! - **commitment**: SHA-256 over a fixed byte layout:
//!
//! ```text
//! vault_id (32)
//! for each member, in stored order:
//!     identity ‖ share_percent (1) ‖ join_height (4, LE)
//! total_balance (8, LE) ‖ created_height (4, LE)
//! ```
//!
//! The commitment is never cached. Every call recomputes it, so there is no
//! way for a stale value to survive a mutation. The mutators return the new
//! commitment so callers that need it don't have to ask twice.
//!
//! After construction only `total_balance` and `created_height` can change.
//! Membership changes produce a *new* state via [`VaultState::reconstitute`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use super::member::{Member, MemberId};
use crate::config::{TOTAL_SHARE_PERCENT, VAULT_ID_DOMAIN};
use crate::crypto::hash::{sha256_multi, Digest};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from constructing or mutating a vault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The identity is empty or not hex.
    #[error("invalid member identity: {0:?}")]
    InvalidIdentity(String),

    /// A vault needs at least one member.
    #[error("vault must have at least one member")]
    EmptyMembership,

    /// The same identity appears twice.
    #[error("duplicate member: {0}")]
    DuplicateMember(String),

    /// A single share above 100%.
    #[error("share for {identity} out of range: {share}%")]
    ShareOutOfRange {
        /// Offending member.
        identity: String,
        /// Offending share.
        share: u8,
    },

    /// Shares do not add up to 100.
    #[error("member shares must sum to 100%, got {total}%")]
    ShareSumMismatch {
        /// The actual sum.
        total: u32,
    },

    /// A serialized state carried a vault id that doesn't match its roster.
    #[error("vault id mismatch: stored {stored}, computed {computed}")]
    VaultIdMismatch {
        /// Id found in the record.
        stored: String,
        /// Id recomputed from the members.
        computed: String,
    },

    /// A debit larger than the balance.
    #[error("balance underflow: balance {balance}, debit {amount}")]
    BalanceUnderflow {
        /// Current balance.
        balance: u64,
        /// Requested debit.
        amount: u64,
    },

    /// A credit that would overflow u64.
    #[error("balance overflow: balance {balance}, credit {amount}")]
    BalanceOverflow {
        /// Current balance.
        balance: u64,
        /// Requested credit.
        amount: u64,
    },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Canonical membership/balance snapshot of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VaultStateRecord")]
pub struct VaultState {
    #[serde(with = "hex")]
    vault_id: Digest,
    members: Vec<Member>,
    total_balance: u64,
    created_height: u32,
}

/// Wire form used for deserialization. Every construction check runs again.
#[derive(Deserialize)]
struct VaultStateRecord {
    #[serde(default)]
    vault_id: Option<String>,
    members: Vec<Member>,
    total_balance: u64,
    created_height: u32,
}

impl TryFrom<VaultStateRecord> for VaultState {
    type Error = VaultError;

    fn try_from(record: VaultStateRecord) -> Result<Self, Self::Error> {
        let state = VaultState::new(record.members, record.total_balance, record.created_height)?;
        if let Some(stored) = record.vault_id {
            let computed = state.vault_id_hex();
            if !stored.eq_ignore_ascii_case(&computed) {
                return Err(VaultError::VaultIdMismatch { stored, computed });
            }
        }
        Ok(state)
    }
}

/// Read-only export for the cross-chain collaborator.
///
/// That side proves UTXO inclusion of this commitment and amount. We never
/// validate its merkle paths or headers; we only hand it these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAnchor {
    /// Hex vault id.
    pub vault_id: String,
    /// Hex commitment at export time.
    pub commitment: String,
    /// Balance at export time.
    pub total_balance: u64,
    /// Creation height.
    pub created_height: u32,
}

impl VaultState {
    /// Construct a vault, enforcing every membership invariant.
    ///
    /// # Errors
    ///
    /// - [`VaultError::EmptyMembership`] for no members.
    /// - [`VaultError::ShareOutOfRange`] for any share above 100.
    /// - [`VaultError::DuplicateMember`] if an identity repeats.
    /// - [`VaultError::ShareSumMismatch`] unless shares sum to exactly 100.
    pub fn new(
        members: Vec<Member>,
        total_balance: u64,
        created_height: u32,
    ) -> Result<Self, VaultError> {
        if members.is_empty() {
            return Err(VaultError::EmptyMembership);
        }

        let mut seen = BTreeSet::new();
        for member in &members {
            member.check_share()?;
            if !seen.insert(member.identity.clone()) {
                return Err(VaultError::DuplicateMember(member.identity.to_hex()));
            }
        }

        let total: u32 = members.iter().map(|m| u32::from(m.share_percent)).sum();
        if total != TOTAL_SHARE_PERCENT {
            return Err(VaultError::ShareSumMismatch { total });
        }

        let vault_id = compute_vault_id(seen.iter());

        Ok(Self {
            vault_id,
            members,
            total_balance,
            created_height,
        })
    }

    /// Build the successor state for a membership change.
    ///
    /// The new state keeps this vault's balance and creation height. The
    /// vault id is recomputed from the new roster, since it is a digest of
    /// the membership.
    pub fn reconstitute(&self, members: Vec<Member>) -> Result<Self, VaultError> {
        Self::new(members, self.total_balance, self.created_height)
    }

    /// The vault id digest.
    pub fn vault_id(&self) -> &Digest {
        &self.vault_id
    }

    /// Hex vault id.
    pub fn vault_id_hex(&self) -> String {
        hex::encode(self.vault_id)
    }

    /// Compute the commitment over the current fields.
    pub fn commitment_hash(&self) -> Digest {
        let member_bytes: Vec<Vec<u8>> = self.members.iter().map(Member::commitment_bytes).collect();
        let balance = self.total_balance.to_le_bytes();
        let height = self.created_height.to_le_bytes();

        let mut parts: Vec<&[u8]> = Vec::with_capacity(member_bytes.len() + 3);
        parts.push(&self.vault_id);
        parts.extend(member_bytes.iter().map(Vec::as_slice));
        parts.push(&balance);
        parts.push(&height);
        sha256_multi(&parts)
    }

    /// Hex commitment.
    pub fn commitment_hex(&self) -> String {
        hex::encode(self.commitment_hash())
    }

    /// Members in stored order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, identity: &MemberId) -> bool {
        self.members.iter().any(|m| &m.identity == identity)
    }

    /// Share of a member, or `None` for a non-member.
    pub fn member_share(&self, identity: &MemberId) -> Option<u8> {
        self.members
            .iter()
            .find(|m| &m.identity == identity)
            .map(|m| m.share_percent)
    }

    pub fn total_balance(&self) -> u64 {
        self.total_balance
    }

    pub fn created_height(&self) -> u32 {
        self.created_height
    }

    /// Remove funds. Returns the new commitment.
    ///
    /// # Errors
    ///
    /// [`VaultError::BalanceUnderflow`] if `amount` exceeds the balance. The
    /// state is untouched on error.
    pub fn debit(&mut self, amount: u64) -> Result<Digest, VaultError> {
        self.total_balance =
            self.total_balance
                .checked_sub(amount)
                .ok_or(VaultError::BalanceUnderflow {
                    balance: self.total_balance,
                    amount,
                })?;
        Ok(self.commitment_hash())
    }

    /// Add funds (a deposit). Returns the new commitment.
    pub fn credit(&mut self, amount: u64) -> Result<Digest, VaultError> {
        self.total_balance =
            self.total_balance
                .checked_add(amount)
                .ok_or(VaultError::BalanceOverflow {
                    balance: self.total_balance,
                    amount,
                })?;
        Ok(self.commitment_hash())
    }

    /// Record the on-chain creation height. Returns the new commitment.
    pub fn set_created_height(&mut self, height: u32) -> Digest {
        self.created_height = height;
        self.commitment_hash()
    }

    /// Snapshot for the cross-chain collaborator.
    pub fn anchor(&self) -> StateAnchor {
        StateAnchor {
            vault_id: self.vault_id_hex(),
            commitment: self.commitment_hex(),
            total_balance: self.total_balance,
            created_height: self.created_height,
        }
    }
}

fn compute_vault_id<'a>(sorted: impl Iterator<Item = &'a MemberId>) -> Digest {
    let ids: Vec<&[u8]> = sorted.map(MemberId::as_bytes).collect();
    let mut parts: Vec<&[u8]> = Vec::with_capacity(ids.len() + 1);
    parts.push(VAULT_ID_DOMAIN);
    parts.extend(ids);
    sha256_multi(&parts)
}
