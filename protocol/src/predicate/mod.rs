//! # Withdrawal Authorization
//!
//! The predicate answers one question: may this request take this much out
//! of this vault, right now? It is deterministic and side-effect free apart
//! from a tracing event.
//!
//! ## Evaluation order
//!
//! The first failing check wins:
//!
//! ```text
//! 1. captured commitment == current commitment      CommitmentMismatch
//! 2. every signer is a member                       NonMember
//! 3. no signer twice                                DuplicateSigner
//! 4. emergency?  timeout elapsed                    EmergencyNotElapsed
//!                >= 2 distinct signers              EmergencyInsufficientSigners
//!                -> approved, skip 5
//! 5. rules.validate, cooling, net <= balance        QuorumNotMet .. InsufficientBalance
//! ```
//!
//! Capturing the commitment at construction is what makes an authorization
//! stale the moment the vault moves. Build a fresh predicate after every
//! mutation.

mod decision;
mod error;
mod request;

pub use decision::{ApprovalPath, AuthorizationDecision};
pub use error::AuthorizationError;
pub use request::WithdrawalRequest;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::EMERGENCY_MIN_SIGNERS;
use crate::crypto::hash::Digest;
use crate::vault::{RuleSet, VaultState};

/// A withdrawal request bound to the vault commitment it was built against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalPredicate {
    #[serde(with = "hex")]
    vault_commitment: Digest,
    rules: RuleSet,
    request: WithdrawalRequest,
}

impl WithdrawalPredicate {
    /// Capture `vault`'s commitment now.
    pub fn new(vault: &VaultState, rules: RuleSet, request: WithdrawalRequest) -> Self {
        Self {
            vault_commitment: vault.commitment_hash(),
            rules,
            request,
        }
    }

    /// Commitment captured at construction.
    pub fn vault_commitment(&self) -> &Digest {
        &self.vault_commitment
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn request(&self) -> &WithdrawalRequest {
        &self.request
    }

    /// Early-withdrawal penalty for this request under these rules.
    pub fn penalty(&self) -> u64 {
        self.rules.penalty(self.request.amount, self.request.current_height)
    }

    /// Amount that actually leaves the vault.
    pub fn net_amount(&self) -> u64 {
        self.request.amount.saturating_sub(self.penalty())
    }

    /// Evaluate against the vault as it is now.
    pub fn evaluate(&self, vault: &VaultState) -> AuthorizationDecision {
        match self.check(vault) {
            Ok(path) => {
                let decision = AuthorizationDecision::Approved {
                    path,
                    net_amount: self.net_amount(),
                    penalty: self.penalty(),
                };
                debug!(
                    vault_id = %vault.vault_id_hex(),
                    amount = self.request.amount,
                    net = decision.net_amount(),
                    penalty = decision.penalty(),
                    %path,
                    "withdrawal authorized"
                );
                decision
            }
            Err(reason) => {
                warn!(
                    vault_id = %vault.vault_id_hex(),
                    amount = self.request.amount,
                    reason = reason.kind(),
                    "withdrawal denied: {reason}"
                );
                AuthorizationDecision::Denied(reason)
            }
        }
    }

    fn check(&self, vault: &VaultState) -> Result<ApprovalPath, AuthorizationError> {
        let current = vault.commitment_hash();
        if current != self.vault_commitment {
            return Err(AuthorizationError::CommitmentMismatch {
                captured: hex::encode(self.vault_commitment),
                current: hex::encode(current),
            });
        }

        let request = &self.request;

        if let Some(stranger) = request.signers.iter().find(|s| !vault.is_member(s)) {
            return Err(AuthorizationError::NonMember(stranger.to_hex()));
        }

        let mut seen = HashSet::with_capacity(request.signers.len());
        for signer in &request.signers {
            if !seen.insert(signer) {
                return Err(AuthorizationError::DuplicateSigner(signer.to_hex()));
            }
        }
        let unique_signers = seen.len();

        if request.is_emergency {
            let elapsed = request.current_height.saturating_sub(vault.created_height());
            if elapsed < self.rules.emergency_timeout_blocks {
                return Err(AuthorizationError::EmergencyNotElapsed {
                    remaining: self.rules.emergency_timeout_blocks - elapsed,
                });
            }
            if unique_signers < EMERGENCY_MIN_SIGNERS {
                return Err(AuthorizationError::EmergencyInsufficientSigners {
                    required: EMERGENCY_MIN_SIGNERS,
                    provided: unique_signers,
                });
            }
            return Ok(ApprovalPath::Emergency);
        }

        self.rules
            .validate(request.amount, unique_signers, vault.member_count())?;
        self.rules.check_cooling(
            request.current_height,
            request.last_withdrawal_height,
            request.amount,
        )?;

        let net = self.net_amount();
        if net > vault.total_balance() {
            return Err(AuthorizationError::InsufficientBalance {
                requested: net,
                available: vault.total_balance(),
            });
        }

        Ok(ApprovalPath::Normal)
    }
}
