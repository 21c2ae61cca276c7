//! # Multi-Party Custody
//!
//! [`MultiPartyVault`] is the one place a vault's balance actually moves on
//! the withdrawal path. It owns the state, the current rules, and an
//! append-only withdrawal history, and it only debits after a bound
//! [`WithdrawalProof`] verifies against the commitment as it is *now*.
//!
//! ## Lifecycle of a withdrawal
//!
//! ```text
//! request ──► predicate(current state, rules, history)
//!         ──► WithdrawalProof::generate   (PredicateFailed on denial)
//!         ──► execute_withdrawal          (verify, re-evaluate, debit net)
//!         ──► WithdrawalReceipt + history entry
//! ```
//!
//! The penalty is never debited. It stays in the vault.
//!
//! Nothing here locks. Callers serialize access per vault.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::member::{Member, MemberId};
use super::rules::{RuleSet, RuleSetError};
use super::state::{VaultError, VaultState};
use crate::config::RECEIPT_ID_HEX_LEN;
use crate::crypto::hash::{sha256_multi, truncated_hex, Digest};
use crate::predicate::{AuthorizationDecision, AuthorizationError, WithdrawalPredicate, WithdrawalRequest};
use crate::proof::{ProofError, ProofSystem, WithdrawalProof};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Rules(#[from] RuleSetError),

    /// A check that depends on executor-side history failed at execution.
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// The proof was generated under rules that have since been replaced.
    #[error("withdrawal proof was generated under superseded rules")]
    RulesChanged,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One executed withdrawal, as kept in the vault's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub receipt_id: String,
    pub amount: u64,
    pub net_amount: u64,
    pub penalty: u64,
    pub height: u32,
    pub signers: Vec<MemberId>,
    pub recipient: Option<String>,
    pub emergency: bool,
}

/// What a successful execution hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub receipt_id: String,
    /// Net amount that left the vault.
    pub withdrawal_amount: u64,
    pub penalty: u64,
    pub remaining_balance: u64,
    /// Hex commitment after the debit.
    pub commitment: String,
}

// ---------------------------------------------------------------------------
// MultiPartyVault
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiPartyVault {
    state: VaultState,
    rules: RuleSet,
    #[serde(default)]
    history: Vec<WithdrawalRecord>,
}

impl MultiPartyVault {
    /// Wrap a state with a rule set. The rules must pass
    /// [`RuleSet::validate_parameters`].
    pub fn new(state: VaultState, rules: RuleSet) -> Result<Self, CustodyError> {
        rules.validate_parameters()?;
        info!(
            vault_id = %state.vault_id_hex(),
            members = state.member_count(),
            balance = state.total_balance(),
            "vault opened"
        );
        Ok(Self {
            state,
            rules,
            history: Vec::new(),
        })
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn history(&self) -> &[WithdrawalRecord] {
        &self.history
    }

    /// Height of the most recent executed withdrawal.
    pub fn last_withdrawal_height(&self) -> Option<u32> {
        self.history.last().map(|r| r.height)
    }

    /// Swap in a new rule set wholesale.
    pub fn replace_rules(&mut self, rules: RuleSet) -> Result<(), CustodyError> {
        rules.validate_parameters()?;
        info!(vault_id = %self.state.vault_id_hex(), ?rules, "rules replaced");
        self.rules = rules;
        Ok(())
    }

    /// Replace the roster. Balance, height, and history carry over; the
    /// vault id follows the new membership. Returns the new commitment.
    pub fn apply_membership(&mut self, members: Vec<Member>) -> Result<Digest, CustodyError> {
        let next = self.state.reconstitute(members)?;
        info!(
            old_vault_id = %self.state.vault_id_hex(),
            new_vault_id = %next.vault_id_hex(),
            members = next.member_count(),
            "membership changed"
        );
        self.state = next;
        Ok(self.state.commitment_hash())
    }

    /// Credit funds. Returns the new commitment.
    pub fn deposit(&mut self, amount: u64) -> Result<Digest, CustodyError> {
        let commitment = self.state.credit(amount)?;
        info!(vault_id = %self.state.vault_id_hex(), amount, balance = self.state.total_balance(), "deposit");
        Ok(commitment)
    }

    /// Record the creation height once the vault lands on chain.
    pub fn set_created_height(&mut self, height: u32) -> Digest {
        self.state.set_created_height(height)
    }

    /// Build a predicate against the current state and rules. A request
    /// without `last_withdrawal_height` picks it up from the history.
    pub fn predicate(&self, mut request: WithdrawalRequest) -> WithdrawalPredicate {
        if request.last_withdrawal_height.is_none() {
            request.last_withdrawal_height = self.last_withdrawal_height();
        }
        WithdrawalPredicate::new(&self.state, self.rules, request)
    }

    /// Dry-run a request.
    pub fn evaluate(&self, request: WithdrawalRequest) -> AuthorizationDecision {
        self.predicate(request).evaluate(&self.state)
    }

    /// Evaluate and attest.
    pub fn create_withdrawal_proof<P: ProofSystem + ?Sized>(
        &self,
        request: WithdrawalRequest,
        system: &P,
    ) -> Result<WithdrawalProof, CustodyError> {
        let predicate = self.predicate(request);
        Ok(WithdrawalProof::generate(predicate, &self.state, system)?)
    }

    /// Verify a proof against the current commitment and rules.
    pub fn verify_withdrawal<P: ProofSystem + ?Sized>(
        &self,
        proof: &WithdrawalProof,
        system: &P,
    ) -> Result<(), CustodyError> {
        proof.verify(&self.state.commitment_hash(), system)?;
        if proof.predicate().rules() != &self.rules {
            return Err(CustodyError::RulesChanged);
        }
        Ok(())
    }

    /// Verify, re-run the predicate on the live state, debit the net amount.
    ///
    /// The bound predicate is evaluated again here with the executor's own
    /// history, and net and penalty come from that decision. A validly
    /// signed envelope over a request the vault would deny is refused.
    ///
    /// All-or-nothing: on any error the vault is unchanged.
    pub fn execute_withdrawal<P: ProofSystem + ?Sized>(
        &mut self,
        proof: &WithdrawalProof,
        system: &P,
    ) -> Result<WithdrawalReceipt, CustodyError> {
        if let Err(e) = self.verify_withdrawal(proof, system) {
            warn!(vault_id = %self.state.vault_id_hex(), error = %e, "withdrawal proof rejected");
            return Err(e);
        }

        let request = proof.request();
        // The request may have carried its own (older) last height.
        let mut live = request.clone();
        live.last_withdrawal_height = request.last_withdrawal_height.max(self.last_withdrawal_height());
        let (_, net, penalty) = WithdrawalPredicate::new(&self.state, self.rules, live)
            .evaluate(&self.state)
            .into_result()?;

        let commitment = self.state.debit(net)?;

        let receipt_id = truncated_hex(
            &sha256_multi(&[
                self.state.vault_id(),
                &commitment,
                &proof.envelope().statement_digest,
            ]),
            RECEIPT_ID_HEX_LEN,
        );

        self.history.push(WithdrawalRecord {
            receipt_id: receipt_id.clone(),
            amount: request.amount,
            net_amount: net,
            penalty,
            height: request.current_height,
            signers: request.signers.clone(),
            recipient: request.recipient.clone(),
            emergency: request.is_emergency,
        });

        info!(
            vault_id = %self.state.vault_id_hex(),
            receipt = %receipt_id,
            net,
            penalty,
            remaining = self.state.total_balance(),
            "withdrawal executed"
        );

        Ok(WithdrawalReceipt {
            receipt_id,
            withdrawal_amount: net,
            penalty,
            remaining_balance: self.state.total_balance(),
            commitment: hex::encode(commitment),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::circuit::{private_inputs_digest, public_inputs_digest, statement_digest};
    use crate::proof::{Attestation, Ed25519Attestor, ProofEnvelope, ValidityMarker};

    fn id(n: u8) -> String {
        hex::encode([n; 32])
    }

    fn custody(rules: RuleSet) -> MultiPartyVault {
        let state = VaultState::new(
            vec![
                Member::new(&id(1), 40, 100).unwrap(),
                Member::new(&id(2), 35, 100).unwrap(),
                Member::new(&id(3), 25, 100).unwrap(),
            ],
            100_000_000,
            100,
        )
        .unwrap();
        MultiPartyVault::new(state, rules).unwrap()
    }

    fn request(amount: u64, height: u32, signers: &[u8]) -> WithdrawalRequest {
        let ids: Vec<String> = signers.iter().map(|n| id(*n)).collect();
        WithdrawalRequest::from_hex_signers(amount, height, &ids).unwrap()
    }

    /// A well-formed, validly signed proof for `request`, built without
    /// asking the predicate.
    fn self_attested(vault: &MultiPartyVault, request: WithdrawalRequest) -> WithdrawalProof {
        let predicate = WithdrawalPredicate::new(vault.state(), *vault.rules(), request);
        let commitment = vault.state().commitment_hash();
        let req = predicate.request();
        let public = public_inputs_digest(&commitment, req.amount, req.current_height);
        let private = private_inputs_digest(&req.signers, predicate.rules()).unwrap();
        let marker = ValidityMarker::from_valid(true);
        let statement = statement_digest(&public, &private, marker);
        let Attestation {
            signature,
            verification_key,
        } = Ed25519Attestor.prove(&statement).unwrap();

        let envelope = ProofEnvelope {
            commitment,
            public_inputs_digest: public,
            private_inputs_digest: private,
            validity_marker: marker,
            statement_digest: statement,
            attestation: signature,
            verification_key,
        };
        serde_json::from_value(serde_json::json!({
            "envelope": envelope,
            "predicate": predicate,
        }))
        .unwrap()
    }

    #[test]
    fn execute_debits_net_and_records_history() {
        let mut vault = custody(RuleSet::conservative());
        let proof = vault
            .create_withdrawal_proof(request(5_000_000, 200, &[1, 2]).with_recipient("bc1q"), &Ed25519Attestor)
            .unwrap();
        let receipt = vault.execute_withdrawal(&proof, &Ed25519Attestor).unwrap();

        assert_eq!(receipt.withdrawal_amount, 5_000_000);
        assert_eq!(receipt.remaining_balance, 95_000_000);
        assert_eq!(receipt.commitment, vault.state().commitment_hex());
        assert_eq!(receipt.receipt_id.len(), RECEIPT_ID_HEX_LEN);
        assert_eq!(vault.history().len(), 1);
        assert_eq!(vault.history()[0].recipient.as_deref(), Some("bc1q"));
        assert_eq!(vault.last_withdrawal_height(), Some(200));
    }

    #[test]
    fn proof_cannot_be_replayed() {
        let mut vault = custody(RuleSet::conservative());
        let proof = vault
            .create_withdrawal_proof(request(5_000_000, 200, &[1, 2]), &Ed25519Attestor)
            .unwrap();
        vault.execute_withdrawal(&proof, &Ed25519Attestor).unwrap();
        assert_eq!(
            vault.execute_withdrawal(&proof, &Ed25519Attestor),
            Err(CustodyError::Proof(ProofError::DigestMismatch("commitment")))
        );
        assert_eq!(vault.state().total_balance(), 95_000_000);
    }

    #[test]
    fn penalty_stays_in_vault() {
        let rules = RuleSet {
            penalty_free_height: 10_000,
            ..RuleSet::conservative()
        };
        let mut vault = custody(rules);
        let proof = vault
            .create_withdrawal_proof(request(5_000_000, 200, &[1, 2]), &Ed25519Attestor)
            .unwrap();
        let receipt = vault.execute_withdrawal(&proof, &Ed25519Attestor).unwrap();
        assert_eq!(receipt.penalty, 500_000);
        assert_eq!(receipt.withdrawal_amount, 4_500_000);
        assert_eq!(receipt.remaining_balance, 95_500_000);
    }

    #[test]
    fn replaced_rules_invalidate_outstanding_proofs() {
        let mut vault = custody(RuleSet::conservative());
        let proof = vault
            .create_withdrawal_proof(request(5_000_000, 200, &[1, 2]), &Ed25519Attestor)
            .unwrap();
        vault.replace_rules(RuleSet::permissive()).unwrap();
        assert_eq!(
            vault.execute_withdrawal(&proof, &Ed25519Attestor),
            Err(CustodyError::RulesChanged)
        );
    }

    #[test]
    fn cooling_uses_history_even_if_request_lies() {
        let mut vault = custody(RuleSet::conservative());
        let first = vault
            .create_withdrawal_proof(request(20_000_000, 200, &[1, 2, 3]), &Ed25519Attestor)
            .unwrap();
        vault.execute_withdrawal(&first, &Ed25519Attestor).unwrap();

        // Claims an ancient last withdrawal to dodge cooling.
        let sneaky = request(20_000_000, 250, &[1, 2, 3]).with_last_withdrawal(Some(0));
        let proof = vault.create_withdrawal_proof(sneaky, &Ed25519Attestor).unwrap();
        assert_eq!(
            vault.execute_withdrawal(&proof, &Ed25519Attestor),
            Err(CustodyError::Authorization(AuthorizationError::CoolingPeriodActive { remaining: 94 }))
        );

        // Without the lie, the predicate itself refuses.
        assert!(matches!(
            vault.create_withdrawal_proof(request(20_000_000, 250, &[1, 2, 3]), &Ed25519Attestor),
            Err(CustodyError::Proof(ProofError::PredicateFailed(
                AuthorizationError::CoolingPeriodActive { .. }
            )))
        ));
    }

    #[test]
    fn emergency_overdraw_is_refused_at_execution() {
        let mut vault = custody(RuleSet::conservative());
        let height = 100 + RuleSet::conservative().emergency_timeout_blocks;
        let proof = vault
            .create_withdrawal_proof(request(150_000_000, height, &[1, 2]).emergency(), &Ed25519Attestor)
            .unwrap();
        assert!(matches!(
            vault.execute_withdrawal(&proof, &Ed25519Attestor),
            Err(CustodyError::Vault(VaultError::BalanceUnderflow { .. }))
        ));
        assert_eq!(vault.state().total_balance(), 100_000_000);
        assert!(vault.history().is_empty());
    }

    #[test]
    fn deposit_and_membership_change_move_the_commitment() {
        let mut vault = custody(RuleSet::conservative());
        let c0 = vault.state().commitment_hash();
        let c1 = vault.deposit(1).unwrap();
        assert_ne!(c0, c1);

        let c2 = vault
            .apply_membership(vec![
                Member::new(&id(1), 50, 100).unwrap(),
                Member::new(&id(2), 50, 100).unwrap(),
            ])
            .unwrap();
        assert_ne!(c1, c2);
        assert_eq!(vault.state().total_balance(), 100_000_001);
        assert_eq!(vault.state().member_count(), 2);
    }

    #[test]
    fn rejects_nonsense_rules() {
        let mut vault = custody(RuleSet::conservative());
        let bad = RuleSet {
            min_signers: 0,
            ..RuleSet::conservative()
        };
        assert_eq!(vault.replace_rules(bad), Err(CustodyError::Rules(RuleSetError::ZeroMinSigners)));
        assert_eq!(vault.rules(), &RuleSet::conservative());
    }

    #[test]
    fn self_attested_proofs_are_re_evaluated() {
        let mut vault = custody(RuleSet::conservative());
        vault.deposit(50_000_000).unwrap();
        let timeout = RuleSet::conservative().emergency_timeout_blocks;

        let cases = [
            (
                request(100_000_000, 200, &[9]),
                AuthorizationError::NonMember(id(9)),
            ),
            (
                request(1_000_000, 200, &[1]),
                AuthorizationError::QuorumNotMet { required: 2, provided: 1 },
            ),
            (
                request(120_000_000, 200, &[1, 2, 3]),
                AuthorizationError::ExceedsMax {
                    amount: 120_000_000,
                    max: 100_000_000,
                },
            ),
            (
                request(150_000_000, 200, &[1, 2]).emergency(),
                AuthorizationError::EmergencyNotElapsed { remaining: timeout - 100 },
            ),
        ];

        for (req, expected) in cases {
            let proof = self_attested(&vault, req);
            vault.verify_withdrawal(&proof, &Ed25519Attestor).unwrap();
            assert_eq!(
                vault.execute_withdrawal(&proof, &Ed25519Attestor),
                Err(CustodyError::Authorization(expected))
            );
            assert_eq!(vault.state().total_balance(), 150_000_000);
            assert!(vault.history().is_empty());
        }
    }

    #[test]
    fn net_and_penalty_come_from_live_rules() {
        let rules = RuleSet {
            penalty_free_height: 10_000,
            ..RuleSet::conservative()
        };
        let mut vault = custody(rules);
        let proof = self_attested(&vault, request(5_000_000, 200, &[1, 2]));
        let receipt = vault.execute_withdrawal(&proof, &Ed25519Attestor).unwrap();
        assert_eq!(receipt.penalty, 500_000);
        assert_eq!(receipt.withdrawal_amount, 4_500_000);
    }
}
