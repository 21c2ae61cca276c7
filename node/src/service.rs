//! # Vault Service
//!
//! The node's single entry point for vault operations. Each call looks up a
//! vault, takes its lock, and runs the library operation under it, so a
//! withdrawal can never interleave with a deposit or a governance effect on
//! the same vault.
//!
//! ## Withdrawal flow
//!
//! ```text
//! approvals ──► predicate ──► proof envelope ──► executor ──► receipt
//!  (optional)   (evaluate)    (ProofSystem)      (re-verify, debit)
//! ```
//!
//! When approvals are required, every signer named in the request must have
//! signed [`WithdrawalRequest::approval_message`] for the current commitment.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use covault_contracts::{
    GovernanceError, LedgerError, ProposalAction, ProposalParams, ProposalStatus, ProposalTally,
    VaultMutator,
};
use covault_protocol::crypto::{Digest, SignatureVerifier};
use covault_protocol::predicate::{AuthorizationDecision, WithdrawalRequest};
use covault_protocol::proof::{ProofError, ProofSystem};
use covault_protocol::vault::{
    CustodyError, Member, MemberId, MultiPartyVault, RuleSet, StateAnchor, VaultError, VaultState,
    WithdrawalReceipt,
};

use crate::effects::{AppliedEffect, EffectApplier};
use crate::metrics::ServiceMetrics;
use crate::repository::{SharedRecord, VaultRecord, VaultRepository};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("vault not found: {0}")]
    VaultNotFound(String),

    #[error("vault already exists: {0}")]
    VaultExists(String),

    #[error("no approval from signer {0}")]
    MissingApproval(String),

    #[error("approval from {0} does not verify")]
    InvalidApproval(String),

    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// A member's signature over a withdrawal's approval message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedApproval {
    pub signer: MemberId,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

/// Read-only view of one vault.
#[derive(Debug, Clone, Serialize)]
pub struct VaultSummary {
    pub handle: String,
    pub anchor: StateAnchor,
    pub members: Vec<Member>,
    pub rules: RuleSet,
    pub withdrawals: usize,
    pub token_symbol: String,
    pub open_proposals: usize,
    pub emergency_exit: bool,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct VaultService {
    repository: Arc<dyn VaultRepository>,
    proofs: Arc<dyn ProofSystem>,
    verifier: Arc<dyn SignatureVerifier>,
    metrics: Arc<ServiceMetrics>,
    require_approvals: bool,
}

impl VaultService {
    pub fn new(
        repository: Arc<dyn VaultRepository>,
        proofs: Arc<dyn ProofSystem>,
        verifier: Arc<dyn SignatureVerifier>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            repository,
            proofs,
            verifier,
            metrics,
            require_approvals: false,
        }
    }

    /// Require a signed approval from every signer a withdrawal names.
    pub fn with_required_approvals(mut self, required: bool) -> Self {
        self.require_approvals = required;
        self
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    fn record(&self, handle: &str) -> Result<SharedRecord, ServiceError> {
        self.repository
            .get(handle)
            .ok_or_else(|| ServiceError::VaultNotFound(handle.to_string()))
    }

    // -- Vaults --------------------------------------------------------------

    /// Store a new vault and mint its share token. Returns the vault handle.
    pub fn create_vault(&self, state: VaultState, rules: RuleSet) -> Result<String, ServiceError> {
        let custody = MultiPartyVault::new(state, rules)?;
        let record = VaultRecord::new(custody);
        let handle = record.handle.clone();
        self.repository.create(record)?;
        self.metrics.vaults.set(self.repository.list().len() as i64);
        info!(handle = %handle, "vault created");
        Ok(handle)
    }

    pub fn summary(&self, handle: &str) -> Result<VaultSummary, ServiceError> {
        let shared = self.record(handle)?;
        let record = shared.lock();
        let state = record.custody.state();
        Ok(VaultSummary {
            handle: record.handle.clone(),
            anchor: state.anchor(),
            members: state.members().to_vec(),
            rules: *record.custody.rules(),
            withdrawals: record.custody.history().len(),
            token_symbol: record.governance.ledger().metadata().symbol.clone(),
            open_proposals: record
                .governance
                .proposals()
                .filter(|p| p.status == ProposalStatus::Active)
                .count(),
            emergency_exit: record.emergency_exit,
        })
    }

    /// Current commitment. This is what approvals must be signed against.
    pub fn commitment(&self, handle: &str) -> Result<Digest, ServiceError> {
        let shared = self.record(handle)?;
        let record = shared.lock();
        Ok(record.custody.state().commitment_hash())
    }

    pub fn deposit(&self, handle: &str, amount: u64) -> Result<String, ServiceError> {
        let shared = self.record(handle)?;
        let mut record = shared.lock();
        let commitment = record.custody.deposit(amount)?;
        self.metrics.deposits_total.inc();
        Ok(hex::encode(commitment))
    }

    // -- Withdrawals ---------------------------------------------------------

    /// Dry-run a withdrawal against the vault's current state.
    pub fn authorize(
        &self,
        handle: &str,
        request: WithdrawalRequest,
    ) -> Result<AuthorizationDecision, ServiceError> {
        let shared = self.record(handle)?;
        let record = shared.lock();
        Ok(record.custody.evaluate(request))
    }

    /// Authorize, attest, and execute a withdrawal in one step.
    pub fn withdraw(
        &self,
        handle: &str,
        request: WithdrawalRequest,
        approvals: &[SignedApproval],
    ) -> Result<WithdrawalReceipt, ServiceError> {
        let shared = self.record(handle)?;
        let mut record = shared.lock();

        if self.require_approvals {
            let commitment = record.custody.state().commitment_hash();
            let message = request.approval_message(&commitment);
            self.check_approvals(&request.signers, &message, approvals)?;
        }

        let proof = match record.custody.create_withdrawal_proof(request, self.proofs.as_ref()) {
            Ok(proof) => proof,
            Err(CustodyError::Proof(ProofError::PredicateFailed(reason))) => {
                self.metrics.record_denial(reason.kind());
                warn!(handle = %handle, reason = %reason, "withdrawal denied");
                return Err(CustodyError::Proof(ProofError::PredicateFailed(reason)).into());
            }
            Err(e) => return Err(e.into()),
        };
        self.metrics.withdrawals_authorized_total.inc();

        let receipt = record.custody.execute_withdrawal(&proof, self.proofs.as_ref())?;
        self.metrics.withdrawals_executed_total.inc();
        self.metrics.withdrawn_amount_total.inc_by(receipt.withdrawal_amount);
        Ok(receipt)
    }

    fn check_approvals(
        &self,
        signers: &[MemberId],
        message: &[u8],
        approvals: &[SignedApproval],
    ) -> Result<(), ServiceError> {
        for signer in signers {
            let approval = approvals
                .iter()
                .find(|a| &a.signer == signer)
                .ok_or_else(|| ServiceError::MissingApproval(signer.to_hex()))?;
            if !self
                .verifier
                .verify_signature(message, &approval.signature, &signer.to_hex())
            {
                return Err(ServiceError::InvalidApproval(signer.to_hex()));
            }
        }
        Ok(())
    }

    // -- Share token ---------------------------------------------------------

    pub fn transfer_tokens(
        &self,
        handle: &str,
        from: &MemberId,
        to: &MemberId,
        amount: u64,
    ) -> Result<(), ServiceError> {
        let shared = self.record(handle)?;
        let mut record = shared.lock();
        record.governance.ledger_mut().transfer(from, to, amount)?;
        Ok(())
    }

    pub fn token_balance(&self, handle: &str, account: &MemberId) -> Result<u64, ServiceError> {
        let shared = self.record(handle)?;
        let record = shared.lock();
        Ok(record.governance.ledger().balance_of(account))
    }

    // -- Governance ----------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        &self,
        handle: &str,
        proposer: &MemberId,
        action: ProposalAction,
        title: &str,
        description: &str,
        params: ProposalParams,
        current_height: u32,
    ) -> Result<String, ServiceError> {
        let shared = self.record(handle)?;
        let mut record = shared.lock();
        let id = record
            .governance
            .create_proposal(proposer, action, title, description, params, current_height)?;
        self.metrics.proposals_created_total.inc();
        Ok(id)
    }

    pub fn vote(
        &self,
        handle: &str,
        proposal_id: &str,
        voter: &MemberId,
        support: bool,
        current_height: u32,
    ) -> Result<(), ServiceError> {
        let shared = self.record(handle)?;
        let mut record = shared.lock();
        record
            .governance
            .vote(proposal_id, voter, support, current_height)?;
        self.metrics.votes_cast_total.inc();
        Ok(())
    }

    /// Returns `false` while the voting window is still open.
    pub fn finalize(&self, handle: &str, proposal_id: &str, current_height: u32) -> Result<bool, ServiceError> {
        let shared = self.record(handle)?;
        let mut record = shared.lock();
        Ok(record.governance.finalize(proposal_id, current_height)?)
    }

    pub fn tally(&self, handle: &str, proposal_id: &str) -> Result<ProposalTally, ServiceError> {
        let shared = self.record(handle)?;
        let record = shared.lock();
        Ok(record.governance.tally(proposal_id)?)
    }

    /// Execute a passed proposal and apply its effect to the vault.
    ///
    /// Works on a copy of the record and swaps it in only if both steps
    /// succeed, so a proposal is never marked executed with its effect
    /// unapplied.
    pub fn execute_proposal(
        &self,
        handle: &str,
        proposal_id: &str,
        current_height: u32,
    ) -> Result<AppliedEffect, ServiceError> {
        let shared = self.record(handle)?;
        let mut record = shared.lock();

        let mut next = record.clone();
        let effect = next.governance.execute(proposal_id, current_height)?;
        let applied = EffectApplier::new(&mut next).apply_effect(&effect)?;
        *record = next;

        self.metrics.proposals_executed_total.inc();
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use covault_protocol::crypto::{CovaultKeypair, Ed25519Verifier};
    use covault_protocol::predicate::AuthorizationError;
    use covault_protocol::proof::Ed25519Attestor;

    struct Fixture {
        service: VaultService,
        handle: String,
        keys: Vec<CovaultKeypair>,
    }

    impl Fixture {
        fn id(&self, n: usize) -> MemberId {
            MemberId::parse(&self.keys[n].public_key_hex()).unwrap()
        }
    }

    /// Helper: three key-backed members at 40/35/25 holding 1,000,000.
    fn fixture(rules: RuleSet, require_approvals: bool) -> Fixture {
        let keys: Vec<CovaultKeypair> = (1u8..=3).map(|n| CovaultKeypair::from_seed(&[n; 32])).collect();
        let members = keys
            .iter()
            .zip([40u8, 35, 25])
            .map(|(k, s)| Member::new(&k.public_key_hex(), s, 0).unwrap())
            .collect();
        let state = VaultState::new(members, 1_000_000, 0).unwrap();

        let service = VaultService::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(Ed25519Attestor),
            Arc::new(Ed25519Verifier),
            Arc::new(ServiceMetrics::new().unwrap()),
        )
        .with_required_approvals(require_approvals);
        let handle = service.create_vault(state, rules).unwrap();
        Fixture { service, handle, keys }
    }

    fn approvals(f: &Fixture, request: &WithdrawalRequest, signers: &[usize]) -> Vec<SignedApproval> {
        let shared = f.service.record(&f.handle).unwrap();
        let commitment = shared.lock().custody.state().commitment_hash();
        let message = request.approval_message(&commitment);
        signers
            .iter()
            .map(|&n| SignedApproval {
                signer: f.id(n),
                signature: f.keys[n].sign(&message).as_bytes().to_vec(),
            })
            .collect()
    }

    #[test]
    fn withdraw_debits_and_counts() {
        let f = fixture(RuleSet::permissive(), false);
        let request = WithdrawalRequest::new(10_000, 100, vec![f.id(0), f.id(1)]);
        let receipt = f.service.withdraw(&f.handle, request, &[]).unwrap();

        assert_eq!(receipt.remaining_balance, 1_000_000 - receipt.withdrawal_amount);
        assert_eq!(f.service.metrics().withdrawals_executed_total.get(), 1);
        assert_eq!(f.service.summary(&f.handle).unwrap().withdrawals, 1);
    }

    #[test]
    fn denial_is_labelled_and_leaves_balance() {
        let f = fixture(RuleSet::conservative(), false);
        let request = WithdrawalRequest::new(10_000, 100, vec![f.id(0)]);
        let err = f.service.withdraw(&f.handle, request, &[]).unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Custody(CustodyError::Proof(ProofError::PredicateFailed(
                AuthorizationError::QuorumNotMet { .. }
            )))
        ));
        assert_eq!(
            f.service
                .metrics()
                .withdrawals_denied_total
                .with_label_values(&["quorum_not_met"])
                .get(),
            1
        );
        assert_eq!(f.service.summary(&f.handle).unwrap().anchor.total_balance, 1_000_000);
    }

    #[test]
    fn approvals_are_checked_when_required() {
        let f = fixture(RuleSet::permissive(), true);
        let request = WithdrawalRequest::new(10_000, 100, vec![f.id(0), f.id(1)]);

        let partial = approvals(&f, &request, &[0]);
        assert!(matches!(
            f.service.withdraw(&f.handle, request.clone(), &partial),
            Err(ServiceError::MissingApproval(_))
        ));

        // Bob's slot signed by Carol's key.
        let mut forged = approvals(&f, &request, &[0, 2]);
        forged[1].signer = f.id(1);
        assert!(matches!(
            f.service.withdraw(&f.handle, request.clone(), &forged),
            Err(ServiceError::InvalidApproval(_))
        ));

        let good = approvals(&f, &request, &[0, 1]);
        f.service.withdraw(&f.handle, request, &good).unwrap();
    }

    #[test]
    fn approvals_do_not_survive_a_state_change() {
        let f = fixture(RuleSet::permissive(), true);
        let request = WithdrawalRequest::new(10_000, 100, vec![f.id(0), f.id(1)]);
        let stale = approvals(&f, &request, &[0, 1]);
        f.service.deposit(&f.handle, 1).unwrap();
        assert!(matches!(
            f.service.withdraw(&f.handle, request, &stale),
            Err(ServiceError::InvalidApproval(_))
        ));
    }

    #[test]
    fn governance_round_trip_changes_rules() {
        let f = fixture(RuleSet::conservative(), false);
        let id = f
            .service
            .propose(
                &f.handle,
                &f.id(0),
                ProposalAction::ChangeRules {
                    rules: RuleSet::permissive(),
                },
                "Loosen",
                "",
                ProposalParams::default(),
                10,
            )
            .unwrap();
        f.service.vote(&f.handle, &id, &f.id(0), true, 20).unwrap();
        f.service.vote(&f.handle, &id, &f.id(1), true, 20).unwrap();
        assert!(f.service.finalize(&f.handle, &id, 10 + 1_009).unwrap());

        let applied = f.service.execute_proposal(&f.handle, &id, 10 + 1_009 + 144).unwrap();
        assert_eq!(applied.action_kind, "change-rules");
        assert_eq!(f.service.summary(&f.handle).unwrap().rules, RuleSet::permissive());
        assert_eq!(f.service.metrics().proposals_executed_total.get(), 1);
    }

    #[test]
    fn remove_member_waits_for_delay() {
        let f = fixture(RuleSet::conservative(), false);
        // Carol's share split between the remaining two.
        let roster = vec![
            Member::new(&f.id(0).to_hex(), 60, 0).unwrap(),
            Member::new(&f.id(1).to_hex(), 40, 0).unwrap(),
        ];
        let id = f
            .service
            .propose(
                &f.handle,
                &f.id(0),
                ProposalAction::RemoveMember {
                    identity: f.id(2),
                    roster,
                },
                "Drop Carol",
                "",
                ProposalParams::default(),
                0,
            )
            .unwrap();
        f.service.vote(&f.handle, &id, &f.id(0), true, 1).unwrap();
        f.service.vote(&f.handle, &id, &f.id(1), true, 1).unwrap();
        f.service.finalize(&f.handle, &id, 1_009).unwrap();

        assert!(matches!(
            f.service.execute_proposal(&f.handle, &id, 1_010),
            Err(ServiceError::Governance(GovernanceError::ExecutionDelayNotMet { .. }))
        ));
        let applied = f.service.execute_proposal(&f.handle, &id, 1_153).unwrap();
        assert_eq!(applied.action_kind, "remove-member");
        assert_eq!(f.service.summary(&f.handle).unwrap().members.len(), 2);
    }

    #[test]
    fn unknown_vault() {
        let f = fixture(RuleSet::permissive(), false);
        assert!(matches!(f.service.deposit("nope", 1), Err(ServiceError::VaultNotFound(_))));
    }
}
