//! # Governance Engine
//!
//! Token holders propose changes to their vault and vote on them with their
//! share-token balance. A proposal that clears its threshold yields an
//! [`EffectDescriptor`]; applying it is someone else's job. The engine
//! never touches a `VaultState`.
//!
//! ## State machine
//!
//! ```text
//!            finalize (for >= required)
//!   Active ─────────────────────────────► Passed ──execute──► Executed
//!     │
//!     └── finalize (otherwise) / stale vote ──► Rejected
//! ```
//!
//! `Rejected` and `Executed` are terminal. Nothing is ever reopened.
//!
//! ## Vote weight
//!
//! Read from the ledger at cast time. Tokens transferred after voting can
//! vote again from the new holder. That's the rule, not an oversight: the
//! ledger is the only source of weight, and it is not snapshotted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use covault_protocol::config::{
    BPS_DENOMINATOR, DEFAULT_EXECUTION_DELAY_BLOCKS, DEFAULT_REQUIRED_VOTING_POWER_BPS,
    DEFAULT_VOTING_PERIOD_BLOCKS, MIN_PROPOSAL_POWER_BPS, PROPOSAL_ID_HEX_LEN,
};
use covault_protocol::crypto::{sha256_multi, truncated_hex, Digest};
use covault_protocol::vault::{Member, MemberId, RuleSet, VaultState};

use crate::effects::EffectDescriptor;
use crate::token_ledger::TokenLedger;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during governance operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernanceError {
    #[error("proposer has {power_bps} bps of voting power, needs {required_bps}")]
    InsufficientProposerPower { power_bps: u64, required_bps: u64 },

    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("voting closed on proposal {0}")]
    VotingClosed(String),

    #[error("{voter} already voted on proposal {proposal_id}")]
    AlreadyVoted { proposal_id: String, voter: String },

    #[error("{0} holds no voting power")]
    ZeroVotingPower(String),

    #[error("proposal {proposal_id} is {status}, not passed")]
    NotPassed {
        proposal_id: String,
        status: ProposalStatus,
    },

    #[error("execution delay not met: executable at {execution_height}, now {current_height}")]
    ExecutionDelayNotMet {
        execution_height: u32,
        current_height: u32,
    },

    #[error("proposal {proposal_id} already finalized as {status}")]
    AlreadyFinalized {
        proposal_id: String,
        status: ProposalStatus,
    },

    #[error("invalid proposal: {0}")]
    InvalidProposal(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Active,
    Passed,
    Rejected,
    Executed,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Passed => write!(f, "passed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Executed => write!(f, "executed"),
        }
    }
}

/// What a proposal would do if executed.
///
/// Membership changes carry the complete successor roster, so the applier
/// never has to guess how shares are redistributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action_kind", content = "payload", rename_all = "kebab-case")]
pub enum ProposalAction {
    ChangeRules { rules: RuleSet },
    AddMember { member: Member, roster: Vec<Member> },
    RemoveMember { identity: MemberId, roster: Vec<Member> },
    EmergencyExit,
}

impl ProposalAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChangeRules { .. } => "change-rules",
            Self::AddMember { .. } => "add-member",
            Self::RemoveMember { .. } => "remove-member",
            Self::EmergencyExit => "emergency-exit",
        }
    }

    /// Reject payloads that could never be applied.
    pub fn validate(&self) -> Result<(), GovernanceError> {
        let invalid = |msg: String| GovernanceError::InvalidProposal(msg);
        match self {
            Self::ChangeRules { rules } => rules.validate_parameters().map_err(|e| invalid(e.to_string())),
            Self::AddMember { member, roster } => {
                if !roster.contains(member) {
                    return Err(invalid(format!("roster does not include {}", member.identity)));
                }
                check_roster(roster).map_err(invalid)
            }
            Self::RemoveMember { identity, roster } => {
                if roster.iter().any(|m| &m.identity == identity) {
                    return Err(invalid(format!("roster still includes {identity}")));
                }
                check_roster(roster).map_err(invalid)
            }
            Self::EmergencyExit => Ok(()),
        }
    }
}

/// A roster is valid iff it would construct a vault.
fn check_roster(roster: &[Member]) -> Result<(), String> {
    VaultState::new(roster.to_vec(), 0, 0)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Per-proposal voting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalParams {
    /// Share of total supply that must vote in favour, in bps.
    pub required_voting_power_bps: u64,
    pub voting_period: u32,
    pub execution_delay: u32,
}

impl Default for ProposalParams {
    fn default() -> Self {
        Self {
            required_voting_power_bps: DEFAULT_REQUIRED_VOTING_POWER_BPS,
            voting_period: DEFAULT_VOTING_PERIOD_BLOCKS,
            execution_delay: DEFAULT_EXECUTION_DELAY_BLOCKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub proposer: MemberId,
    pub action: ProposalAction,
    pub title: String,
    pub description: String,
    pub required_voting_power_bps: u64,
    pub created_height: u32,
    pub voting_end_height: u32,
    pub execution_delay: u32,
    pub status: ProposalStatus,
    pub votes_for: u64,
    pub votes_against: u64,
    pub voters: BTreeSet<MemberId>,
    pub execution_height: Option<u32>,
}

/// Results view of a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalTally {
    pub proposal_id: String,
    pub status: ProposalStatus,
    pub votes_for: u64,
    pub votes_against: u64,
    pub for_bps: u64,
    pub against_bps: u64,
    pub required_bps: u64,
    pub total_voters: usize,
    pub passed: bool,
}

// ---------------------------------------------------------------------------
// GovernanceEngine
// ---------------------------------------------------------------------------

/// Proposal table plus the share-token ledger votes are weighed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceEngine {
    #[serde(with = "hex")]
    vault_id: Digest,
    ledger: TokenLedger,
    proposals: BTreeMap<String, Proposal>,
    counter: u64,
}

impl GovernanceEngine {
    /// Start governance for `vault`, minting its share token.
    pub fn new(vault: &VaultState) -> Self {
        Self {
            vault_id: *vault.vault_id(),
            ledger: TokenLedger::create(vault),
            proposals: BTreeMap::new(),
            counter: 0,
        }
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    /// Mutable ledger access, for transfers between votes.
    pub fn ledger_mut(&mut self) -> &mut TokenLedger {
        &mut self.ledger
    }

    pub fn proposal(&self, id: &str) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    /// Proposals still open for votes at `current_height`.
    pub fn active_proposals(&self, current_height: u32) -> Vec<&Proposal> {
        self.proposals
            .values()
            .filter(|p| p.status == ProposalStatus::Active && current_height <= p.voting_end_height)
            .collect()
    }

    /// Open a proposal. Returns its 16-hex-char id.
    pub fn create_proposal(
        &mut self,
        proposer: &MemberId,
        action: ProposalAction,
        title: impl Into<String>,
        description: impl Into<String>,
        params: ProposalParams,
        current_height: u32,
    ) -> Result<String, GovernanceError> {
        let power_bps = self.ledger.voting_power_bps(proposer);
        if power_bps < MIN_PROPOSAL_POWER_BPS {
            return Err(GovernanceError::InsufficientProposerPower {
                power_bps,
                required_bps: MIN_PROPOSAL_POWER_BPS,
            });
        }
        action.validate()?;
        if params.required_voting_power_bps > BPS_DENOMINATOR {
            return Err(GovernanceError::InvalidProposal(format!(
                "required voting power {} bps exceeds 100%",
                params.required_voting_power_bps
            )));
        }

        self.counter += 1;
        let id = truncated_hex(
            &sha256_multi(&[&self.vault_id, &self.counter.to_le_bytes(), proposer.as_bytes()]),
            PROPOSAL_ID_HEX_LEN,
        );

        let proposal = Proposal {
            id: id.clone(),
            proposer: proposer.clone(),
            title: title.into(),
            description: description.into(),
            required_voting_power_bps: params.required_voting_power_bps,
            created_height: current_height,
            voting_end_height: current_height.saturating_add(params.voting_period),
            execution_delay: params.execution_delay,
            status: ProposalStatus::Active,
            votes_for: 0,
            votes_against: 0,
            voters: BTreeSet::new(),
            execution_height: None,
            action,
        };

        info!(
            proposal = %id,
            kind = proposal.action.kind(),
            proposer = %proposer.short(),
            ends = proposal.voting_end_height,
            "proposal created"
        );
        self.proposals.insert(id.clone(), proposal);
        Ok(id)
    }

    /// Cast a vote weighted by the voter's current token balance.
    ///
    /// A vote arriving after the window closes flips a still-Active proposal
    /// to `Rejected` before failing with `VotingClosed`.
    pub fn vote(
        &mut self,
        proposal_id: &str,
        voter: &MemberId,
        support: bool,
        current_height: u32,
    ) -> Result<(), GovernanceError> {
        let weight = self.ledger.balance_of(voter);
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;

        if current_height > proposal.voting_end_height {
            if proposal.status == ProposalStatus::Active {
                proposal.status = ProposalStatus::Rejected;
                warn!(proposal = %proposal_id, current_height, "late vote; proposal rejected");
            }
            return Err(GovernanceError::VotingClosed(proposal_id.to_string()));
        }
        if proposal.status != ProposalStatus::Active {
            return Err(GovernanceError::VotingClosed(proposal_id.to_string()));
        }
        if proposal.voters.contains(voter) {
            return Err(GovernanceError::AlreadyVoted {
                proposal_id: proposal_id.to_string(),
                voter: voter.to_hex(),
            });
        }
        if weight == 0 {
            return Err(GovernanceError::ZeroVotingPower(voter.to_hex()));
        }

        proposal.voters.insert(voter.clone());
        if support {
            proposal.votes_for += weight;
        } else {
            proposal.votes_against += weight;
        }
        info!(proposal = %proposal_id, voter = %voter.short(), support, weight, "vote cast");
        Ok(())
    }

    /// Close voting. `Ok(false)` while the window is still open.
    pub fn finalize(&mut self, proposal_id: &str, current_height: u32) -> Result<bool, GovernanceError> {
        let total_supply = self.ledger.total_supply();
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;

        if proposal.status != ProposalStatus::Active {
            return Err(GovernanceError::AlreadyFinalized {
                proposal_id: proposal_id.to_string(),
                status: proposal.status,
            });
        }
        if current_height <= proposal.voting_end_height {
            return Ok(false);
        }

        let total_votes = proposal.votes_for + proposal.votes_against;
        let passed = total_votes > 0
            && meets_threshold(proposal.votes_for, total_supply, proposal.required_voting_power_bps);

        if passed {
            proposal.status = ProposalStatus::Passed;
            proposal.execution_height = Some(current_height.saturating_add(proposal.execution_delay));
            info!(
                proposal = %proposal_id,
                votes_for = proposal.votes_for,
                executable_at = ?proposal.execution_height,
                "proposal passed"
            );
        } else {
            proposal.status = ProposalStatus::Rejected;
            warn!(
                proposal = %proposal_id,
                votes_for = proposal.votes_for,
                votes_against = proposal.votes_against,
                "proposal rejected"
            );
        }
        Ok(true)
    }

    /// Mark a passed proposal executed and hand back its effect.
    pub fn execute(&mut self, proposal_id: &str, current_height: u32) -> Result<EffectDescriptor, GovernanceError> {
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;

        if proposal.status != ProposalStatus::Passed {
            return Err(GovernanceError::NotPassed {
                proposal_id: proposal_id.to_string(),
                status: proposal.status,
            });
        }
        let execution_height = proposal.execution_height.unwrap_or(u32::MAX);
        if current_height < execution_height {
            return Err(GovernanceError::ExecutionDelayNotMet {
                execution_height,
                current_height,
            });
        }

        proposal.status = ProposalStatus::Executed;
        info!(proposal = %proposal_id, kind = proposal.action.kind(), "proposal executed");
        Ok(EffectDescriptor {
            proposal_id: proposal_id.to_string(),
            action: proposal.action.clone(),
        })
    }

    pub fn tally(&self, proposal_id: &str) -> Result<ProposalTally, GovernanceError> {
        let p = self
            .proposals
            .get(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;
        let supply = self.ledger.total_supply();
        Ok(ProposalTally {
            proposal_id: p.id.clone(),
            status: p.status,
            votes_for: p.votes_for,
            votes_against: p.votes_against,
            for_bps: to_bps(p.votes_for, supply),
            against_bps: to_bps(p.votes_against, supply),
            required_bps: p.required_voting_power_bps,
            total_voters: p.voters.len(),
            passed: matches!(p.status, ProposalStatus::Passed | ProposalStatus::Executed),
        })
    }
}

/// `votes / supply >= required_bps / 10_000`, without division.
fn meets_threshold(votes: u64, supply: u64, required_bps: u64) -> bool {
    u128::from(votes) * u128::from(BPS_DENOMINATOR) >= u128::from(required_bps) * u128::from(supply)
}

fn to_bps(votes: u64, supply: u64) -> u64 {
    if supply == 0 {
        return 0;
    }
    (u128::from(votes) * u128::from(BPS_DENOMINATOR) / u128::from(supply)) as u64
}
