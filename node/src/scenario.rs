//! # Scenario Runner
//!
//! A scenario is a JSON file describing one vault and an ordered list of
//! operations against it. Heights are explicit in every step; nothing here
//! reads a clock.
//!
//! ```json
//! {
//!   "name": "three-party",
//!   "require_approvals": true,
//!   "keys": { "alice": "<32-byte hex seed>", "bob": "..." },
//!   "vault": {
//!     "members": [{ "identity": "@alice", "share_percent": 60, "join_height": 0 }, ...],
//!     "balance": 1000000,
//!     "rules": "conservative"
//!   },
//!   "steps": [
//!     { "op": "withdraw", "amount": 5000, "height": 100, "signers": ["@alice", "@bob"], "sign": true },
//!     { "op": "propose", "proposer": "@alice", "title": "Exit", "action": { "action_kind": "emergency-exit" }, "height": 10 },
//!     { "op": "vote", "proposal": 0, "voter": "@bob", "support": true, "height": 20 }
//!   ]
//! }
//! ```
//!
//! In identity fields (`identity`, `signer`, `signers`, `proposer`, `voter`,
//! `from`, `to`) a value of the form `@name` is replaced with the public key
//! derived from `keys.name` before the scenario is parsed. Other strings,
//! such as titles and recipients, are taken literally.
//! Proposals are referenced by creation order within the run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use covault_contracts::{ProposalAction, ProposalParams};
use covault_protocol::crypto::{CovaultKeypair, KeyError};
use covault_protocol::predicate::{AuthorizationDecision, WithdrawalRequest};
use covault_protocol::vault::{Member, MemberId, RuleSet, VaultError, VaultState};

use crate::service::{ServiceError, SignedApproval, VaultService, VaultSummary};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown key alias @{0}")]
    UnknownAlias(String),

    #[error("bad seed for @{alias}: {source}")]
    BadSeed { alias: String, source: KeyError },

    #[error("no signing key for {0}")]
    NoSigningKey(String),

    #[error("no proposal #{0} in this run")]
    UnknownProposal(usize),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub require_approvals: bool,
    /// Alias to hex seed. Already substituted by the time this is parsed.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
    pub vault: VaultDefinition,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultDefinition {
    pub members: Vec<Member>,
    pub balance: u64,
    #[serde(default)]
    pub created_height: u32,
    #[serde(default)]
    pub rules: RulesDefinition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePreset {
    Conservative,
    Permissive,
}

/// Either a preset name or a full rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RulesDefinition {
    Preset(RulePreset),
    Explicit(RuleSet),
}

impl Default for RulesDefinition {
    fn default() -> Self {
        Self::Preset(RulePreset::Conservative)
    }
}

impl RulesDefinition {
    pub fn resolve(self) -> RuleSet {
        match self {
            Self::Preset(RulePreset::Conservative) => RuleSet::conservative(),
            Self::Preset(RulePreset::Permissive) => RuleSet::permissive(),
            Self::Explicit(rules) => rules,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioStep {
    /// The step is expected to fail. A failure then counts as a pass.
    #[serde(default)]
    pub expect_failure: bool,
    #[serde(flatten)]
    pub op: StepOp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepOp {
    /// Evaluate without executing.
    Authorize(WithdrawalStep),
    Withdraw(WithdrawalStep),
    Deposit {
        amount: u64,
    },
    Transfer {
        from: MemberId,
        to: MemberId,
        amount: u64,
    },
    Propose {
        proposer: MemberId,
        action: ProposalAction,
        #[serde(default)]
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        params: ProposalParams,
        height: u32,
    },
    Vote {
        proposal: usize,
        voter: MemberId,
        support: bool,
        height: u32,
    },
    Finalize {
        proposal: usize,
        height: u32,
    },
    Execute {
        proposal: usize,
        height: u32,
    },
    Tally {
        proposal: usize,
    },
    Summary,
}

impl StepOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authorize(_) => "authorize",
            Self::Withdraw(_) => "withdraw",
            Self::Deposit { .. } => "deposit",
            Self::Transfer { .. } => "transfer",
            Self::Propose { .. } => "propose",
            Self::Vote { .. } => "vote",
            Self::Finalize { .. } => "finalize",
            Self::Execute { .. } => "execute",
            Self::Tally { .. } => "tally",
            Self::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalStep {
    pub amount: u64,
    pub height: u32,
    pub signers: Vec<MemberId>,
    #[serde(default)]
    pub emergency: bool,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub last_withdrawal_height: Option<u32>,
    /// Sign approvals with the scenario's keys.
    #[serde(default)]
    pub sign: bool,
    /// Approvals supplied verbatim.
    #[serde(default)]
    pub approvals: Vec<SignedApproval>,
}

impl WithdrawalStep {
    fn request(&self) -> WithdrawalRequest {
        let mut request = WithdrawalRequest::new(self.amount, self.height, self.signers.clone())
            .with_last_withdrawal(self.last_withdrawal_height);
        if self.emergency {
            request = request.emergency();
        }
        if let Some(recipient) = &self.recipient {
            request = request.with_recipient(recipient.clone());
        }
        request
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub op: &'static str,
    pub ok: bool,
    pub as_expected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub handle: String,
    /// Every step behaved as expected.
    pub passed: bool,
    pub steps: Vec<StepOutcome>,
    pub final_state: VaultSummary,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// A parsed scenario plus the keys its aliases resolved to.
pub struct LoadedScenario {
    pub scenario: Scenario,
    keys: HashMap<MemberId, CovaultKeypair>,
}

pub fn load(path: &Path) -> Result<LoadedScenario, ScenarioError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&raw)
}

pub fn parse(raw: &str) -> Result<LoadedScenario, ScenarioError> {
    let mut value: Value = serde_json::from_str(raw)?;

    let mut aliases = HashMap::new();
    let mut keys = HashMap::new();
    if let Some(Value::Object(seeds)) = value.get("keys") {
        for (alias, seed) in seeds {
            let seed = seed.as_str().unwrap_or_default();
            let keypair = CovaultKeypair::from_hex(seed).map_err(|source| ScenarioError::BadSeed {
                alias: alias.clone(),
                source,
            })?;
            let identity = keypair.public_key_hex();
            aliases.insert(alias.clone(), identity.clone());
            keys.insert(MemberId::parse(&identity)?, keypair);
        }
    }
    // Seeds are secrets; keep them out of anything downstream.
    if let Some(Value::Object(map)) = value.get_mut("keys") {
        map.clear();
    }

    substitute_aliases(&mut value, &aliases)?;
    let scenario = serde_json::from_value(value)?;
    Ok(LoadedScenario { scenario, keys })
}

/// Fields whose values are member identities and may be written as `@alias`.
const IDENTITY_FIELDS: &[&str] = &["identity", "signer", "signers", "proposer", "voter", "from", "to"];

fn substitute_aliases(value: &mut Value, aliases: &HashMap<String, String>) -> Result<(), ScenarioError> {
    match value {
        Value::Array(items) => {
            for item in items {
                substitute_aliases(item, aliases)?;
            }
        }
        Value::Object(map) => {
            for (field, item) in map.iter_mut() {
                if IDENTITY_FIELDS.contains(&field.as_str()) {
                    resolve_identity(item, aliases)?;
                } else {
                    substitute_aliases(item, aliases)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn resolve_identity(value: &mut Value, aliases: &HashMap<String, String>) -> Result<(), ScenarioError> {
    match value {
        Value::String(s) => {
            if let Some(alias) = s.strip_prefix('@') {
                *s = aliases
                    .get(alias)
                    .cloned()
                    .ok_or_else(|| ScenarioError::UnknownAlias(alias.to_string()))?;
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve_identity(item, aliases)?;
            }
        }
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Running
// ---------------------------------------------------------------------------

impl LoadedScenario {
    /// Create the vault and run every step. Step failures are recorded, not
    /// returned; with `fail_fast` the run stops at the first unexpected one.
    pub fn run(&self, service: &VaultService, fail_fast: bool) -> Result<ScenarioReport, ScenarioError> {
        let def = &self.scenario.vault;
        let state = VaultState::new(def.members.clone(), def.balance, def.created_height)?;
        let handle = service.create_vault(state, def.rules.resolve())?;
        info!(scenario = %self.scenario.name, handle = %handle, steps = self.scenario.steps.len(), "scenario started");

        let mut proposals = Vec::new();
        let mut outcomes = Vec::with_capacity(self.scenario.steps.len());
        for (index, step) in self.scenario.steps.iter().enumerate() {
            let result = self.run_step(service, &handle, &step.op, &mut proposals);
            let ok = result.is_ok();
            let as_expected = ok != step.expect_failure;
            let (result, error) = match result {
                Ok(value) => (Some(value), None),
                Err(e) => (None, Some(e.to_string())),
            };
            if as_expected {
                debug!(step = index, op = step.op.name(), ok, "step done");
            } else {
                warn!(step = index, op = step.op.name(), error = ?error, "step did not behave as expected");
            }
            outcomes.push(StepOutcome {
                step: index,
                op: step.op.name(),
                ok,
                as_expected,
                result,
                error,
            });
            if fail_fast && !as_expected {
                break;
            }
        }

        let passed = outcomes.len() == self.scenario.steps.len() && outcomes.iter().all(|o| o.as_expected);
        Ok(ScenarioReport {
            name: self.scenario.name.clone(),
            final_state: service.summary(&handle)?,
            handle,
            passed,
            steps: outcomes,
        })
    }

    fn run_step(
        &self,
        service: &VaultService,
        handle: &str,
        op: &StepOp,
        proposals: &mut Vec<String>,
    ) -> Result<Value, ScenarioError> {
        let value = match op {
            StepOp::Authorize(w) => {
                let decision = service.authorize(handle, w.request())?;
                decision_json(&decision)
            }
            StepOp::Withdraw(w) => {
                let request = w.request();
                let mut approvals = w.approvals.clone();
                if w.sign {
                    approvals.extend(self.sign(service, handle, &request)?);
                }
                let receipt = service.withdraw(handle, request, &approvals)?;
                serde_json::to_value(receipt)?
            }
            StepOp::Deposit { amount } => {
                let commitment = service.deposit(handle, *amount)?;
                serde_json::json!({ "commitment": commitment })
            }
            StepOp::Transfer { from, to, amount } => {
                service.transfer_tokens(handle, from, to, *amount)?;
                serde_json::json!({
                    "from_balance": service.token_balance(handle, from)?,
                    "to_balance": service.token_balance(handle, to)?,
                })
            }
            StepOp::Propose {
                proposer,
                action,
                title,
                description,
                params,
                height,
            } => {
                let id = service.propose(
                    handle,
                    proposer,
                    action.clone(),
                    title,
                    description,
                    *params,
                    *height,
                )?;
                proposals.push(id.clone());
                serde_json::json!({ "proposal_id": id, "index": proposals.len() - 1 })
            }
            StepOp::Vote {
                proposal: n,
                voter,
                support,
                height,
            } => {
                let id = proposal_id(proposals, *n)?;
                service.vote(handle, &id, voter, *support, *height)?;
                serde_json::to_value(service.tally(handle, &id)?)?
            }
            StepOp::Finalize { proposal: n, height } => {
                let id = proposal_id(proposals, *n)?;
                let finalized = service.finalize(handle, &id, *height)?;
                serde_json::json!({ "finalized": finalized, "tally": service.tally(handle, &id)? })
            }
            StepOp::Execute { proposal: n, height } => {
                let id = proposal_id(proposals, *n)?;
                serde_json::to_value(service.execute_proposal(handle, &id, *height)?)?
            }
            StepOp::Tally { proposal: n } => {
                let id = proposal_id(proposals, *n)?;
                serde_json::to_value(service.tally(handle, &id)?)?
            }
            StepOp::Summary => serde_json::to_value(service.summary(handle)?)?,
        };
        Ok(value)
    }

    fn sign(
        &self,
        service: &VaultService,
        handle: &str,
        request: &WithdrawalRequest,
    ) -> Result<Vec<SignedApproval>, ScenarioError> {
        let message = request.approval_message(&service.commitment(handle)?);
        request
            .signers
            .iter()
            .map(|signer| {
                let keypair = self
                    .keys
                    .get(signer)
                    .ok_or_else(|| ScenarioError::NoSigningKey(signer.to_hex()))?;
                Ok(SignedApproval {
                    signer: signer.clone(),
                    signature: keypair.sign(&message).as_bytes().to_vec(),
                })
            })
            .collect()
    }
}

fn proposal_id(proposals: &[String], n: usize) -> Result<String, ScenarioError> {
    proposals.get(n).cloned().ok_or(ScenarioError::UnknownProposal(n))
}

fn decision_json(decision: &AuthorizationDecision) -> Value {
    match decision {
        AuthorizationDecision::Approved {
            path,
            net_amount,
            penalty,
        } => serde_json::json!({
            "valid": true,
            "path": path,
            "net_amount": net_amount,
            "penalty": penalty,
        }),
        AuthorizationDecision::Denied(reason) => serde_json::json!({
            "valid": false,
            "reason": reason.kind(),
            "detail": reason.to_string(),
        }),
    }
}
