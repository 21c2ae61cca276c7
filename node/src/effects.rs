//! Applies governance effects to a vault record.
//!
//! | effect           | result                                             |
//! |------------------|----------------------------------------------------|
//! | `change-rules`   | rule set replaced wholesale                        |
//! | `add-member`     | roster replaced; vault id follows the new roster   |
//! | `remove-member`  | same                                               |
//! | `emergency-exit` | emergency timeout dropped to zero, flag set        |
//!
//! The share token is left alone. Newly added members start with no voting
//! power until someone transfers tokens to them.

use serde::Serialize;
use tracing::info;

use covault_contracts::{EffectDescriptor, ProposalAction, VaultMutator};
use covault_protocol::vault::{CustodyError, RuleSet};

use crate::repository::VaultRecord;

/// Report of one applied effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedEffect {
    pub proposal_id: String,
    pub action_kind: &'static str,
    /// Vault commitment after the change.
    pub commitment: String,
}

pub struct EffectApplier<'a> {
    record: &'a mut VaultRecord,
}

impl<'a> EffectApplier<'a> {
    pub fn new(record: &'a mut VaultRecord) -> Self {
        Self { record }
    }
}

impl VaultMutator for EffectApplier<'_> {
    type Error = CustodyError;
    type Outcome = AppliedEffect;

    fn apply_effect(&mut self, effect: &EffectDescriptor) -> Result<AppliedEffect, CustodyError> {
        let custody = &mut self.record.custody;
        match &effect.action {
            ProposalAction::ChangeRules { rules } => custody.replace_rules(*rules)?,
            ProposalAction::AddMember { roster, .. } | ProposalAction::RemoveMember { roster, .. } => {
                custody.apply_membership(roster.clone())?;
            }
            ProposalAction::EmergencyExit => {
                let rules = RuleSet {
                    emergency_timeout_blocks: 0,
                    ..*custody.rules()
                };
                custody.replace_rules(rules)?;
                self.record.emergency_exit = true;
            }
        }

        let commitment = self.record.custody.state().commitment_hex();
        info!(
            handle = %self.record.handle,
            proposal = %effect.proposal_id,
            kind = effect.action_kind(),
            "governance effect applied"
        );
        Ok(AppliedEffect {
            proposal_id: effect.proposal_id.clone(),
            action_kind: effect.action_kind(),
            commitment,
        })
    }
}
