//! # Governance Effects
//!
//! Executing a proposal produces an [`EffectDescriptor`]: a plain record of
//! what should happen to the vault. Turning that record into an actual
//! state change is the job of a [`VaultMutator`], which lives with whoever
//! owns the vault (the node, in our case).
//!
//! On the wire:
//!
//! ```json
//! { "proposal_id": "3f9c…", "action_kind": "change-rules", "payload": { "rules": { … } } }
//! ```

use serde::{Deserialize, Serialize};

use crate::governance::ProposalAction;

/// A passed proposal's effect, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectDescriptor {
    pub proposal_id: String,
    #[serde(flatten)]
    pub action: ProposalAction,
}

impl EffectDescriptor {
    pub fn action_kind(&self) -> &'static str {
        self.action.kind()
    }
}

/// The collaborator that applies effects to a vault.
///
/// Implementations must be all-or-nothing: an error leaves the vault as it
/// was.
pub trait VaultMutator {
    type Error;

    /// What the implementation reports back after applying, e.g. a new
    /// commitment.
    type Outcome;

    fn apply_effect(&mut self, effect: &EffectDescriptor) -> Result<Self::Outcome, Self::Error>;
}
