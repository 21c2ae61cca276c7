// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Covault Governance Contracts
//!
//! The part of Covault where owners get a say. Each vault issues a share
//! token, and token holders vote on changes to the vault:
//!
//! - **Token Ledger**: a fixed-supply token minted to members by share,
//!   with transfers, allowances, and an append-only log.
//! - **Governance**: proposals, share-weighted votes, a pass threshold,
//!   and an execution delay.
//! - **Effects**: the record a passed proposal produces, and the trait a
//!   vault owner implements to apply it.
//!
//! ## Design Principles
//!
//! 1. All token arithmetic is integer. Percentages are reporting only.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Governance never mutates a vault. It emits effects.
//! 4. Every public type is serializable (serde).

pub mod effects;
pub mod governance;
pub mod token_ledger;

pub use effects::{EffectDescriptor, VaultMutator};
pub use governance::{
    GovernanceEngine, GovernanceError, Proposal, ProposalAction, ProposalParams, ProposalStatus,
    ProposalTally,
};
pub use token_ledger::{LedgerError, TokenAllocation, TokenLedger, TokenMetadata, TransferEntry, TransferKind};
