//! # Vault Module: Shared Custody State & Policy
//!
//! The vault is where the money sits and where the rules about moving it
//! live. Everything else in the crate either reads a vault (the predicate,
//! the proof envelope) or asks this module to change one.
//!
//! ## Architecture
//!
//! ```text
//! member.rs  : MemberId, Member
//! state.rs   : VaultState, commitment, StateAnchor
//! rules.rs   : RuleSet, presets, pure policy checks
//! custody.rs : MultiPartyVault: proof-gated withdrawal execution
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` in the smallest unit.** No floating point in
//!    any check. Penalties go through `u128`.
//!
//! 2. **The commitment is recomputed, never cached.** A stale commitment
//!    can't survive a mutation if it was never stored.
//!
//! 3. **Rules are values.** Replaced wholesale, never patched.

pub mod custody;
pub mod member;
pub mod rules;
pub mod state;

pub use custody::{CustodyError, MultiPartyVault, WithdrawalReceipt, WithdrawalRecord};
pub use member::{Member, MemberId};
pub use rules::{RuleSet, RuleSetError};
pub use state::{StateAnchor, VaultError, VaultState};
