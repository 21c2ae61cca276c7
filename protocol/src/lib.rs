// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Covault Protocol: Core Library
//!
//! Covault guards a shared-custody fund. A handful of members own the vault
//! in fixed percentages, and money only leaves when the vault's withdrawal
//! policy says so. This crate is the part that decides "says so".
//!
//! ## Architecture
//!
//! - **crypto**: Hashing, Ed25519 keys, and the signature-verification
//!   capability used for signed approvals.
//! - **vault**: Membership, balance, the commitment digest, the withdrawal
//!   policy (`RuleSet`), and the custody executor that actually moves money.
//! - **predicate**: The authorization predicate: a pure, short-circuiting
//!   evaluation of a withdrawal request against a vault and its rules.
//! - **proof**: Binds an approved decision to one vault commitment behind a
//!   swappable `ProofSystem` backend, so an approval can't be replayed
//!   against a different vault state.
//! - **config**: Protocol constants, domain tags, and policy presets.
//!
//! Governance (token ledger + proposals) lives in `covault-contracts`, and
//! the thing that glues it all together under a lock lives in
//! `covault-node`.
//!
//! ## Design Philosophy
//!
//! 1. Heights come from the caller. Nothing in here reads a clock.
//! 2. Evaluations are pure values; mutations are all-or-nothing.
//! 3. If it touches money, it has tests. Plural.

pub mod config;
pub mod crypto;
pub mod predicate;
pub mod proof;
pub mod vault;
