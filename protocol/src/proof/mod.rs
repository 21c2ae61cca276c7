//! # Proof Envelopes
//!
//! Commit-and-attest, not zero-knowledge. An approved withdrawal is reduced
//! to two digests (public and private inputs) plus a validity marker, and a
//! [`ProofSystem`] signs the result. The envelope is bound to the vault
//! commitment it was generated against; any later balance or membership
//! change makes it unverifiable.
//!
//! ## Architecture
//!
//! ```text
//! system.rs      : ProofSystem capability, Attestation, ProofError
//! attestation.rs : Ed25519Attestor (default backend)
//! circuit.rs     : statement digests and the validity marker
//! envelope.rs    : ProofEnvelope, WithdrawalProof
//! ```

pub mod attestation;
pub mod circuit;
pub mod envelope;
pub mod system;

pub use attestation::Ed25519Attestor;
pub use circuit::ValidityMarker;
pub use envelope::{ProofEnvelope, WithdrawalProof};
pub use system::{Attestation, ProofError, ProofSystem};
